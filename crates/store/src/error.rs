//! Store-side error helpers.
//!
//! The store shares the project-wide error family defined in
//! [`depot_model::error`]; this module adds the sqlx boundary mapping.

use exn::ResultExt;

pub use depot_model::error::{Error, ErrorKind, Result};

/// Map a sqlx failure into the store error family.
///
/// Unique-constraint violations become [`ErrorKind::Conflict`] so raw-add
/// paths can recognize a primary-key collision; everything else is a plain
/// database error.
pub(crate) trait SqlxResultExt<T> {
    fn or_db_err(self) -> Result<T>;
}

impl<T> SqlxResultExt<T> for std::result::Result<T, sqlx::Error> {
    #[track_caller]
    fn or_db_err(self) -> Result<T> {
        match self {
            Ok(value) => Ok(value),
            Err(err) => {
                let kind = match &err {
                    sqlx::Error::Database(db) if db.is_unique_violation() => {
                        ErrorKind::Conflict(db.message().to_string())
                    }
                    _ => ErrorKind::Database,
                };
                Err(err).or_raise(|| kind)
            }
        }
    }
}
