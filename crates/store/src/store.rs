//! The concrete store handle.

use crate::db::Database;
use crate::error::{ErrorKind, Result, SqlxResultExt};
use sqlx::pool::PoolConnection;
use sqlx::{Sqlite, Transaction};
use std::path::Path;

/// A depot store backed by a local SQLite database.
///
/// `Store` is the concrete type behind the [`StoreReader`](crate::StoreReader)
/// and [`StoreWriter`](crate::StoreWriter) capability traits. A handle wraps
/// one database connection and is not meant to be shared across writers.
#[derive(Debug, Clone)]
pub struct Store {
    db: Database,
}

impl Store {
    /// Open (or create) a store database at the given path.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self { db: Database::connect(path).await? })
    }

    /// Open an in-memory store, mostly useful for tests.
    pub async fn in_memory() -> Result<Self> {
        Ok(Self { db: Database::connect_in_memory().await? })
    }

    pub fn from_database(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub(crate) async fn acquire(&self) -> Result<PoolConnection<Sqlite>> {
        self.db.pool().acquire().await.or_db_err()
    }

    pub(crate) async fn begin(&self) -> Result<Transaction<'static, Sqlite>> {
        self.db.pool().begin().await.or_db_err()
    }
}

/// Fresh unique id for new rows.
pub(crate) fn unique_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Normalize an optional filter value: `None`, the empty string and the
/// `"all"` wildcard all mean "no filter".
pub(crate) fn filter_value(value: Option<&str>) -> Option<&str> {
    value.filter(|value| !value.is_empty() && *value != "all")
}

/// Exactly one row, or the appropriate lookup error.
pub(crate) fn one_row<T>(mut rows: Vec<T>, entity: &str, key: &str) -> Result<T> {
    match rows.len() {
        0 => Err(exn::Exn::from(ErrorKind::NotFound(format!("no {entity} with id {key:?}")))),
        1 => Ok(rows.remove(0)),
        _ => Err(exn::Exn::from(ErrorKind::AmbiguousMatch(format!(
            "multiple {entity} rows with id {key:?}"
        )))),
    }
}
