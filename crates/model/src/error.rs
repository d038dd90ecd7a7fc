//! Depot Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction. The one family is shared by every
//! depot crate so callers can match a single kind enum across the whole
//! store surface.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A depot error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for depot operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The requested entity is not in the store.
    #[display("not found: {_0}")]
    NotFound(#[error(not(source))] String),
    /// A lookup by unique id matched more than one row (database corruption).
    #[display("ambiguous match: {_0}")]
    AmbiguousMatch(#[error(not(source))] String),
    /// The submitted value is unusable as given.
    #[display("invalid input: {_0}")]
    InvalidInput(#[error(not(source))] String),
    /// Primary-key collision on a raw-add path.
    #[display("conflict: {_0}")]
    Conflict(#[error(not(source))] String),
    /// Resource bytes could not be read or written.
    #[display("resource I/O error: {}", _0.display())]
    ResourceIo(#[error(not(source))] PathBuf),
    /// A stored or serialized value failed to convert back into its model type.
    #[display("invalid data: {_0}")]
    InvalidData(#[error(not(source))] &'static str),
    #[display("database error")]
    Database,
    #[display("database migration error")]
    Migration,
}
