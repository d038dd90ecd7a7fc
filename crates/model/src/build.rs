use crate::timestamp;
use serde::{Deserialize, Serialize};
use time::UtcDateTime;

/// A build campaign: `(setup, build_date, build_version)` plus a
/// store-assigned id. Files and components are partitioned by build id.
///
/// The serialized shape matches the wire form, with the id carried as `_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildInfo {
    #[serde(rename = "_id")]
    pub id: String,
    /// Top-level namespace for builds (e.g. a product line).
    pub setup: String,
    /// Caller-chosen date label, conventionally compact `YYYYMMDD`.
    pub build_date: String,
    pub build_version: String,
    #[serde(with = "timestamp::serde_format")]
    pub creation_date: UtcDateTime,
    /// Monotonic false-to-true readiness flag.
    pub isready: bool,
}
