use crate::error::{ErrorKind, Result};
use crate::timestamp;
use exn::ResultExt;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use time::UtcDateTime;

/// The content-addressed bytes backing a [`File`](crate::File).
///
/// A resource is identified by an opaque content id, conventionally the
/// BLAKE3 digest of the bytes. The id and size never change once created;
/// the path may be rewritten when the bytes move on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
    /// Where the bytes currently live on the local filesystem.
    pub path: PathBuf,
    pub size: u64,
    #[serde(with = "timestamp::serde_format")]
    pub creation_date: UtcDateTime,
}

/// BLAKE3 hex digest of the file at `path`, the conventional content id.
pub fn resource_id(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).or_raise(|| ErrorKind::ResourceIo(path.to_path_buf()))?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}
