use crate::build::BuildInfo;
use crate::error::{Error, ErrorKind, Result};
use crate::resource::{Resource, resource_id};
use crate::timestamp;
use derive_more::Display;
use exn::ResultExt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// The kind of file object to be stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    #[display("source")]
    Source,
    #[display("readme")]
    Readme,
    #[display("thirdparty")]
    Thirdparty,
    #[display("binary")]
    Binary,
    #[display("attachment")]
    Attachment,
}

impl FileKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Readme => "readme",
            Self::Thirdparty => "thirdparty",
            Self::Binary => "binary",
            Self::Attachment => "attachment",
        }
    }

    /// Read-time default for the `internal` flag. Binaries are build
    /// products meant to be shipped, everything else stays internal unless
    /// explicitly flagged otherwise.
    pub fn default_internal(self) -> bool {
        !matches!(self, Self::Binary)
    }
}

impl FromStr for FileKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "source" => Ok(Self::Source),
            "readme" => Ok(Self::Readme),
            "thirdparty" => Ok(Self::Thirdparty),
            "binary" => Ok(Self::Binary),
            "attachment" => Ok(Self::Attachment),
            _ => Err(exn::Exn::from(ErrorKind::InvalidData("file kind"))),
        }
    }
}

/// A named handle to a [`Resource`], qualified by kind, build id and
/// free-form metadata.
///
/// A value returned by a store query is a self-consistent bundle: the
/// embedded [`BuildInfo`] and [`Resource`] always match `build_id` and
/// `resource_id`. A value built locally for submission may leave `id`,
/// `build` and `resource` unset until [`bind_to_resource`](Self::bind_to_resource)
/// and submission fill them in.
#[derive(Debug, Clone)]
pub struct File {
    /// Store-assigned id; `None` until the file has been submitted.
    pub id: Option<String>,
    pub build_id: String,
    pub kind: FileKind,
    /// Name of the stored entry (not the filename).
    pub name: String,
    /// Expected filename.
    pub filename: String,
    /// Alternate filename; defaults to `filename`.
    pub alias: String,
    pub resource_id: Option<String>,
    /// Free-form revision information.
    pub revision: String,
    /// Opaque metadata blob, round-tripped without interpretation.
    pub metadata: Map<String, Value>,
    /// Whether the file may only be distributed internally.
    pub internal: bool,
    pub build: Option<BuildInfo>,
    pub resource: Option<Resource>,
    /// Local path of the bytes. Not part of the file identity.
    pub downloaded_as: Option<PathBuf>,
    /// Local unpack directory. Not part of the file identity.
    pub unpack_dir: Option<PathBuf>,
}

// downloaded_as and unpack_dir are local-machine state, not identity.
impl PartialEq for File {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.build_id == other.build_id
            && self.kind == other.kind
            && self.name == other.name
            && self.filename == other.filename
            && self.alias == other.alias
            && self.resource_id == other.resource_id
            && self.revision == other.revision
            && self.metadata == other.metadata
            && self.internal == other.internal
            && self.build == other.build
            && self.resource == other.resource
    }
}

impl File {
    pub fn new(
        build_id: impl Into<String>,
        kind: FileKind,
        name: impl Into<String>,
        filename: impl Into<String>,
    ) -> Self {
        let filename = filename.into();
        Self {
            id: None,
            build_id: build_id.into(),
            kind,
            name: name.into(),
            alias: filename.clone(),
            filename,
            resource_id: None,
            revision: String::new(),
            metadata: Map::new(),
            internal: true,
            build: None,
            resource: None,
            downloaded_as: None,
            unpack_dir: None,
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = alias.into();
        self
    }

    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = revision.into();
        self
    }

    pub fn with_resource_id(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = Some(resource_id.into());
        self
    }

    pub fn with_internal(mut self, internal: bool) -> Self {
        self.internal = internal;
        self
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_build(mut self, build: BuildInfo) -> Self {
        self.build_id = build.id.clone();
        self.build = Some(build);
        self
    }

    /// Bind this file to the bytes at `path`.
    ///
    /// Computes the BLAKE3 content id when `resource_id` is unset, records
    /// the absolute local path in `downloaded_as` and synthesizes the
    /// embedded [`Resource`] when none is attached yet.
    pub fn bind_to_resource(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = std::path::absolute(path.as_ref())
            .or_raise(|| ErrorKind::ResourceIo(path.as_ref().to_path_buf()))?;
        let meta = std::fs::metadata(&path).or_raise(|| ErrorKind::ResourceIo(path.clone()))?;
        if !meta.is_file() {
            exn::bail!(ErrorKind::ResourceIo(path));
        }
        let rid = match self.resource_id.clone() {
            Some(rid) => rid,
            None => {
                let rid = resource_id(&path)?;
                self.resource_id = Some(rid.clone());
                rid
            }
        };
        if self.resource.is_none() {
            self.resource = Some(Resource {
                id: rid.clone(),
                path: path.clone(),
                size: meta.len(),
                creation_date: timestamp::now(),
            });
        }
        if self.resource.as_ref().is_some_and(|r| r.id != rid) {
            exn::bail!(ErrorKind::InvalidInput(format!(
                "file {:?}: resource_id does not match the embedded resource id",
                self.name
            )));
        }
        self.downloaded_as = Some(path);
        Ok(())
    }

    /// Build a [`File`] from its dictionary shape, applying the documented
    /// field defaults: the alias falls back to the filename, the revision to
    /// the empty string, and the `internal` flag to the kind default.
    pub fn load(dict: FileDict) -> Result<Self> {
        if let (Some(resource), Some(rid)) = (&dict.resource, &dict.resource_id) {
            if resource.id != *rid {
                exn::bail!(ErrorKind::InvalidInput(format!(
                    "file {:?}: resource_id does not match the embedded resource id",
                    dict.name
                )));
            }
        }
        let alias = dict.alias.unwrap_or_else(|| dict.filename.clone());
        let internal = dict.internal.unwrap_or_else(|| dict.kind.default_internal());
        Ok(Self {
            id: dict.id,
            build_id: dict.build_id,
            kind: dict.kind,
            name: dict.name,
            alias,
            filename: dict.filename,
            resource_id: dict.resource_id,
            revision: dict.revision.unwrap_or_default(),
            metadata: dict.metadata.unwrap_or_default(),
            internal,
            build: dict.build,
            resource: dict.resource,
            downloaded_as: dict.downloaded_as,
            unpack_dir: dict.unpack_dir,
        })
    }

    /// Dictionary shape of this file, with every optional field made explicit.
    pub fn as_dict(&self) -> FileDict {
        FileDict {
            id: self.id.clone(),
            build_id: self.build_id.clone(),
            kind: self.kind,
            name: self.name.clone(),
            alias: Some(self.alias.clone()),
            filename: self.filename.clone(),
            resource_id: self.resource_id.clone(),
            revision: Some(self.revision.clone()),
            metadata: Some(self.metadata.clone()),
            internal: Some(self.internal),
            build: self.build.clone(),
            resource: self.resource.clone(),
            downloaded_as: self.downloaded_as.clone(),
            unpack_dir: self.unpack_dir.clone(),
        }
    }

    /// Path of the JSON sidecar describing a downloaded file.
    pub fn metadata_path(dest_dir: &Path, name: &str) -> PathBuf {
        dest_dir.join(format!("{name}_meta.json"))
    }

    /// Dump this file's dictionary shape next to the downloaded bytes.
    pub fn save_to_meta_file(&self, dest_dir: &Path, name: &str) -> Result<()> {
        let path = Self::metadata_path(dest_dir, name);
        let text = serde_json::to_string_pretty(&self.as_dict())
            .or_raise(|| ErrorKind::InvalidData("file meta"))?;
        std::fs::write(&path, text).or_raise(|| ErrorKind::ResourceIo(path))
    }

    pub fn load_from_meta_file(dest_dir: &Path, name: &str) -> Result<Self> {
        let path = Self::metadata_path(dest_dir, name);
        let text = std::fs::read_to_string(&path).or_raise(|| ErrorKind::ResourceIo(path))?;
        let dict: FileDict =
            serde_json::from_str(&text).or_raise(|| ErrorKind::InvalidData("file meta"))?;
        Self::load(dict)
    }

    /// Like [`load_from_meta_file`](Self::load_from_meta_file), but any
    /// failure reads as "no previous metadata".
    pub fn try_load_from_meta_file(dest_dir: &Path, name: &str) -> Option<Self> {
        Self::load_from_meta_file(dest_dir, name).ok()
    }
}

/// Boundary dictionary shape for [`File`], as exchanged with meta-files and
/// remote stores. Optional fields mirror what the wire actually carries; the
/// store-side row does not persist `downloaded_as` or `unpack_dir`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileDict {
    #[serde(rename = "_id", default)]
    pub id: Option<String>,
    pub build_id: String,
    pub kind: FileKind,
    pub name: String,
    #[serde(default)]
    pub alias: Option<String>,
    pub filename: String,
    #[serde(default)]
    pub resource_id: Option<String>,
    #[serde(default)]
    pub revision: Option<String>,
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
    #[serde(default)]
    pub internal: Option<bool>,
    #[serde(default)]
    pub build: Option<BuildInfo>,
    #[serde(default)]
    pub resource: Option<Resource>,
    #[serde(default)]
    pub downloaded_as: Option<PathBuf>,
    #[serde(default)]
    pub unpack_dir: Option<PathBuf>,
}
