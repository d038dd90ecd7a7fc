//! Database row types and their conversions to the model values.
//!
//! Queries that return a file always join the owning build info and the
//! backing resource, so a single row carries the whole self-consistent
//! bundle the model exposes.

use crate::error::{Error, ErrorKind, Result};
use depot_model::{BuildInfo, File, FileKind, Resource, timestamp};
use exn::{OptionExt, ResultExt};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// The role a file plays for a component, independent of the file's own
/// kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Role {
    File,
    Source,
    Attachment,
}

impl Role {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Source => "source",
            Self::Attachment => "attachment",
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct BuildInfoRow {
    pub id: String,
    pub build_date: String,
    pub setup: String,
    pub creation_date: String,
    pub build_version: String,
    pub isready: bool,
}

impl TryFrom<BuildInfoRow> for BuildInfo {
    type Error = Error;

    fn try_from(row: BuildInfoRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            setup: row.setup,
            build_date: row.build_date,
            build_version: row.build_version,
            creation_date: timestamp::parse(&row.creation_date)?,
            isready: row.isready,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct ResourceRow {
    pub resource_id: String,
    pub path: String,
    pub size: i64,
    pub creation_date: String,
}

impl TryFrom<ResourceRow> for Resource {
    type Error = Error;

    fn try_from(row: ResourceRow) -> Result<Self> {
        Ok(Self {
            id: row.resource_id,
            path: PathBuf::from(row.path),
            size: u64::try_from(row.size).or_raise(|| ErrorKind::InvalidData("resource size"))?,
            creation_date: timestamp::parse(&row.creation_date)?,
        })
    }
}

/// One row of the files/buildinfos/resources join.
#[derive(sqlx::FromRow)]
pub(crate) struct FileJoinRow {
    pub file_id: String,
    pub file_name: String,
    pub alias: String,
    pub filename: String,
    pub file_build_id: String,
    pub file_kind: String,
    pub file_resource_id: String,
    pub revision: String,
    pub file_metadata: String,
    pub build_date: String,
    pub setup: String,
    pub build_creation_date: String,
    pub build_version: String,
    pub isready: bool,
    pub resource_path: String,
    pub resource_size: i64,
    pub resource_creation_date: String,
}

impl FileJoinRow {
    /// Convert into a [`File`] bundle.
    ///
    /// `internal` is the role-level flag from a `component_files` row when
    /// the file was reached through a component; file-level queries pass
    /// `None` and get the kind-based default.
    pub(crate) fn into_file(self, internal: Option<bool>) -> Result<File> {
        let kind: FileKind = self.file_kind.parse()?;
        let build = BuildInfo {
            id: self.file_build_id.clone(),
            setup: self.setup,
            build_date: self.build_date,
            build_version: self.build_version,
            creation_date: timestamp::parse(&self.build_creation_date)?,
            isready: self.isready,
        };
        let resource = Resource {
            id: self.file_resource_id.clone(),
            path: PathBuf::from(&self.resource_path),
            size: u64::try_from(self.resource_size)
                .or_raise(|| ErrorKind::InvalidData("resource size"))?,
            creation_date: timestamp::parse(&self.resource_creation_date)?,
        };
        let downloaded_as =
            (!self.resource_path.is_empty()).then(|| PathBuf::from(&self.resource_path));
        Ok(File {
            id: Some(self.file_id),
            build_id: self.file_build_id,
            kind,
            name: self.file_name,
            alias: self.alias,
            filename: self.filename,
            resource_id: Some(self.file_resource_id),
            revision: self.revision,
            metadata: metadata_from_text(&self.file_metadata)?,
            internal: internal.unwrap_or_else(|| kind.default_internal()),
            build: Some(build),
            resource: Some(resource),
            downloaded_as,
            unpack_dir: None,
        })
    }
}

/// A `component_files` row joined with the file bundle it points at.
#[derive(sqlx::FromRow)]
pub(crate) struct ComponentFileJoinRow {
    pub role_internal: bool,
    pub attachment_name: Option<String>,
    #[sqlx(flatten)]
    pub file: FileJoinRow,
}

#[derive(sqlx::FromRow)]
pub(crate) struct ComponentRow {
    pub id: String,
    pub name: String,
    pub platform: String,
    pub version: String,
    pub specname: Option<String>,
    pub build_id: String,
    pub creation_date: String,
    pub is_valid: bool,
    pub is_published: bool,
    pub readme_id: Option<String>,
    pub metadata: String,
}

pub(crate) fn metadata_from_text(text: &str) -> Result<Map<String, Value>> {
    if text.is_empty() {
        return Ok(Map::new());
    }
    serde_json::from_str(text).or_raise(|| ErrorKind::InvalidData("metadata"))
}

pub(crate) fn metadata_to_text(metadata: &Map<String, Value>) -> Result<String> {
    if metadata.is_empty() {
        return Ok("{}".to_string());
    }
    serde_json::to_string(metadata).or_raise(|| ErrorKind::InvalidData("metadata"))
}

/// SQLite columns are text; reject paths that aren't valid UTF-8 instead of
/// storing something lossy.
pub(crate) fn path_to_text(path: &Path) -> Result<String> {
    Ok(path
        .to_str()
        .ok_or_raise(|| ErrorKind::InvalidData("path"))?
        .to_string())
}
