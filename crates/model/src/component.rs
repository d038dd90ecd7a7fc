use crate::build::BuildInfo;
use crate::error::{ErrorKind, Result};
use crate::file::{File, FileDict};
use crate::timestamp;
use exn::ResultExt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use time::UtcDateTime;

/// A shippable aggregate: binaries, sources, readme, attachments and release
/// labels, qualified by `(name, platform, version, build_id)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    /// Store-assigned id; `None` until the component has been submitted.
    pub id: Option<String>,
    pub build_id: String,
    pub name: String,
    pub platform: String,
    pub version: String,
    /// Name of the spec that produced the component, when known.
    pub specname: Option<String>,
    /// Binary files (role `file`).
    pub files: Vec<File>,
    /// Source files (role `source`), assumed already uploaded on submission.
    pub sources: Vec<File>,
    pub readme: Option<File>,
    /// Attachments keyed by their caller-chosen unique name.
    pub attachments: BTreeMap<String, File>,
    /// Release labels this component belongs to.
    pub releases: Vec<String>,
    pub is_valid: bool,
    pub is_published: bool,
    pub creation_date: UtcDateTime,
    /// Opaque metadata blob, round-tripped without interpretation.
    pub metadata: Map<String, Value>,
    pub build: Option<BuildInfo>,
}

impl Component {
    pub fn new(
        build_id: impl Into<String>,
        name: impl Into<String>,
        platform: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            build_id: build_id.into(),
            name: name.into(),
            platform: platform.into(),
            version: version.into(),
            specname: None,
            files: Vec::new(),
            sources: Vec::new(),
            readme: None,
            attachments: BTreeMap::new(),
            releases: Vec::new(),
            is_valid: true,
            is_published: false,
            creation_date: timestamp::now(),
            metadata: Map::new(),
            build: None,
        }
    }

    pub fn with_specname(mut self, specname: impl Into<String>) -> Self {
        self.specname = Some(specname.into());
        self
    }

    pub fn with_files(mut self, files: Vec<File>) -> Self {
        self.files = files;
        self
    }

    pub fn with_sources(mut self, sources: Vec<File>) -> Self {
        self.sources = sources;
        self
    }

    pub fn with_readme(mut self, readme: File) -> Self {
        self.readme = Some(readme);
        self
    }

    pub fn with_releases(mut self, releases: Vec<String>) -> Self {
        self.releases = releases;
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

    /// Attach `file` under the composite key `"{key},{filename}"`.
    ///
    /// Returns the key actually used, or `None` when that key is already
    /// taken and `overwrite_existing` is false.
    pub fn add_attachment(&mut self, key: &str, file: File, overwrite_existing: bool) -> Option<String> {
        let file_key = format!("{key},{}", file.filename);
        if self.attachments.contains_key(&file_key) && !overwrite_existing {
            return None;
        }
        self.attachments.insert(file_key.clone(), file);
        Some(file_key)
    }

    /// All attachments whose key starts with `prefix` (everything when empty).
    pub fn attachments_matching(&self, prefix: &str) -> BTreeMap<&str, &File> {
        self.attachments
            .iter()
            .filter(|(key, _)| prefix.is_empty() || key.starts_with(prefix))
            .map(|(key, file)| (key.as_str(), file))
            .collect()
    }

    /// Remove all attachments whose key starts with `prefix` (everything
    /// when empty). Returns true when at least one attachment was removed.
    pub fn remove_attachments(&mut self, prefix: &str) -> bool {
        let before = self.attachments.len();
        self.attachments
            .retain(|key, _| !prefix.is_empty() && !key.starts_with(prefix));
        before != self.attachments.len()
    }

    /// Build a [`Component`] from its dictionary shape, normalizing the
    /// attachments to the map form.
    pub fn load(dict: ComponentDict) -> Result<Self> {
        let attachments = match dict.attachments {
            Some(attachments) => {
                let mut map = BTreeMap::new();
                for (name, file) in attachments.into_map()? {
                    map.insert(name, File::load(file)?);
                }
                map
            }
            None => BTreeMap::new(),
        };
        Ok(Self {
            id: dict.id,
            build_id: dict.build_id,
            name: dict.name,
            platform: dict.platform,
            version: dict.version,
            specname: dict.specname,
            files: dict.files.into_iter().map(File::load).collect::<Result<_>>()?,
            sources: dict.sources.into_iter().map(File::load).collect::<Result<_>>()?,
            readme: dict.readme.map(File::load).transpose()?,
            attachments,
            releases: dict.releases.unwrap_or_default(),
            is_valid: dict.is_valid,
            is_published: dict.is_published,
            creation_date: dict.creation_date,
            metadata: dict.metadata.unwrap_or_default(),
            build: dict.build,
        })
    }

    /// Dictionary shape of this component. Attachments are emitted in the
    /// map form, or omitted entirely when there are none.
    pub fn as_dict(&self) -> ComponentDict {
        let attachments = if self.attachments.is_empty() {
            None
        } else {
            Some(AttachmentsDict::Map(
                self.attachments
                    .iter()
                    .map(|(name, file)| (name.clone(), file.as_dict()))
                    .collect(),
            ))
        };
        ComponentDict {
            id: self.id.clone(),
            build_id: self.build_id.clone(),
            name: self.name.clone(),
            platform: self.platform.clone(),
            version: self.version.clone(),
            specname: self.specname.clone(),
            files: self.files.iter().map(File::as_dict).collect(),
            sources: self.sources.iter().map(File::as_dict).collect(),
            readme: self.readme.as_ref().map(File::as_dict),
            attachments,
            releases: Some(self.releases.clone()),
            is_valid: self.is_valid,
            is_published: self.is_published,
            creation_date: self.creation_date,
            metadata: Some(self.metadata.clone()),
            build: self.build.clone(),
        }
    }

    /// Path of the JSON sidecar describing a downloaded component.
    pub fn metadata_path(dest_dir: &Path, name: &str) -> PathBuf {
        dest_dir.join(format!("{name}_component.json"))
    }

    /// Dump this component's dictionary shape next to its downloaded files.
    pub fn save_to_meta_file(&self, dest_dir: &Path, name: Option<&str>) -> Result<()> {
        let path = Self::metadata_path(dest_dir, name.unwrap_or(&self.name));
        let text = serde_json::to_string_pretty(&self.as_dict())
            .or_raise(|| ErrorKind::InvalidData("component meta"))?;
        std::fs::write(&path, text).or_raise(|| ErrorKind::ResourceIo(path))
    }

    pub fn load_from_meta_file(dest_dir: &Path, name: &str) -> Result<Self> {
        let path = Self::metadata_path(dest_dir, name);
        let text = std::fs::read_to_string(&path).or_raise(|| ErrorKind::ResourceIo(path))?;
        let dict: ComponentDict =
            serde_json::from_str(&text).or_raise(|| ErrorKind::InvalidData("component meta"))?;
        Self::load(dict)
    }

    /// Like [`load_from_meta_file`](Self::load_from_meta_file), but any
    /// failure reads as "no previous metadata".
    pub fn try_load_from_meta_file(dest_dir: &Path, name: &str) -> Option<Self> {
        Self::load_from_meta_file(dest_dir, name).ok()
    }
}

/// Attachments arrive either keyed by name or as a list of
/// `{name, att_file}` records. Both shapes normalize to the map form.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttachmentsDict {
    Map(BTreeMap<String, FileDict>),
    List(Vec<AttachmentEntry>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentEntry {
    pub name: String,
    pub att_file: FileDict,
}

impl AttachmentsDict {
    /// Normalize to the map form, rejecting duplicate names in the list form.
    pub fn into_map(self) -> Result<BTreeMap<String, FileDict>> {
        match self {
            Self::Map(map) => Ok(map),
            Self::List(entries) => {
                let mut map = BTreeMap::new();
                for entry in entries {
                    if map.contains_key(&entry.name) {
                        exn::bail!(ErrorKind::InvalidInput(format!(
                            "two attachments cannot use the same name: {:?}",
                            entry.name
                        )));
                    }
                    map.insert(entry.name, entry.att_file);
                }
                Ok(map)
            }
        }
    }
}

/// Boundary dictionary shape for [`Component`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentDict {
    #[serde(rename = "_id", default)]
    pub id: Option<String>,
    pub build_id: String,
    pub name: String,
    pub platform: String,
    pub version: String,
    #[serde(default)]
    pub specname: Option<String>,
    #[serde(default)]
    pub files: Vec<FileDict>,
    #[serde(default)]
    pub sources: Vec<FileDict>,
    #[serde(default)]
    pub readme: Option<FileDict>,
    #[serde(default)]
    pub attachments: Option<AttachmentsDict>,
    #[serde(default)]
    pub releases: Option<Vec<String>>,
    #[serde(default = "default_true")]
    pub is_valid: bool,
    #[serde(default)]
    pub is_published: bool,
    #[serde(with = "timestamp::serde_format")]
    pub creation_date: UtcDateTime,
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
    #[serde(default)]
    pub build: Option<BuildInfo>,
}

fn default_true() -> bool {
    true
}
