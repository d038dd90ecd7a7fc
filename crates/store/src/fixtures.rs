//! Shared test fixtures.

use crate::store::Store;
use depot_model::{BuildInfo, Component, File, FileKind, Resource, timestamp};
use std::path::{Path, PathBuf};

pub(crate) async fn store() -> Store {
    Store::in_memory().await.unwrap()
}

/// Write `bytes` under `dir/name` and return the path.
pub(crate) fn payload(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

/// A file handle bound to local bytes, ready for submission.
pub(crate) fn bound_file(bid: &str, kind: FileKind, name: &str, path: &Path) -> File {
    let filename = path.file_name().unwrap().to_string_lossy().to_string();
    let mut file = File::new(bid, kind, name, filename);
    file.bind_to_resource(path).unwrap();
    file
}

/// A build info as it would arrive from an upstream store: id and creation
/// date already assigned, marked ready.
pub(crate) fn foreign_build(id: &str, setup: &str, date: &str) -> BuildInfo {
    BuildInfo {
        id: id.to_string(),
        setup: setup.to_string(),
        build_date: date.to_string(),
        build_version: "1.0".to_string(),
        creation_date: timestamp::now(),
        isready: true,
    }
}

/// A fully-populated file bundle as it would arrive from an upstream store.
/// The resource path intentionally points at a machine we don't have.
pub(crate) fn foreign_file(id: &str, build: &BuildInfo, kind: FileKind, name: &str) -> File {
    let resource = Resource {
        id: format!("res-{id}"),
        path: PathBuf::from(format!("/upstream/store/{id}.tgz")),
        size: 128,
        creation_date: timestamp::now(),
    };
    let mut file = File::new(&build.id, kind, name, format!("{name}.tgz"))
        .with_build(build.clone())
        .with_resource_id(resource.id.clone())
        .with_internal(kind.default_internal());
    file.downloaded_as = Some(resource.path.clone());
    file.resource = Some(resource);
    file.id = Some(id.to_string());
    file
}

/// A component bundle as it would arrive from an upstream store: one binary,
/// one source and a release label.
pub(crate) fn foreign_component(id: &str, build: &BuildInfo, name: &str, platform: &str) -> Component {
    let binary = foreign_file(&format!("{id}-bin"), build, FileKind::Binary, name);
    let source = foreign_file(&format!("{id}-src"), build, FileKind::Source, &format!("{name}-src"));
    let mut component = Component::new(&build.id, name, platform, "1")
        .with_build(build.clone())
        .with_files(vec![binary])
        .with_sources(vec![source])
        .with_releases(vec!["gnat-25".to_string()]);
    component.id = Some(id.to_string());
    component
}
