//! Raw-add operations: merge records from another store verbatim.
//!
//! Unlike the submit paths, raw adds preserve ids and creation dates so a
//! local mirror stays byte-for-byte consistent with its upstream. They are
//! idempotent: adding something that is already present is a no-op that
//! rewrites the caller's record with the locally stored one.

use crate::builds::raw_add_build_info_conn;
use crate::components::{
    get_component_row_opt, insert_component_file_conn, insert_component_release_conn,
    load_component_conn,
};
use crate::error::{ErrorKind, Result, SqlxResultExt};
use crate::files::get_source_info_conn;
use crate::resources::ensure_resource_raw;
use crate::rows::{Role, metadata_to_text};
use crate::store::Store;
use depot_model::{Component, File, timestamp};
use exn::OptionExt;
use sqlx::SqliteConnection;

pub(crate) async fn raw_add_file_conn(conn: &mut SqliteConnection, file: &mut File) -> Result<bool> {
    // A matching file (same name and kind, visible at the file's build)
    // means this record is already known; hand the canonical local copy back
    // to the caller.
    match get_source_info_conn(conn, &file.name, &file.build_id, file.kind).await {
        Ok(existing) => {
            *file = existing;
            return Ok(false);
        }
        Err(err) if matches!(&*err, ErrorKind::NotFound(_)) => {}
        Err(err) => return Err(err),
    }

    let fid = file
        .id
        .clone()
        .ok_or_raise(|| ErrorKind::InvalidInput(format!("cannot raw-add file {:?} without an id", file.name)))?;
    let build = file.build.clone().ok_or_raise(|| {
        ErrorKind::InvalidInput(format!("cannot raw-add file {:?} without embedded build info", file.name))
    })?;
    let resource = file.resource.clone().ok_or_raise(|| {
        ErrorKind::InvalidInput(format!("cannot raw-add file {:?} without an embedded resource", file.name))
    })?;

    // The file row itself; only the local row's creation date is fresh, it
    // is not part of the file identity.
    sqlx::query(include_str!("../queries/insert_file.sql"))
        .bind(&fid)
        .bind(&file.name)
        .bind(&file.alias)
        .bind(&file.filename)
        .bind(&file.build_id)
        .bind(file.kind.as_str())
        .bind(&resource.id)
        .bind(&file.revision)
        .bind(metadata_to_text(&file.metadata)?)
        .bind(timestamp::format(timestamp::now())?)
        .execute(&mut *conn)
        .await
        .or_db_err()?;

    // The lookback in get_source_info means the file's build may differ from
    // the build it was queried under; register the one it actually carries.
    raw_add_build_info_conn(conn, &build).await?;

    let stored = ensure_resource_raw(conn, &resource).await?;
    if !stored.path.as_os_str().is_empty() {
        file.downloaded_as = Some(stored.path.clone());
    }
    file.resource = Some(stored);
    tracing::debug!(name = %file.name, kind = %file.kind, "raw-added file");
    Ok(true)
}

pub(crate) async fn raw_add_component_conn(
    conn: &mut SqliteConnection,
    component: &mut Component,
) -> Result<bool> {
    let component_id = component.id.clone().ok_or_raise(|| {
        ErrorKind::InvalidInput(format!("cannot raw-add component {:?} without an id", component.name))
    })?;
    if let Some(row) = get_component_row_opt(conn, &component_id).await? {
        *component = load_component_conn(conn, row).await?;
        return Ok(false);
    }

    for file in component.files.iter_mut().chain(component.sources.iter_mut()) {
        raw_add_file_conn(conn, file).await?;
    }
    for file in component.attachments.values_mut() {
        raw_add_file_conn(conn, file).await?;
    }
    if let Some(readme) = component.readme.as_mut() {
        raw_add_file_conn(conn, readme).await?;
    }

    let build = component.build.clone().ok_or_raise(|| {
        ErrorKind::InvalidInput(format!(
            "cannot raw-add component {:?} without embedded build info",
            component.name
        ))
    })?;
    raw_add_build_info_conn(conn, &build).await?;

    let build_id = if build.id.is_empty() { component.build_id.clone() } else { build.id.clone() };
    if build_id.is_empty() {
        exn::bail!(ErrorKind::InvalidInput(
            "no build id associated with the component to add".to_string()
        ));
    }

    sqlx::query(include_str!("../queries/insert_component.sql"))
        .bind(&component_id)
        .bind(&component.name)
        .bind(&component.platform)
        .bind(&component.version)
        .bind(component.specname.as_deref())
        .bind(&build_id)
        .bind(timestamp::format(component.creation_date)?)
        .bind(component.is_valid)
        .bind(component.is_published)
        .bind(component.readme.as_ref().and_then(|readme| readme.id.as_deref()))
        .bind(metadata_to_text(&component.metadata)?)
        .execute(&mut *conn)
        .await
        .or_db_err()?;

    for file in &component.files {
        let fid = file.id.as_deref().ok_or_raise(|| ErrorKind::InvalidData("file id"))?;
        insert_component_file_conn(conn, Role::File, fid, &component_id, file.internal, None).await?;
    }
    for file in &component.sources {
        let fid = file.id.as_deref().ok_or_raise(|| ErrorKind::InvalidData("file id"))?;
        insert_component_file_conn(conn, Role::Source, fid, &component_id, file.internal, None).await?;
    }
    for (name, file) in &component.attachments {
        let fid = file.id.as_deref().ok_or_raise(|| ErrorKind::InvalidData("file id"))?;
        insert_component_file_conn(conn, Role::Attachment, fid, &component_id, file.internal, Some(name.as_str()))
            .await?;
    }
    for release in &component.releases {
        insert_component_release_conn(conn, release, &component_id).await?;
    }
    tracing::debug!(name = %component.name, platform = %component.platform, "raw-added component");
    Ok(true)
}

impl Store {
    /// Insert a file record verbatim (id, metadata, embedded build and
    /// resource preserved).
    ///
    /// When a matching file already exists locally, the caller's record is
    /// overwritten with the stored one and `false` is returned.
    pub async fn raw_add_file(&self, file: &mut File) -> Result<bool> {
        let mut tx = self.begin().await?;
        let inserted = raw_add_file_conn(&mut *tx, file).await?;
        tx.commit().await.or_db_err()?;
        Ok(inserted)
    }

    /// Insert a component and everything it references verbatim.
    ///
    /// When a component with the same id already exists locally, the
    /// caller's record is overwritten with the stored one and `false` is
    /// returned. The whole graph (files, build infos, component row, join
    /// rows) commits as one unit.
    pub async fn raw_add_component(&self, component: &mut Component) -> Result<bool> {
        let mut tx = self.begin().await?;
        let inserted = raw_add_component_conn(&mut *tx, component).await?;
        tx.commit().await.or_db_err()?;
        Ok(inserted)
    }
}

#[cfg(test)]
mod tests {
    use crate::error::ErrorKind;
    use crate::fixtures;
    use depot_model::{Component, FileKind};

    #[tokio::test]
    async fn test_raw_add_file_round_trip() {
        let store = fixtures::store().await;
        let build = fixtures::foreign_build("b-up", "test", "20241028");
        let mut file = fixtures::foreign_file("f-up", &build, FileKind::Source, "gdb-src");

        assert!(store.raw_add_file(&mut file).await.unwrap());
        let fetched = store.get_source_info("gdb-src", "b-up", FileKind::Source).await.unwrap();
        assert_eq!(fetched, file);
        // The embedded build was registered along with the file.
        assert_eq!(store.get_build_info("b-up").await.unwrap(), build);
    }

    #[tokio::test]
    async fn test_raw_add_file_twice_is_noop() {
        let store = fixtures::store().await;
        let build = fixtures::foreign_build("b-up", "test", "20241028");
        let mut file = fixtures::foreign_file("f-up", &build, FileKind::Source, "gdb-src");
        assert!(store.raw_add_file(&mut file).await.unwrap());

        let mut replay = fixtures::foreign_file("f-up", &build, FileKind::Source, "gdb-src");
        replay.revision = "locally divergent".to_string();
        assert!(!store.raw_add_file(&mut replay).await.unwrap());
        // The caller's record was rewritten with the canonical stored one.
        assert_eq!(replay, file);

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM files")
            .fetch_one(store.database().pool())
            .await
            .unwrap();
        assert_eq!(count.0, 1);
    }

    #[tokio::test]
    async fn test_raw_add_file_requires_embedded_build() {
        let store = fixtures::store().await;
        let build = fixtures::foreign_build("b-up", "test", "20241028");
        let mut file = fixtures::foreign_file("f-up", &build, FileKind::Source, "gdb-src");
        file.build = None;
        let err = store.raw_add_file(&mut file).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_raw_add_component_round_trip() {
        let store = fixtures::store().await;
        let build = fixtures::foreign_build("b-up", "test", "20241028");
        let mut component = fixtures::foreign_component("c-up", &build, "gdb", "x86_64-linux");

        assert!(store.raw_add_component(&mut component).await.unwrap());
        let fetched = store.get_component("c-up").await.unwrap();
        assert_eq!(fetched, component);
        assert_eq!(fetched.files.len(), 1);
        assert_eq!(fetched.sources.len(), 1);
        assert_eq!(fetched.releases, component.releases);
    }

    #[tokio::test]
    async fn test_raw_add_component_twice_is_noop() {
        let store = fixtures::store().await;
        let build = fixtures::foreign_build("b-up", "test", "20241028");
        let mut component = fixtures::foreign_component("c-up", &build, "gdb", "x86_64-linux");
        assert!(store.raw_add_component(&mut component).await.unwrap());

        let mut replay = fixtures::foreign_component("c-up", &build, "gdb", "x86_64-linux");
        replay.version = "99".to_string();
        assert!(!store.raw_add_component(&mut replay).await.unwrap());
        assert_eq!(replay, component);

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM component_releases")
            .fetch_one(store.database().pool())
            .await
            .unwrap();
        assert_eq!(count.0, component.releases.len() as i64);
    }

    #[tokio::test]
    async fn test_raw_add_component_requires_id() {
        let store = fixtures::store().await;
        let mut component = Component::new("b-1", "gdb", "x86_64-linux", "1");
        let err = store.raw_add_component(&mut component).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidInput(_)));
    }
}
