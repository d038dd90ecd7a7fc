//! File registry: named, versioned handles backed by resources.

use crate::builds;
use crate::error::{ErrorKind, Result, SqlxResultExt};
use crate::resources;
use crate::rows::{FileJoinRow, metadata_to_text};
use crate::store::{Store, filter_value, one_row, unique_id};
use depot_model::{File, FileKind, timestamp};
use exn::{OptionExt, ResultExt};
use sqlx::SqliteConnection;

pub(crate) async fn get_file_conn(conn: &mut SqliteConnection, fid: &str) -> Result<File> {
    let rows: Vec<FileJoinRow> = sqlx::query_as(include_str!("../queries/get_file.sql"))
        .bind(fid)
        .fetch_all(conn)
        .await
        .or_db_err()?;
    one_row(rows, "file", fid)?.into_file(None)
}

/// Look up a file by name and kind with the relaxed build scope: an exact
/// `build_id` match always qualifies, and sources/thirdparties produced
/// under any build created at or before `bid` qualify too. Sources are
/// produced by change, not by campaign, so "which source was current at
/// build B" means the most recent predecessor.
pub(crate) async fn get_source_info_conn(
    conn: &mut SqliteConnection,
    name: &str,
    bid: &str,
    kind: FileKind,
) -> Result<File> {
    let row: Option<FileJoinRow> = sqlx::query_as(include_str!("../queries/get_source_info.sql"))
        .bind(name)
        .bind(kind.as_str())
        .bind(bid)
        .bind(bid)
        .fetch_optional(conn)
        .await
        .or_db_err()?;
    row.ok_or_raise(|| {
        ErrorKind::NotFound(format!("no file matching name={name:?} kind={kind} bid={bid:?}"))
    })?
    .into_file(None)
}

/// Submit a file without committing; composed by the component submission
/// path so a component and its files land in one transaction.
pub(crate) async fn submit_file_conn(conn: &mut SqliteConnection, file: &File) -> Result<File> {
    let downloaded_as = file
        .downloaded_as
        .as_ref()
        .filter(|path| !path.as_os_str().is_empty())
        .ok_or_raise(|| {
            ErrorKind::InvalidInput(format!(
                "cannot submit file {:?} without 'downloaded_as'",
                file.name
            ))
        })?;
    let resource_id = file
        .resource_id
        .as_deref()
        .filter(|rid| !rid.is_empty())
        .ok_or_raise(|| {
            ErrorKind::InvalidInput(format!("cannot submit file {:?} without 'resource_id'", file.name))
        })?;
    let local_path = std::path::absolute(downloaded_as)
        .or_raise(|| ErrorKind::ResourceIo(downloaded_as.clone()))?;
    if !local_path.is_file() {
        exn::bail!(ErrorKind::ResourceIo(local_path));
    }
    // The owning campaign must already exist.
    builds::get_build_info_conn(conn, &file.build_id).await?;

    resources::ensure_resource(conn, resource_id, &local_path).await?;
    let fid = unique_id();
    sqlx::query(include_str!("../queries/insert_file.sql"))
        .bind(&fid)
        .bind(&file.name)
        .bind(&file.alias)
        .bind(&file.filename)
        .bind(&file.build_id)
        .bind(file.kind.as_str())
        .bind(resource_id)
        .bind(&file.revision)
        .bind(metadata_to_text(&file.metadata)?)
        .bind(timestamp::format(timestamp::now())?)
        .execute(&mut *conn)
        .await
        .or_db_err()?;
    tracing::debug!(name = %file.name, kind = %file.kind, "submitted file");

    let mut submitted = get_file_conn(conn, &fid).await?;
    submitted.downloaded_as = Some(downloaded_as.clone());
    Ok(submitted)
}

impl Store {
    /// Upload a file handle. The bytes must already be on the local
    /// filesystem at `downloaded_as`; the backing resource is created or
    /// reused by content id.
    pub async fn submit_file(&self, file: &File) -> Result<File> {
        let mut tx = self.begin().await?;
        let submitted = submit_file_conn(&mut *tx, file).await?;
        tx.commit().await.or_db_err()?;
        Ok(submitted)
    }

    /// Convenience wrapper for third-party uploads: forces the kind and
    /// clears the revision before submitting.
    pub async fn create_thirdparty(&self, file: &File) -> Result<File> {
        let mut thirdparty = file.clone();
        thirdparty.kind = FileKind::Thirdparty;
        thirdparty.revision = String::new();
        self.submit_file(&thirdparty).await
    }

    /// Replace the metadata blob of an already-uploaded file.
    pub async fn update_file_metadata(&self, file: &File) -> Result<File> {
        let build_id = if file.build_id.is_empty() {
            file.build.as_ref().map(|build| build.id.clone()).unwrap_or_default()
        } else {
            file.build_id.clone()
        };
        if build_id.is_empty() {
            exn::bail!(ErrorKind::InvalidInput("no build id associated with this file".to_string()));
        }
        if let Some(build) = &file.build {
            if build.id != build_id {
                exn::bail!(ErrorKind::InvalidInput(
                    "malformed file: build_id does not match the embedded build info".to_string()
                ));
            }
        }
        let fid = file
            .id
            .as_deref()
            .filter(|fid| !fid.is_empty())
            .ok_or_raise(|| {
                ErrorKind::InvalidInput("cannot update a file that has not been uploaded".to_string())
            })?;

        let mut tx = self.begin().await?;
        let result = sqlx::query(include_str!("../queries/update_file_metadata.sql"))
            .bind(metadata_to_text(&file.metadata)?)
            .bind(fid)
            .execute(&mut *tx)
            .await
            .or_db_err()?;
        if result.rows_affected() == 0 {
            exn::bail!(ErrorKind::NotFound(format!("no file with id {fid:?}")));
        }
        let updated = get_file_conn(&mut *tx, fid).await?;
        tx.commit().await.or_db_err()?;
        Ok(updated)
    }

    /// See [`get_source_info_conn`] for the lookback semantics.
    pub async fn get_source_info(&self, name: &str, bid: &str, kind: FileKind) -> Result<File> {
        let mut conn = self.acquire().await?;
        get_source_info_conn(&mut *conn, name, bid, kind).await
    }

    /// Most recent third-party file with the given name, optionally
    /// restricted by file id and resource id. Returns `None` when nothing
    /// matches.
    pub async fn latest_thirdparty(
        &self,
        name: &str,
        tp_id: Option<&str>,
        rid: Option<&str>,
    ) -> Result<Option<File>> {
        let tp_id = filter_value(tp_id);
        let rid = filter_value(rid);
        let mut conn = self.acquire().await?;
        let row: Option<FileJoinRow> = sqlx::query_as(include_str!("../queries/latest_thirdparty.sql"))
            .bind(name)
            .bind(tp_id)
            .bind(tp_id)
            .bind(rid)
            .bind(rid)
            .fetch_optional(&mut *conn)
            .await
            .or_db_err()?;
        row.map(|row| row.into_file(None)).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use depot_model::FileKind;

    #[tokio::test]
    async fn test_submit_file() {
        let store = fixtures::store().await;
        let dir = tempfile::tempdir().unwrap();
        let build = store.create_build_id("test", "20241028", "1.0").await.unwrap();
        let payload = fixtures::payload(dir.path(), "gdb-src.tgz", b"sources!");

        let file = fixtures::bound_file(&build.id, FileKind::Source, "gdb-src", &payload);
        let submitted = store.submit_file(&file).await.unwrap();

        assert!(submitted.id.is_some());
        assert_eq!(submitted.name, "gdb-src");
        assert_eq!(submitted.kind, FileKind::Source);
        assert_eq!(submitted.build_id, build.id);
        assert_eq!(submitted.build.as_ref().unwrap(), &build);
        let resource = submitted.resource.as_ref().unwrap();
        assert_eq!(Some(resource.id.as_str()), submitted.resource_id.as_deref());
        assert_eq!(resource.size, 8);
        assert!(submitted.downloaded_as.is_some());
    }

    #[tokio::test]
    async fn test_submit_file_requires_local_file() {
        let store = fixtures::store().await;
        let build = store.create_build_id("test", "20241028", "1.0").await.unwrap();

        let file = File::new(&build.id, FileKind::Source, "ghost", "ghost.tgz");
        let err = store.submit_file(&file).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidInput(_)));

        let mut file = File::new(&build.id, FileKind::Source, "ghost", "ghost.tgz")
            .with_resource_id("R");
        file.downloaded_as = Some("definitely/not/here.tgz".into());
        let err = store.submit_file(&file).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::ResourceIo(_)));
    }

    #[tokio::test]
    async fn test_submit_file_requires_resource_id() {
        let store = fixtures::store().await;
        let dir = tempfile::tempdir().unwrap();
        let build = store.create_build_id("test", "20241028", "1.0").await.unwrap();
        let payload = fixtures::payload(dir.path(), "x.bin", b"X");

        let mut file = File::new(&build.id, FileKind::Source, "x", "x.bin");
        file.downloaded_as = Some(payload);
        let err = store.submit_file(&file).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_submit_file_requires_build() {
        let store = fixtures::store().await;
        let dir = tempfile::tempdir().unwrap();
        let payload = fixtures::payload(dir.path(), "x.bin", b"X");
        let file = fixtures::bound_file("no-such-build", FileKind::Source, "x", &payload);
        let err = store.submit_file(&file).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_resource_dedup_across_files() {
        let store = fixtures::store().await;
        let dir = tempfile::tempdir().unwrap();
        let build = store.create_build_id("test", "20241028", "1.0").await.unwrap();
        let payload_a = fixtures::payload(dir.path(), "a.bin", b"same bytes");
        let payload_b = fixtures::payload(dir.path(), "b.bin", b"same bytes");

        let mut file_a = File::new(&build.id, FileKind::Source, "first", "a.bin")
            .with_resource_id("R");
        file_a.downloaded_as = Some(payload_a.clone());
        store.submit_file(&file_a).await.unwrap();

        let mut file_b = File::new(&build.id, FileKind::Source, "second", "b.bin")
            .with_resource_id("R");
        file_b.downloaded_as = Some(payload_b);
        let submitted_b = store.submit_file(&file_b).await.unwrap();

        // One resource row; the second submission reuses the first copy.
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM resources")
            .fetch_one(store.database().pool())
            .await
            .unwrap();
        assert_eq!(count.0, 1);
        assert_eq!(
            submitted_b.resource.as_ref().unwrap().path,
            std::path::absolute(&payload_a).unwrap()
        );

        let dest = dir.path().join("fetched.bin");
        store.download_resource("R", &dest).await.unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"same bytes");
    }

    #[tokio::test]
    async fn test_get_source_info_looks_back() {
        let store = fixtures::store().await;
        let dir = tempfile::tempdir().unwrap();
        let build1 = store.create_build_id("test", "20241027", "1.0").await.unwrap();
        let payload = fixtures::payload(dir.path(), "s.tgz", b"v1");
        let source = fixtures::bound_file(&build1.id, FileKind::Source, "s", &payload);
        let submitted = store.submit_file(&source).await.unwrap();

        let build2 = store.create_build_id("test", "20241028", "1.0").await.unwrap();
        let found = store.get_source_info("s", &build2.id, FileKind::Source).await.unwrap();
        assert_eq!(found.id, submitted.id);
        // The returned bundle carries the build it was actually produced
        // under, not the one it was queried for.
        assert_eq!(found.build.as_ref().unwrap().id, build1.id);
    }

    #[tokio::test]
    async fn test_get_source_info_binary_needs_exact_build() {
        let store = fixtures::store().await;
        let dir = tempfile::tempdir().unwrap();
        let build1 = store.create_build_id("test", "20241027", "1.0").await.unwrap();
        let payload = fixtures::payload(dir.path(), "gdb.bin", b"elf");
        let binary = fixtures::bound_file(&build1.id, FileKind::Binary, "gdb", &payload);
        store.submit_file(&binary).await.unwrap();

        let build2 = store.create_build_id("test", "20241028", "1.0").await.unwrap();
        let found = store.get_source_info("gdb", &build1.id, FileKind::Binary).await.unwrap();
        assert_eq!(found.name, "gdb");
        let err = store.get_source_info("gdb", &build2.id, FileKind::Binary).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_get_source_info_ignores_future_builds() {
        let store = fixtures::store().await;
        let dir = tempfile::tempdir().unwrap();
        let build1 = store.create_build_id("test", "20241026", "1.0").await.unwrap();
        let old = fixtures::bound_file(
            &build1.id,
            FileKind::Source,
            "s",
            &fixtures::payload(dir.path(), "old.tgz", b"v1"),
        );
        let old_submitted = store.submit_file(&old).await.unwrap();

        let build2 = store.create_build_id("test", "20241027", "1.0").await.unwrap();

        let build3 = store.create_build_id("test", "20241028", "1.0").await.unwrap();
        let new = fixtures::bound_file(
            &build3.id,
            FileKind::Source,
            "s",
            &fixtures::payload(dir.path(), "new.tgz", b"v2"),
        );
        store.submit_file(&new).await.unwrap();

        // Viewed from build2, the newer source does not exist yet.
        let found = store.get_source_info("s", &build2.id, FileKind::Source).await.unwrap();
        assert_eq!(found.id, old_submitted.id);
    }

    #[tokio::test]
    async fn test_create_thirdparty() {
        let store = fixtures::store().await;
        let dir = tempfile::tempdir().unwrap();
        let build = store.create_build_id("thirdparties", "20241028", "1.0").await.unwrap();
        let payload = fixtures::payload(dir.path(), "zlib.tgz", b"zlib");

        let mut file = fixtures::bound_file(&build.id, FileKind::Source, "zlib.tgz", &payload);
        file.revision = "should be cleared".to_string();
        let submitted = store.create_thirdparty(&file).await.unwrap();
        assert_eq!(submitted.kind, FileKind::Thirdparty);
        assert_eq!(submitted.revision, "");
    }

    #[tokio::test]
    async fn test_latest_thirdparty() {
        let store = fixtures::store().await;
        let dir = tempfile::tempdir().unwrap();
        let build = store.create_build_id("thirdparties", "20241028", "1.0").await.unwrap();

        assert!(store.latest_thirdparty("zlib.tgz", None, None).await.unwrap().is_none());

        let first = fixtures::bound_file(
            &build.id,
            FileKind::Thirdparty,
            "zlib.tgz",
            &fixtures::payload(dir.path(), "zlib-1.tgz", b"v1"),
        );
        let first = store.submit_file(&first).await.unwrap();
        let second = fixtures::bound_file(
            &build.id,
            FileKind::Thirdparty,
            "zlib.tgz",
            &fixtures::payload(dir.path(), "zlib-2.tgz", b"v2"),
        );
        let second = store.submit_file(&second).await.unwrap();

        let latest = store.latest_thirdparty("zlib.tgz", None, None).await.unwrap().unwrap();
        assert_eq!(latest.id, second.id);

        // Restricting by resource id finds the older copy.
        let by_rid = store
            .latest_thirdparty("zlib.tgz", None, first.resource_id.as_deref())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_rid.id, first.id);

        // The "all" wildcard behaves like no filter.
        let wildcard = store.latest_thirdparty("zlib.tgz", Some("all"), Some("all")).await.unwrap();
        assert_eq!(wildcard.unwrap().id, second.id);
    }

    #[tokio::test]
    async fn test_update_file_metadata() {
        let store = fixtures::store().await;
        let dir = tempfile::tempdir().unwrap();
        let build = store.create_build_id("test", "20241028", "1.0").await.unwrap();
        let payload = fixtures::payload(dir.path(), "s.tgz", b"v1");
        let file = fixtures::bound_file(&build.id, FileKind::Source, "s", &payload);
        let mut submitted = store.submit_file(&file).await.unwrap();

        submitted
            .metadata
            .insert("checked".to_string(), serde_json::Value::from(true));
        let updated = store.update_file_metadata(&submitted).await.unwrap();
        assert_eq!(updated.metadata, submitted.metadata);

        let reread = store.get_source_info("s", &build.id, FileKind::Source).await.unwrap();
        assert_eq!(reread.metadata, submitted.metadata);
    }

    #[tokio::test]
    async fn test_update_file_metadata_rejects_mismatched_build() {
        let store = fixtures::store().await;
        let dir = tempfile::tempdir().unwrap();
        let build = store.create_build_id("test", "20241028", "1.0").await.unwrap();
        let other = store.create_build_id("test", "20241029", "1.0").await.unwrap();
        let payload = fixtures::payload(dir.path(), "s.tgz", b"v1");
        let file = fixtures::bound_file(&build.id, FileKind::Source, "s", &payload);
        let mut submitted = store.submit_file(&file).await.unwrap();

        submitted.build = Some(other);
        let err = store.update_file_metadata(&submitted).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_update_file_metadata_requires_id() {
        let store = fixtures::store().await;
        let file = File::new("b-1", FileKind::Source, "s", "s.tgz");
        let err = store.update_file_metadata(&file).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidInput(_)));
    }
}
