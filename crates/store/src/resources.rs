//! Content-addressed resource layer.
//!
//! Resources deduplicate by content id: repeated submissions of identical
//! bytes across different files collapse into a single row and a single
//! on-disk copy. The store never reads the bytes itself; callers place them
//! and the store remembers where they are.

use crate::error::{ErrorKind, Result, SqlxResultExt};
use crate::rows::{ResourceRow, path_to_text};
use crate::store::{Store, one_row};
use depot_model::{Resource, timestamp};
use exn::ResultExt;
use sqlx::SqliteConnection;
use std::path::{Path, PathBuf};

pub(crate) async fn get_resource_opt(
    conn: &mut SqliteConnection,
    resource_id: &str,
) -> Result<Option<Resource>> {
    let rows: Vec<ResourceRow> = sqlx::query_as(include_str!("../queries/get_resource.sql"))
        .bind(resource_id)
        .fetch_all(conn)
        .await
        .or_db_err()?;
    if rows.is_empty() {
        return Ok(None);
    }
    Ok(Some(one_row(rows, "resource", resource_id)?.try_into()?))
}

pub(crate) async fn get_resource(conn: &mut SqliteConnection, resource_id: &str) -> Result<Resource> {
    get_resource_opt(conn, resource_id)
        .await?
        .ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(format!("no resource with id {resource_id:?}"))))
}

async fn update_resource_path(
    conn: &mut SqliteConnection,
    resource_id: &str,
    path: &Path,
) -> Result<Resource> {
    let row: ResourceRow = sqlx::query_as(include_str!("../queries/update_resource_path.sql"))
        .bind(path_to_text(path)?)
        .bind(resource_id)
        .fetch_one(conn)
        .await
        .or_db_err()?;
    row.try_into()
}

/// Ensure a resource row exists for bytes the caller has placed at
/// `local_path`.
///
/// If a row already exists it is reused; when its stored path is no longer a
/// file on disk, the path is rewritten to `local_path` (last writer wins).
pub(crate) async fn ensure_resource(
    conn: &mut SqliteConnection,
    resource_id: &str,
    local_path: &Path,
) -> Result<Resource> {
    let local_path = std::path::absolute(local_path)
        .or_raise(|| ErrorKind::ResourceIo(local_path.to_path_buf()))?;
    if let Some(existing) = get_resource_opt(conn, resource_id).await? {
        if existing.path.is_file() {
            return Ok(existing);
        }
        tracing::debug!(resource_id, path = %local_path.display(), "rebinding lost resource path");
        return update_resource_path(conn, resource_id, &local_path).await;
    }
    let meta = tokio::fs::metadata(&local_path)
        .await
        .or_raise(|| ErrorKind::ResourceIo(local_path.clone()))?;
    let size = i64::try_from(meta.len()).or_raise(|| ErrorKind::InvalidData("resource size"))?;
    let row: ResourceRow = sqlx::query_as(include_str!("../queries/insert_resource.sql"))
        .bind(resource_id)
        .bind(path_to_text(&local_path)?)
        .bind(size)
        .bind(timestamp::format(timestamp::now())?)
        .fetch_one(conn)
        .await
        .or_db_err()?;
    row.try_into()
}

/// Raw-add flavor of [`ensure_resource`]: the embedded resource record is
/// trusted verbatim (id, path, size and creation date), since the bytes may
/// live on another machine. Only the path is rewritten when the stored one
/// has been lost.
pub(crate) async fn ensure_resource_raw(
    conn: &mut SqliteConnection,
    resource: &Resource,
) -> Result<Resource> {
    if let Some(existing) = get_resource_opt(conn, &resource.id).await? {
        if existing.path.is_file() {
            return Ok(existing);
        }
        return update_resource_path(conn, &resource.id, &resource.path).await;
    }
    let size = i64::try_from(resource.size).or_raise(|| ErrorKind::InvalidData("resource size"))?;
    let row: ResourceRow = sqlx::query_as(include_str!("../queries/insert_resource.sql"))
        .bind(&resource.id)
        .bind(path_to_text(&resource.path)?)
        .bind(size)
        .bind(timestamp::format(resource.creation_date)?)
        .fetch_one(conn)
        .await
        .or_db_err()?;
    row.try_into()
}

impl Store {
    /// Copy the bytes behind `resource_id` to `dest` and return the absolute
    /// destination path.
    pub async fn download_resource(&self, resource_id: &str, dest: &Path) -> Result<PathBuf> {
        let resource = {
            let mut conn = self.acquire().await?;
            get_resource(&mut *conn, resource_id).await?
        };
        let dest = std::path::absolute(dest).or_raise(|| ErrorKind::ResourceIo(dest.to_path_buf()))?;
        if let Some(parent) = dest.parent() {
            if !parent.is_dir() {
                exn::bail!(ErrorKind::ResourceIo(parent.to_path_buf()));
            }
        }
        tokio::fs::copy(&resource.path, &dest)
            .await
            .or_raise(|| ErrorKind::ResourceIo(resource.path.clone()))?;
        Ok(dest)
    }
}
