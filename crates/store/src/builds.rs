//! Build-campaign registry.

use crate::error::{ErrorKind, Result, SqlxResultExt};
use crate::rows::BuildInfoRow;
use crate::store::{Store, filter_value, one_row, unique_id};
use depot_model::{BuildInfo, timestamp};
use exn::OptionExt;
use sqlx::SqliteConnection;

pub(crate) async fn get_build_info_conn(conn: &mut SqliteConnection, bid: &str) -> Result<BuildInfo> {
    let rows: Vec<BuildInfoRow> = sqlx::query_as(include_str!("../queries/get_build_info.sql"))
        .bind(bid)
        .fetch_all(conn)
        .await
        .or_db_err()?;
    one_row(rows, "buildinfo", bid)?.try_into()
}

pub(crate) async fn raw_add_build_info_conn(
    conn: &mut SqliteConnection,
    build_info: &BuildInfo,
) -> Result<bool> {
    let result = sqlx::query(include_str!("../queries/insert_build_info_ignore.sql"))
        .bind(&build_info.id)
        .bind(&build_info.build_date)
        .bind(&build_info.setup)
        .bind(timestamp::format(build_info.creation_date)?)
        .bind(&build_info.build_version)
        .bind(build_info.isready)
        .execute(conn)
        .await
        .or_db_err()?;
    Ok(result.rows_affected() == 1)
}

impl Store {
    /// Register a new build campaign. The id and creation date are assigned
    /// by the store; the campaign starts out not ready.
    pub async fn create_build_id(&self, setup: &str, date: &str, version: &str) -> Result<BuildInfo> {
        let mut conn = self.acquire().await?;
        let row: BuildInfoRow = sqlx::query_as(include_str!("../queries/insert_build_info.sql"))
            .bind(unique_id())
            .bind(date)
            .bind(setup)
            .bind(timestamp::format(timestamp::now())?)
            .bind(version)
            .bind(false)
            .fetch_one(&mut *conn)
            .await
            .or_db_err()?;
        tracing::debug!(setup, date, version, "created build campaign");
        row.try_into()
    }

    pub async fn get_build_info(&self, bid: &str) -> Result<BuildInfo> {
        let mut conn = self.acquire().await?;
        get_build_info_conn(&mut *conn, bid).await
    }

    /// Latest build for a setup, ordered by `(build_date, creation_date)`.
    ///
    /// `date` and `version` are optional equality filters; the `"all"`
    /// wildcard and the empty string mean no filter. With `ready_only` only
    /// campaigns that were marked ready qualify.
    pub async fn get_latest_build_info(
        &self,
        setup: &str,
        date: Option<&str>,
        version: Option<&str>,
        ready_only: bool,
    ) -> Result<BuildInfo> {
        let date = filter_value(date);
        let version = filter_value(version);
        let mut conn = self.acquire().await?;
        let row: Option<BuildInfoRow> = sqlx::query_as(include_str!("../queries/latest_build_info.sql"))
            .bind(setup)
            .bind(date)
            .bind(date)
            .bind(version)
            .bind(version)
            .bind(ready_only)
            .fetch_optional(&mut *conn)
            .await
            .or_db_err()?;
        row.ok_or_raise(|| ErrorKind::NotFound(format!("no buildinfo matching setup {setup:?}")))?
            .try_into()
    }

    /// List build campaigns, most recent first.
    ///
    /// When `date` is a compact `YYYYMMDD` label, only campaigns whose
    /// canonicalized `build_date` falls in the inclusive window
    /// `[date - nb_days days, date]` are returned.
    pub async fn get_build_info_list(
        &self,
        date: Option<&str>,
        setup: Option<&str>,
        version: Option<&str>,
        nb_days: u32,
    ) -> Result<Vec<BuildInfo>> {
        let setup = filter_value(setup);
        let version = filter_value(version);
        let canonical = match filter_value(date) {
            None => None,
            Some(date) => {
                if date.len() != 8 || !date.bytes().all(|b| b.is_ascii_digit()) {
                    exn::bail!(ErrorKind::InvalidInput(format!(
                        "build date filter must be YYYYMMDD, got {date:?}"
                    )));
                }
                Some(format!("{}-{}-{}", &date[0..4], &date[4..6], &date[6..8]))
            }
        };
        let mut conn = self.acquire().await?;
        let rows: Vec<BuildInfoRow> = sqlx::query_as(include_str!("../queries/list_build_infos.sql"))
            .bind(setup)
            .bind(setup)
            .bind(version)
            .bind(version)
            .bind(canonical.as_deref())
            .bind(canonical.as_deref())
            .bind(i64::from(nb_days))
            .bind(canonical.as_deref())
            .fetch_all(&mut *conn)
            .await
            .or_db_err()?;
        rows.into_iter().map(BuildInfo::try_from).collect()
    }

    /// Flip the readiness flag. Returns the final value of `isready`.
    pub async fn mark_build_ready(&self, bid: &str) -> Result<bool> {
        let mut conn = self.acquire().await?;
        let row: Option<(bool,)> = sqlx::query_as(include_str!("../queries/mark_build_ready.sql"))
            .bind(bid)
            .fetch_optional(&mut *conn)
            .await
            .or_db_err()?;
        let (isready,) = row.ok_or_raise(|| ErrorKind::NotFound(format!("no buildinfo with id {bid:?}")))?;
        Ok(isready)
    }

    /// Fork a campaign into another setup namespace. The copy keeps
    /// `build_date` and `build_version` but gets a fresh id and creation
    /// date, and always starts out not ready.
    pub async fn copy_build_id(&self, bid: &str, dest_setup: &str) -> Result<BuildInfo> {
        let mut conn = self.acquire().await?;
        let row: Option<BuildInfoRow> = sqlx::query_as(include_str!("../queries/copy_build_info.sql"))
            .bind(unique_id())
            .bind(dest_setup)
            .bind(timestamp::format(timestamp::now())?)
            .bind(bid)
            .fetch_optional(&mut *conn)
            .await
            .or_db_err()?;
        row.ok_or_raise(|| ErrorKind::NotFound(format!("no buildinfo with id {bid:?}")))?.try_into()
    }

    /// Insert a build info verbatim, preserving its id and creation date.
    /// On id collision the existing row wins. Returns whether a row was
    /// inserted.
    pub async fn raw_add_build_info(&self, build_info: &BuildInfo) -> Result<bool> {
        let mut tx = self.begin().await?;
        let inserted = raw_add_build_info_conn(&mut *tx, build_info).await?;
        tx.commit().await.or_db_err()?;
        Ok(inserted)
    }
}

#[cfg(test)]
mod tests {
    use crate::error::ErrorKind;
    use crate::fixtures;

    #[tokio::test]
    async fn test_create_and_get_build_info() {
        let store = fixtures::store().await;
        let created = store.create_build_id("test", "20241028", "1.0").await.unwrap();
        assert_eq!(created.setup, "test");
        assert_eq!(created.build_date, "20241028");
        assert_eq!(created.build_version, "1.0");
        assert!(!created.isready);

        let fetched = store.get_build_info(&created.id).await.unwrap();
        assert_eq!(fetched, created);

        let previous = store.create_build_id("test", "20241027", "1.0").await.unwrap();
        let latest = store.get_latest_build_info("test", None, None, false).await.unwrap();
        assert_eq!(latest, created);

        // A newer campaign on the same build date wins on creation date.
        let created2 = store.create_build_id("test", "20241028", "1.0").await.unwrap();
        let latest = store.get_latest_build_info("test", None, None, false).await.unwrap();
        assert_eq!(latest, created2);

        let filtered = store
            .get_latest_build_info("test", Some("20241027"), Some("1.0"), false)
            .await
            .unwrap();
        assert_eq!(filtered, previous);
    }

    #[tokio::test]
    async fn test_get_build_info_missing() {
        let store = fixtures::store().await;
        let err = store.get_build_info("nope").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_build_info_ready() {
        let store = fixtures::store().await;
        let created = store.create_build_id("test", "20241028", "1.0").await.unwrap();

        let err = store.get_latest_build_info("test", None, None, true).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));

        assert!(store.mark_build_ready(&created.id).await.unwrap());
        let latest = store.get_latest_build_info("test", None, None, true).await.unwrap();
        assert_eq!(latest.id, created.id);
        assert!(latest.isready);
    }

    #[tokio::test]
    async fn test_mark_build_ready_missing() {
        let store = fixtures::store().await;
        let err = store.mark_build_ready("nope").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_copy_build_id() {
        let store = fixtures::store().await;
        let original = store.create_build_id("test", "20241028", "1.0").await.unwrap();
        store.mark_build_ready(&original.id).await.unwrap();

        let copy = store.copy_build_id(&original.id, "staging").await.unwrap();
        assert_ne!(copy.id, original.id);
        assert_eq!(copy.setup, "staging");
        assert_eq!(copy.build_date, original.build_date);
        assert_eq!(copy.build_version, original.build_version);
        // Readiness does not travel with the copy.
        assert!(!copy.isready);

        let err = store.copy_build_id("nope", "staging").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_build_info_list_window() {
        let store = fixtures::store().await;
        for date in ["20241025", "20241026", "20241027", "20241028"] {
            store.create_build_id("test", date, "1.0").await.unwrap();
        }
        store.create_build_id("other", "20241028", "2.0").await.unwrap();

        let one_day = store
            .get_build_info_list(Some("20241028"), Some("test"), None, 1)
            .await
            .unwrap();
        let dates: Vec<_> = one_day.iter().map(|b| b.build_date.as_str()).collect();
        assert_eq!(dates, ["20241028", "20241027"]);

        let window = store
            .get_build_info_list(Some("20241028"), Some("test"), None, 3)
            .await
            .unwrap();
        assert_eq!(window.len(), 4);

        let all = store.get_build_info_list(Some("all"), None, None, 1).await.unwrap();
        assert_eq!(all.len(), 5);

        let by_version = store.get_build_info_list(None, None, Some("2.0"), 1).await.unwrap();
        assert_eq!(by_version.len(), 1);
        assert_eq!(by_version[0].setup, "other");
    }

    #[tokio::test]
    async fn test_build_info_list_bad_date() {
        let store = fixtures::store().await;
        let err = store.get_build_info_list(Some("2024-10-28"), None, None, 1).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_raw_add_build_info_is_idempotent() {
        let store = fixtures::store().await;
        let build = fixtures::foreign_build("b-raw", "test", "20241028");
        assert!(store.raw_add_build_info(&build).await.unwrap());
        // Second insert is a no-op; the existing row wins.
        assert!(!store.raw_add_build_info(&build).await.unwrap());
        let fetched = store.get_build_info("b-raw").await.unwrap();
        assert_eq!(fetched, build);
    }
}
