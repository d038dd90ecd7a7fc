//! Database connection and pool management.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use sqlx::SqliteConnection;
use sqlx::pool::PoolConnectionMetadata;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use std::path::{Path, PathBuf};
use tracing::instrument;

/// Embedded migrations that are run automatically on connect.
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Database handle backing one store.
///
/// A handle wraps a single-connection pool: the store is a single-writer
/// design, and funnelling every statement through one connection keeps
/// writes serialized and immediately visible to subsequent reads.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    path: Option<PathBuf>,
}

impl Database {
    async fn new(options: SqliteConnectOptions, path: Option<PathBuf>) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            // Applied to every connection the pool may ever (re)open, not
            // just the first one.
            .after_connect(|conn, meta| Box::pin(async move { Self::apply_pragmas(conn, meta).await }))
            .max_connections(1)
            .connect_with(options)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let db = Self { pool, path };
        db.migrate().await?;
        Ok(db)
    }

    /// Open (or create) the store database at the given path and run
    /// migrations.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let options = Self::base_options().filename(path).create_if_missing(true);
        Self::new(options, Some(path.to_path_buf())).await
    }

    /// Connect to an in-memory database.
    ///
    /// Note:
    /// - In-memory databases are destroyed when the connection closes.
    /// - Not `#[cfg(test)]` so that other crates can also use this in their
    ///   tests.
    pub async fn connect_in_memory() -> Result<Self> {
        let options = Self::base_options().filename(":memory:");
        Self::new(options, None).await
    }

    /// Base connection options shared between file and in-memory databases.
    fn base_options() -> SqliteConnectOptions {
        SqliteConnectOptions::new()
            // WAL mode for cheap readers while a writer is active
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            // The schema declares deferred foreign keys; enforcement happens
            // at commit so raw-add insertion order is unconstrained.
            .foreign_keys(true)
            // PRAGMA synchronous = NORMAL (balance between safety and speed)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_millis(1500))
    }

    /// Apply PRAGMA settings that aren't exposed via `SqliteConnectOptions`.
    async fn apply_pragmas(
        conn: &mut SqliteConnection,
        _meta: PoolConnectionMetadata,
    ) -> sqlx::Result<()> {
        sqlx::query(
            r#"
                PRAGMA temp_store = MEMORY;
                PRAGMA cache_size = -8192;
            "#,
        )
        .execute(conn)
        .await?;
        Ok(())
    }

    /// Run database migrations.
    ///
    /// Called automatically by `connect` and `connect_in_memory`, but can be
    /// called manually if needed.
    #[instrument("performing database migrations")]
    async fn migrate(&self) -> Result<()> {
        MIGRATOR.run(&self.pool).await.or_raise(|| ErrorKind::Migration)
    }

    /// Get a reference to the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Path of the backing database file; `None` for in-memory databases.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Force a WAL checkpoint so the main database file is self-contained.
    pub async fn checkpoint(&self) -> Result<()> {
        sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    /// Close the connection pool. After calling this, the handle should not
    /// be used.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
