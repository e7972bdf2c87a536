//! SQLite pool behind [`SqliteCache`](crate::SqliteCache).

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use sqlx::sqlite::{SqliteAutoVacuum, SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use std::path::Path;
use std::time::Duration;
use tracing::instrument;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Concurrent requests each read a few responses; writes are single rows.
const POOL_SIZE: u32 = 4;
const BUSY_TIMEOUT: Duration = Duration::from_secs(2);

/// Where the response table lives.
#[derive(Debug, Clone, Copy)]
pub enum Location<'a> {
    File(&'a Path),
    /// Private to one pool. Entries vanish with the process.
    Memory,
}

/// Migrated connection pool for the response table.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens (creating if needed) the response database and brings its
    /// schema up to date.
    #[instrument(name = "open response database", skip_all, fields(location = ?location))]
    pub async fn open(location: Location<'_>) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(BUSY_TIMEOUT)
            // `spawn_purge` deletes expired rows; `close` hands their pages back.
            .auto_vacuum(SqliteAutoVacuum::Incremental);
        let (options, size) = match location {
            Location::File(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent).or_raise(|| ErrorKind::Configuration)?;
                }
                (options.filename(path).create_if_missing(true), POOL_SIZE)
            },
            // Every connection to ":memory:" is a separate database.
            Location::Memory => (options.filename(":memory:"), 1),
        };
        let pool = SqlitePoolOptions::new()
            .max_connections(size)
            .connect_with(options)
            .await
            .or_raise(|| ErrorKind::Database)?;
        MIGRATOR.run(&pool).await.or_raise(|| ErrorKind::Migration)?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Reclaims pages freed by purged responses, then closes the pool.
    pub async fn close(&self) {
        _ = sqlx::query("PRAGMA incremental_vacuum").execute(&self.pool).await;
        self.pool.close().await;
    }
}
