//! Expiring response cache.
//!
//! Every cacheable remote call made by the source client goes through a
//! [`ResponseCache`]. Entries are keyed by a digest of method and URL and are
//! immutable once stored; a later `put` for the same key replaces the entry
//! wholesale.
//!
//! # Backends
//! - [`MemoryCache`]: a map behind an async `RwLock`, lost on restart.
//! - [`SqliteCache`]: a single table in a SQLite file, shared across restarts
//!   (and across processes pointing at the same file).
//!
//! Expired entries are never served. [`spawn_purge`] deletes them in the
//! background so that storage stays bounded by what is still live.
//!
//! The cache is never the source of truth. Any backend failure is reported to
//! the caller, who is expected to log it and continue as if the entry were
//! missing.

mod db;
pub mod error;
mod key;
mod memory;
mod sqlite;

pub use crate::db::{Database, Location};
pub use crate::key::CacheKey;
pub use crate::memory::MemoryCache;
pub use crate::sqlite::SqliteCache;

use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use exn::ResultExt;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use wpd_config::{CacheBackend, CacheConfig};

/// Cached response body. Shared, never mutated after insertion.
pub type Payload = Arc<[u8]>;

#[async_trait]
pub trait ResponseCache: Debug + Send + Sync {
    /// Returns the payload stored under `key`, unless it has expired.
    async fn get(&self, key: &CacheKey) -> Result<Option<Payload>>;

    /// Stores `payload` under `key`, replacing any previous entry and
    /// restarting its expiry.
    async fn put(&self, key: &CacheKey, payload: Payload) -> Result<()>;

    /// Removes expired entries, returning how many were dropped.
    async fn purge_expired(&self) -> Result<u64>;
}

/// Builds the configured backend, or `None` when caching is switched off.
pub async fn open(config: &CacheConfig) -> Result<Option<Arc<dyn ResponseCache>>> {
    if !config.enabled {
        tracing::info!("Response cache disabled");
        return Ok(None);
    }
    let cache: Arc<dyn ResponseCache> = match config.backend {
        CacheBackend::Memory => {
            if config.path.is_some() {
                exn::bail!(ErrorKind::Configuration);
            }
            tracing::info!(expiry_secs = config.expiry_secs, "Using in-memory response cache");
            Arc::new(MemoryCache::new(config.expiry()))
        },
        CacheBackend::Sqlite => {
            let path = config.resolved_path().or_raise(|| ErrorKind::Configuration)?;
            tracing::info!(path = %path.display(), expiry_secs = config.expiry_secs, "Using SQLite response cache");
            Arc::new(SqliteCache::open(&path, config.expiry()).await?)
        },
    };
    Ok(Some(cache))
}

/// Shortest interval between background purges.
const MIN_PURGE_INTERVAL: Duration = Duration::from_secs(1);

/// Purges expired entries from `cache` every `every` (at least one second)
/// until the returned task is aborted. Failures are logged and retried on
/// the next tick.
pub fn spawn_purge(cache: Arc<dyn ResponseCache>, every: Duration) -> JoinHandle<()> {
    let every = every.max(MIN_PURGE_INTERVAL);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match cache.purge_expired().await {
                Ok(0) => {},
                Ok(purged) => tracing::debug!(purged, "Purged expired responses"),
                Err(err) => tracing::warn!(error = ?err, "Purging expired responses failed"),
            }
        }
    })
}
