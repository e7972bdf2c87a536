use crate::error::Result;
use crate::{CacheKey, Payload, ResponseCache};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

#[derive(Debug)]
struct Entry {
    payload: Payload,
    expires_at: Instant,
}

#[derive(Debug)]
struct Entries {
    map: HashMap<CacheKey, Entry>,
    /// Writes sweep expired entries at most once per expiry period.
    next_sweep: Instant,
}

impl Entries {
    fn sweep(&mut self, now: Instant) -> u64 {
        let before = self.map.len();
        self.map.retain(|_, e| e.expires_at > now);
        (before - self.map.len()) as u64
    }
}

/// Process-local cache. Lost on restart.
///
/// Expired entries are dropped when read, swept on write, and purged by
/// [`spawn_purge`](crate::spawn_purge), so distinct keys do not pile up.
/// Expiry is measured with [`tokio::time::Instant`], so tests running on a
/// paused clock can advance past it deterministically.
#[derive(Debug)]
pub struct MemoryCache {
    entries: RwLock<Entries>,
    expiry: Duration,
}

impl MemoryCache {
    pub fn new(expiry: Duration) -> Self {
        let entries = Entries { map: HashMap::new(), next_sweep: Instant::now() + expiry };
        Self { entries: RwLock::new(entries), expiry }
    }

    /// Entries currently resident, expired or not.
    pub async fn len(&self) -> usize {
        self.entries.read().await.map.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.map.is_empty()
    }
}

#[async_trait]
impl ResponseCache for MemoryCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<Payload>> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.map.get(key) {
                Some(entry) if entry.expires_at > now => return Ok(Some(entry.payload.clone())),
                Some(_) => {},
                None => return Ok(None),
            }
        }
        // Expired: evict it, unless a writer refreshed it in the meantime.
        let mut entries = self.entries.write().await;
        if entries.map.get(key).is_some_and(|e| e.expires_at <= now) {
            entries.map.remove(key);
        }
        Ok(None)
    }

    async fn put(&self, key: &CacheKey, payload: Payload) -> Result<()> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        if now >= entries.next_sweep {
            let swept = entries.sweep(now);
            entries.next_sweep = now + self.expiry;
            if swept > 0 {
                tracing::trace!(swept, "Swept expired responses");
            }
        }
        entries.map.insert(key.clone(), Entry { payload, expires_at: now + self.expiry });
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64> {
        Ok(self.entries.write().await.sweep(Instant::now()))
    }
}
