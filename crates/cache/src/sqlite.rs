use crate::error::{ErrorKind, Result};
use crate::db::{Database, Location};
use crate::{CacheKey, Payload, ResponseCache};
use async_trait::async_trait;
use exn::ResultExt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;

/// Persistent cache stored in a single SQLite table. Survives restarts and
/// may be shared by several processes pointing at the same file.
#[derive(Debug, Clone)]
pub struct SqliteCache {
    db: Database,
    expiry: Duration,
}

impl SqliteCache {
    pub async fn open(path: impl AsRef<Path>, expiry: Duration) -> Result<Self> {
        let db = Database::open(Location::File(path.as_ref())).await?;
        Ok(Self { db, expiry })
    }

    pub async fn in_memory(expiry: Duration) -> Result<Self> {
        let db = Database::open(Location::Memory).await?;
        Ok(Self { db, expiry })
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    fn now() -> i64 {
        OffsetDateTime::now_utc().unix_timestamp()
    }
}

#[async_trait]
impl ResponseCache for SqliteCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<Payload>> {
        let row: Option<(Vec<u8>,)> = sqlx::query_as(include_str!("../queries/get_response.sql"))
            .bind(key.as_str())
            .bind(Self::now())
            .fetch_optional(self.db.pool())
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(row.map(|(payload,)| Arc::from(payload)))
    }

    async fn put(&self, key: &CacheKey, payload: Payload) -> Result<()> {
        let now = Self::now();
        let expiry = i64::try_from(self.expiry.as_secs()).or_raise(|| ErrorKind::Configuration)?;
        sqlx::query(include_str!("../queries/put_response.sql"))
            .bind(key.as_str())
            .bind(&payload[..])
            .bind(now)
            .bind(now.saturating_add(expiry))
            .execute(self.db.pool())
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64> {
        let result = sqlx::query(include_str!("../queries/purge_expired.sql"))
            .bind(Self::now())
            .execute(self.db.pool())
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(result.rows_affected())
    }
}
