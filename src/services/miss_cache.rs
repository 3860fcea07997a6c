//! Negative-result cache for object lookups.
//!
//! Only confirmed misses are recorded: the bucket had no object and the
//! fallback origin (if any) could not supply one. Entries expire after the
//! configured TTL and are removed as soon as something is written to the path.

use chrono::Utc;
use sqlx::SqlitePool;
use std::{sync::Arc, time::Duration};
use tracing::debug;

use crate::errors::StorageResult;

/// Cache bucket identifier for object misses.
pub const CACHE_TYPE: &str = "gcs_media_miss";

#[derive(Clone)]
pub struct MissCache {
    db: Arc<SqlitePool>,
    ttl: Duration,
}

impl MissCache {
    pub fn new(db: Arc<SqlitePool>, ttl: Duration) -> Self {
        Self { db, ttl }
    }

    /// True if `key` is a recorded, unexpired miss.
    pub async fn is_miss(&self, key: &str) -> StorageResult<bool> {
        let hit = sqlx::query_scalar::<_, i64>(
            "SELECT 1 FROM cache_entries WHERE cache_type = ? AND path = ? AND expires_at > ?",
        )
        .bind(CACHE_TYPE)
        .bind(key)
        .bind(Utc::now().timestamp())
        .fetch_optional(&*self.db)
        .await?;
        Ok(hit.is_some())
    }

    pub async fn record(&self, key: &str) -> StorageResult<()> {
        let expires_at = Utc::now().timestamp() + self.ttl.as_secs() as i64;
        sqlx::query(
            "INSERT INTO cache_entries (cache_type, path, expires_at) VALUES (?, ?, ?)
             ON CONFLICT(cache_type, path) DO UPDATE SET expires_at = excluded.expires_at",
        )
        .bind(CACHE_TYPE)
        .bind(key)
        .bind(expires_at)
        .execute(&*self.db)
        .await?;
        debug!(key, "recorded object miss");
        Ok(())
    }

    pub async fn invalidate(&self, key: &str) -> StorageResult<()> {
        let result = sqlx::query("DELETE FROM cache_entries WHERE cache_type = ? AND path = ?")
            .bind(CACHE_TYPE)
            .bind(key)
            .execute(&*self.db)
            .await?;
        if result.rows_affected() > 0 {
            debug!(key, "invalidated object miss");
        }
        Ok(())
    }

    /// Drop expired entries; returns how many were removed.
    pub async fn purge_expired(&self) -> StorageResult<u64> {
        let result = sqlx::query("DELETE FROM cache_entries WHERE cache_type = ? AND expires_at <= ?")
            .bind(CACHE_TYPE)
            .bind(Utc::now().timestamp())
            .execute(&*self.db)
            .await?;
        Ok(result.rows_affected())
    }
}
