//! Hot existence cache for already-seen articles.
//!
//! Presence of the key is the signal; the value is irrelevant. Every failure
//! is soft: an unavailable cache must never block ingestion, it only costs an
//! extra authoritative store lookup.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::warn;

use crate::error::StoreError;

const KEY_PREFIX: &str = "dedup:seen";
const TTL_SECONDS: u64 = 3600;

/// TTL-bounded existence set keyed by `(source, source_id)`.
#[async_trait]
pub trait DedupCache: Send + Sync {
    /// Whether this article has been seen recently. Returns `false` on any
    /// backend error, deferring to the authoritative store check.
    async fn exists(&self, source: &str, source_id: &str) -> bool;

    /// Mark an article as seen, refreshing the TTL. Errors are swallowed.
    async fn mark_seen(&self, source: &str, source_id: &str);
}

/// Redis key-per-article cache with automatic TTL expiration.
pub struct RedisDedupCache {
    conn: ConnectionManager,
}

impl RedisDedupCache {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self { conn })
    }

    fn make_key(source: &str, source_id: &str) -> String {
        format!("{KEY_PREFIX}:{source}:{source_id}")
    }
}

#[async_trait]
impl DedupCache for RedisDedupCache {
    async fn exists(&self, source: &str, source_id: &str) -> bool {
        let key = Self::make_key(source, source_id);
        let mut conn = self.conn.clone();
        match conn.exists::<_, bool>(&key).await {
            Ok(found) => found,
            Err(e) => {
                warn!(error = %e, "dedup cache unavailable, deferring to article store");
                false
            }
        }
    }

    async fn mark_seen(&self, source: &str, source_id: &str) {
        let key = Self::make_key(source, source_id);
        let mut conn = self.conn.clone();
        if let Err(e) = conn.set_ex::<_, _, ()>(&key, 1u8, TTL_SECONDS).await {
            warn!(error = %e, "failed to mark article in dedup cache");
        }
    }
}
