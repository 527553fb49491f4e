//! TTL-bounded request state store.
//!
//! One JSON document per request under `query:<request_id>`. Updates are
//! shallow merges applied through a bounded compare-and-swap loop so that
//! concurrent writers cannot interleave a read-modify-write; a lost `Failed`
//! transition would strand the client polling forever.

use async_trait::async_trait;
use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde_json::Value;
use tracing::{debug, warn};

use pulse_core::request::ProcessedRequest;

use crate::error::StoreError;

const KEY_PREFIX: &str = "query:";
const MAX_CAS_ATTEMPTS: u32 = 5;

/// Swap the stored value only if it still equals the one we read.
/// KEYS[1] = key, ARGV[1] = expected raw value, ARGV[2] = new value,
/// ARGV[3] = TTL seconds.
const CAS_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    redis.call('SET', KEYS[1], ARGV[2], 'EX', ARGV[3])
    return 1
end
return 0
"#;

/// Keyed request-state documents with TTL and atomic shallow-merge updates.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Store a fresh record under the default TTL. Overwrites any existing key.
    async fn create(&self, request_id: &str, doc: &ProcessedRequest) -> Result<(), StoreError>;

    /// `None` for missing keys; absence is not an error.
    async fn get(&self, request_id: &str) -> Result<Option<ProcessedRequest>, StoreError>;

    /// Shallow-merge `patch` into the stored document, set `updated_at` to
    /// now, preserve the remaining TTL when it is queryable and positive
    /// (else reset to the default). `None` when the key is absent.
    async fn update(
        &self,
        request_id: &str,
        patch: Value,
    ) -> Result<Option<ProcessedRequest>, StoreError>;

    /// True iff a key was removed.
    async fn delete(&self, request_id: &str) -> Result<bool, StoreError>;

    async fn is_healthy(&self) -> bool;
}

/// Redis-backed state store.
pub struct RedisStateStore {
    conn: ConnectionManager,
    default_ttl: u64,
    cas_script: redis::Script,
}

impl RedisStateStore {
    pub async fn connect(url: &str, default_ttl_seconds: u64) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self {
            conn,
            default_ttl: default_ttl_seconds,
            cas_script: redis::Script::new(CAS_SCRIPT),
        })
    }

    fn make_key(request_id: &str) -> String {
        format!("{KEY_PREFIX}{request_id}")
    }
}

/// Shallow-merge `patch`'s top-level fields into `doc`.
fn merge_patch(doc: &mut Value, patch: &Value) {
    if let (Some(doc_map), Some(patch_map)) = (doc.as_object_mut(), patch.as_object()) {
        for (k, v) in patch_map {
            doc_map.insert(k.clone(), v.clone());
        }
    }
}

#[async_trait]
impl StateStore for RedisStateStore {
    async fn create(&self, request_id: &str, doc: &ProcessedRequest) -> Result<(), StoreError> {
        let key = Self::make_key(request_id);
        let payload = serde_json::to_string(doc)?;
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(&key, payload, self.default_ttl)
            .await?;
        Ok(())
    }

    async fn get(&self, request_id: &str) -> Result<Option<ProcessedRequest>, StoreError> {
        let key = Self::make_key(request_id);
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(&key).await?;
        match raw {
            None => Ok(None),
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        }
    }

    async fn update(
        &self,
        request_id: &str,
        patch: Value,
    ) -> Result<Option<ProcessedRequest>, StoreError> {
        let key = Self::make_key(request_id);

        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let mut conn = self.conn.clone();
            let raw: Option<String> = conn.get(&key).await?;
            let raw = match raw {
                None => return Ok(None),
                Some(raw) => raw,
            };

            let mut doc: Value = serde_json::from_str(&raw)?;
            merge_patch(&mut doc, &patch);
            doc["updated_at"] = Value::String(Utc::now().to_rfc3339());
            let updated = serde_json::to_string(&doc)?;

            // TTL: -1 = no expiry, -2 = gone; both fall back to the default.
            let ttl: i64 = conn.ttl(&key).await?;
            let ttl = if ttl > 0 { ttl as u64 } else { self.default_ttl };

            let swapped: i32 = self
                .cas_script
                .key(&key)
                .arg(&raw)
                .arg(&updated)
                .arg(ttl)
                .invoke_async(&mut conn)
                .await?;

            if swapped == 1 {
                return Ok(Some(serde_json::from_value(doc)?));
            }
            debug!(request_id, attempt, "state update raced, retrying");
        }

        warn!(request_id, "state update kept racing, giving up");
        Err(StoreError::UpdateConflict(key, MAX_CAS_ATTEMPTS))
    }

    async fn delete(&self, request_id: &str) -> Result<bool, StoreError> {
        let key = Self::make_key(request_id);
        let mut conn = self.conn.clone();
        let removed: i64 = conn.del(&key).await?;
        Ok(removed > 0)
    }

    async fn is_healthy(&self) -> bool {
        let mut conn = self.conn.clone();
        let pong: Result<String, _> = redis::cmd("PING").query_async(&mut conn).await;
        pong.is_ok()
    }
}
