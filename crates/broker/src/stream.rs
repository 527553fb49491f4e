//! Redis Streams broker backend (durable-log realization: consumer groups,
//! per-entry ack via XACK).
//!
//! There is no per-message visibility timeout to renew here; redelivery of
//! abandoned entries is a pending-entry concern outside this consumer, and
//! duplicates are absorbed by the in-flight check in the consumer core.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use redis::aio::ConnectionManager;
use redis::streams::{StreamReadOptions, StreamReadReply};
use redis::AsyncCommands;
use tracing::{debug, info};

use crate::error::BrokerError;
use crate::traits::{BrokerHealth, BrokerMessage, MessagePublisher, TopicConsumer};

const BODY_FIELD: &str = "body";

/// Derive the entry's produce time from its stream id ("<millis>-<seq>").
fn timestamp_from_entry_id(entry_id: &str) -> DateTime<Utc> {
    entry_id
        .split('-')
        .next()
        .and_then(|ms| ms.parse::<i64>().ok())
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .unwrap_or_else(Utc::now)
}

// ── Publisher ───────────────────────────────────────────────────────

/// XADD-based publisher; the logical topic name is the stream key.
pub struct RedisStreamPublisher {
    conn: ConnectionManager,
}

impl RedisStreamPublisher {
    pub async fn connect(url: &str) -> Result<Self, BrokerError> {
        let client = redis::Client::open(url)
            .map_err(|e| BrokerError::Connection(format!("redis open failed: {e}")))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| BrokerError::Connection(format!("redis connect failed: {e}")))?;
        info!("redis stream publisher initialized");
        Ok(Self { conn })
    }
}

#[async_trait]
impl MessagePublisher for RedisStreamPublisher {
    async fn publish(&self, topic: &str, payload: &str) -> Result<(), BrokerError> {
        let mut conn = self.conn.clone();
        let entry_id: String = conn
            .xadd(topic, "*", &[(BODY_FIELD, payload)])
            .await
            .map_err(|e| BrokerError::Publish(format!("XADD to '{topic}' failed: {e}")))?;
        debug!(topic, entry_id = %entry_id, "published message to stream");
        Ok(())
    }
}

// ── Consumer ────────────────────────────────────────────────────────

/// Consumer-group reader over one stream.
pub struct RedisStreamConsumer {
    conn: ConnectionManager,
    stream: String,
    group: String,
    consumer_name: String,
    block_millis: usize,
}

impl RedisStreamConsumer {
    pub async fn connect(
        url: &str,
        topic: &str,
        group: &str,
        consumer_name: &str,
        poll_wait_secs: u32,
    ) -> Result<Self, BrokerError> {
        let client = redis::Client::open(url)
            .map_err(|e| BrokerError::Connection(format!("redis open failed: {e}")))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| BrokerError::Connection(format!("redis connect failed: {e}")))?;

        let consumer = Self {
            conn,
            stream: topic.to_string(),
            group: group.to_string(),
            consumer_name: consumer_name.to_string(),
            block_millis: (poll_wait_secs.max(1) as usize) * 1000,
        };
        consumer.ensure_group().await?;

        info!(
            stream = %consumer.stream,
            group = %consumer.group,
            consumer = %consumer.consumer_name,
            "redis stream consumer initialized"
        );
        Ok(consumer)
    }

    /// Create the consumer group if it does not exist yet (MKSTREAM).
    async fn ensure_group(&self) -> Result<(), BrokerError> {
        let mut conn = self.conn.clone();
        let created: Result<String, redis::RedisError> = conn
            .xgroup_create_mkstream(&self.stream, &self.group, "$")
            .await;
        match created {
            Ok(_) => Ok(()),
            // Group already exists — expected on every restart after the first.
            Err(e) if e.to_string().contains("BUSYGROUP") => Ok(()),
            Err(e) => Err(BrokerError::Connection(format!(
                "XGROUP CREATE on '{}' failed: {e}",
                self.stream
            ))),
        }
    }
}

#[async_trait]
impl TopicConsumer for RedisStreamConsumer {
    async fn poll_batch(&self, max_messages: u32) -> Result<Vec<BrokerMessage>, BrokerError> {
        let opts = StreamReadOptions::default()
            .group(&self.group, &self.consumer_name)
            .count(max_messages as usize)
            .block(self.block_millis);

        let mut conn = self.conn.clone();
        let reply: StreamReadReply = conn
            .xread_options(&[&self.stream], &[">"], &opts)
            .await
            .map_err(|e| BrokerError::Connection(format!("XREADGROUP failed: {e}")))?;

        let mut messages = Vec::new();
        for key in reply.keys {
            for entry in key.ids {
                let body: String = entry.get(BODY_FIELD).unwrap_or_default();
                let timestamp = timestamp_from_entry_id(&entry.id);
                messages.push(BrokerMessage {
                    id: entry.id.clone(),
                    body,
                    receipt_handle: entry.id.clone(),
                    timestamp,
                    attempt_count: 1,
                });
            }
        }

        debug!(count = messages.len(), "received stream entries");
        Ok(messages)
    }

    async fn ack(&self, receipt_handle: &str) -> Result<(), BrokerError> {
        debug!(receipt_handle, "acking stream entry");

        let mut conn = self.conn.clone();
        let _acked: i64 = conn
            .xack(&self.stream, &self.group, &[receipt_handle])
            .await
            .map_err(|e| BrokerError::Ack(format!("XACK failed: {e}")))?;
        Ok(())
    }

    async fn extend_visibility(
        &self,
        _receipt_handle: &str,
        _seconds: u32,
    ) -> Result<(), BrokerError> {
        // Stream entries have no visibility timeout; nothing to renew.
        Ok(())
    }

    async fn health_check(&self) -> Result<BrokerHealth, BrokerError> {
        let mut conn = self.conn.clone();
        let depth: u64 = conn
            .xlen(&self.stream)
            .await
            .map_err(|e| BrokerError::Connection(format!("XLEN failed: {e}")))?;

        Ok(BrokerHealth {
            connected: true,
            approximate_message_count: Some(depth),
            provider: "redis".to_string(),
        })
    }
}
