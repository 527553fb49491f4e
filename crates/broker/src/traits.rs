//! Broker capability traits and message types.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::BrokerError;

/// A raw message received from a topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerMessage {
    /// Unique message identifier from the broker.
    pub id: String,
    /// Raw message body (JSON string).
    pub body: String,
    /// Backend-specific token used for ack and visibility extension
    /// (SQS receipt handle, stream entry id).
    pub receipt_handle: String,
    /// When the message was produced.
    pub timestamp: DateTime<Utc>,
    /// Number of times this message has been delivered.
    pub attempt_count: u32,
}

/// Health status of a broker connection.
#[derive(Debug, Clone, Serialize)]
pub struct BrokerHealth {
    /// Whether the broker is reachable.
    pub connected: bool,
    /// Approximate number of messages waiting on the topic.
    pub approximate_message_count: Option<u64>,
    /// Backend name ("sqs", "redis").
    pub provider: String,
}

impl fmt::Display for BrokerHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BrokerHealth {{ connected: {}, messages: {:?}, provider: {} }}",
            self.connected, self.approximate_message_count, self.provider
        )
    }
}

/// Publish side of the broker. Implementations are thread-safe and return
/// only after the broker has acknowledged the message.
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    async fn publish(&self, topic: &str, payload: &str) -> Result<(), BrokerError>;
}

/// Consume side of the broker, bound to a single topic at construction.
///
/// Delivery is at-least-once: unacked messages reappear after the backend's
/// redelivery window, so consumers must tolerate duplicates.
#[async_trait]
pub trait TopicConsumer: Send + Sync {
    /// Poll up to `max_messages`, waiting at most the configured bounded
    /// timeout. Returns an empty vec when nothing is available.
    async fn poll_batch(&self, max_messages: u32) -> Result<Vec<BrokerMessage>, BrokerError>;

    /// Acknowledge successful handling — the message will not be redelivered.
    async fn ack(&self, receipt_handle: &str) -> Result<(), BrokerError>;

    /// Renew the in-flight lease for a message by `seconds`.
    ///
    /// Only meaningful when [`supports_visibility_extension`] is true.
    async fn extend_visibility(
        &self,
        receipt_handle: &str,
        seconds: u32,
    ) -> Result<(), BrokerError>;

    /// Whether this backend has per-message visibility timeouts to renew.
    fn supports_visibility_extension(&self) -> bool {
        false
    }

    /// Check broker connectivity and return health status.
    async fn health_check(&self) -> Result<BrokerHealth, BrokerError>;
}
