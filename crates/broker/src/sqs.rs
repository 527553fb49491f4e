//! AWS SQS broker backend (queue realization: receipt handles + visibility
//! timeouts).

use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_sqs::config::BehaviorVersion;
use aws_sdk_sqs::types::QueueAttributeName;
use aws_sdk_sqs::Client;
use chrono::{TimeZone, Utc};
use std::collections::HashMap;
use tracing::{debug, info};

use pulse_core::config::BrokerConfig;

use crate::error::BrokerError;
use crate::traits::{BrokerHealth, BrokerMessage, MessagePublisher, TopicConsumer};

/// Build an SQS client from broker config.
///
/// The client config is built directly rather than through
/// `aws_config::defaults()`, which would read `AWS_ENDPOINT_URL` for every
/// AWS service and could route SQS traffic to the wrong endpoint.
fn build_client(config: &BrokerConfig) -> Client {
    let region = aws_sdk_sqs::config::Region::new(config.aws_region.clone());

    let mut sqs_config = aws_sdk_sqs::Config::builder()
        .region(region)
        .behavior_version(BehaviorVersion::latest());

    // Static credentials if provided (local dev / explicit config).
    if let (Some(key_id), Some(secret)) =
        (&config.aws_access_key_id, &config.aws_secret_access_key)
    {
        let creds = Credentials::new(
            key_id,
            secret,
            config.aws_session_token.clone(),
            None,
            "pulse-broker-static",
        );
        sqs_config = sqs_config.credentials_provider(creds);
    }

    if let Some(endpoint) = config.aws_endpoint_url.as_deref().filter(|e| !e.is_empty()) {
        let url = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.to_string()
        } else {
            format!("https://{endpoint}")
        };
        sqs_config = sqs_config.endpoint_url(url);
    }

    Client::from_conf(sqs_config.build())
}

fn queue_url_for(config: &BrokerConfig, topic: &str) -> Result<String, BrokerError> {
    config
        .sqs_queue_url(topic)
        .map(str::to_string)
        .ok_or_else(|| BrokerError::Config(format!("no SQS queue URL configured for topic '{topic}'")))
}

// ── Publisher ───────────────────────────────────────────────────────

/// SQS publisher with a logical-topic → queue-URL map.
pub struct SqsPublisher {
    client: Client,
    queue_urls: HashMap<String, String>,
}

impl SqsPublisher {
    pub async fn new(config: &BrokerConfig) -> Result<Self, BrokerError> {
        let mut queue_urls = HashMap::new();
        if let Some(url) = &config.sqs_content_raw_queue_url {
            queue_urls.insert(config.content_raw_topic.clone(), url.clone());
        }
        if let Some(url) = &config.sqs_query_queue_url {
            queue_urls.insert(config.query_topic.clone(), url.clone());
        }

        info!(queues = queue_urls.len(), "SQS publisher initialized");
        Ok(Self {
            client: build_client(config),
            queue_urls,
        })
    }
}

#[async_trait]
impl MessagePublisher for SqsPublisher {
    async fn publish(&self, topic: &str, payload: &str) -> Result<(), BrokerError> {
        let queue_url = self.queue_urls.get(topic).ok_or_else(|| {
            BrokerError::Config(format!("no SQS queue URL configured for topic '{topic}'"))
        })?;

        self.client
            .send_message()
            .queue_url(queue_url)
            .message_body(payload)
            .send()
            .await
            .map_err(|e| BrokerError::Publish(format!("SQS send failed: {e:?}")))?;

        debug!(topic, "published message to SQS");
        Ok(())
    }
}

// ── Consumer ────────────────────────────────────────────────────────

/// SQS-backed topic consumer.
pub struct SqsTopicConsumer {
    client: Client,
    queue_url: String,
    visibility_timeout_secs: i32,
    poll_wait_secs: i32,
}

impl SqsTopicConsumer {
    pub async fn new(config: &BrokerConfig, topic: &str) -> Result<Self, BrokerError> {
        let queue_url = queue_url_for(config, topic)?;

        info!(queue_url = %queue_url, region = %config.aws_region, "SQS consumer initialized");

        Ok(Self {
            client: build_client(config),
            queue_url,
            visibility_timeout_secs: config.visibility_timeout_secs as i32,
            poll_wait_secs: config.poll_wait_secs.min(20) as i32,
        })
    }
}

#[async_trait]
impl TopicConsumer for SqsTopicConsumer {
    async fn poll_batch(&self, max_messages: u32) -> Result<Vec<BrokerMessage>, BrokerError> {
        // SQS caps at 10 messages per request.
        let capped = max_messages.min(10) as i32;

        let resp = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(capped)
            .wait_time_seconds(self.poll_wait_secs)
            .visibility_timeout(self.visibility_timeout_secs)
            .message_system_attribute_names(aws_sdk_sqs::types::MessageSystemAttributeName::All)
            .send()
            .await
            .map_err(|e| BrokerError::Connection(format!("SQS receive failed: {e:?}")))?;

        let sqs_messages = resp.messages.unwrap_or_default();
        debug!(count = sqs_messages.len(), "received SQS messages");

        let mut messages = Vec::with_capacity(sqs_messages.len());
        for msg in sqs_messages {
            let id = msg.message_id().unwrap_or("unknown").to_string();
            let body = msg.body().unwrap_or("").to_string();

            let receipt_handle = msg
                .receipt_handle()
                .ok_or_else(|| BrokerError::Parse("missing receipt handle".into()))?
                .to_string();

            // SentTimestamp attribute is epoch millis.
            let timestamp = msg
                .attributes()
                .and_then(|attrs| {
                    attrs.get(&aws_sdk_sqs::types::MessageSystemAttributeName::SentTimestamp)
                })
                .and_then(|ts| ts.parse::<i64>().ok())
                .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
                .unwrap_or_else(Utc::now);

            let attempt_count = msg
                .attributes()
                .and_then(|attrs| {
                    attrs.get(
                        &aws_sdk_sqs::types::MessageSystemAttributeName::ApproximateReceiveCount,
                    )
                })
                .and_then(|c| c.parse::<u32>().ok())
                .unwrap_or(1);

            messages.push(BrokerMessage {
                id,
                body,
                receipt_handle,
                timestamp,
                attempt_count,
            });
        }

        Ok(messages)
    }

    async fn ack(&self, receipt_handle: &str) -> Result<(), BrokerError> {
        debug!(receipt_handle, "acking SQS message");

        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(|e| BrokerError::Ack(format!("SQS delete failed: {e:?}")))?;

        Ok(())
    }

    async fn extend_visibility(
        &self,
        receipt_handle: &str,
        seconds: u32,
    ) -> Result<(), BrokerError> {
        debug!(receipt_handle, seconds, "extending SQS visibility");

        self.client
            .change_message_visibility()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt_handle)
            .visibility_timeout(seconds as i32)
            .send()
            .await
            .map_err(|e| BrokerError::Provider(format!("SQS visibility change failed: {e:?}")))?;

        Ok(())
    }

    fn supports_visibility_extension(&self) -> bool {
        true
    }

    async fn health_check(&self) -> Result<BrokerHealth, BrokerError> {
        let resp = self
            .client
            .get_queue_attributes()
            .queue_url(&self.queue_url)
            .attribute_names(QueueAttributeName::ApproximateNumberOfMessages)
            .send()
            .await
            .map_err(|e| BrokerError::Connection(format!("SQS health check failed: {e:?}")))?;

        let count = resp
            .attributes()
            .and_then(|attrs| attrs.get(&QueueAttributeName::ApproximateNumberOfMessages))
            .and_then(|v| v.parse::<u64>().ok());

        Ok(BrokerHealth {
            connected: true,
            approximate_message_count: count,
            provider: "sqs".to_string(),
        })
    }
}
