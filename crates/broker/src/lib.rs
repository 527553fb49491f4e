pub mod consumer;
pub mod dispatcher;
pub mod error;
pub mod extender;
pub mod sqs;
pub mod stream;
pub mod traits;

use std::sync::Arc;

use pulse_core::config::{BrokerConfig, RedisConfig};

pub use consumer::MessageConsumer;
pub use dispatcher::{Dispatcher, MessageHandler};
pub use error::BrokerError;
pub use extender::InFlightRegistry;
pub use traits::{BrokerHealth, BrokerMessage, MessagePublisher, TopicConsumer};

/// Build the configured publisher backend.
pub async fn build_publisher(
    broker: &BrokerConfig,
    redis: &RedisConfig,
) -> Result<Arc<dyn MessagePublisher>, BrokerError> {
    match broker.backend.as_str() {
        "redis" => Ok(Arc::new(
            stream::RedisStreamPublisher::connect(&redis.url()).await?,
        )),
        "sqs" => Ok(Arc::new(sqs::SqsPublisher::new(broker).await?)),
        other => Err(BrokerError::Config(format!(
            "unknown broker backend '{other}' — supported: redis, sqs"
        ))),
    }
}

/// Build the configured consumer backend, bound to one topic.
pub async fn build_consumer(
    broker: &BrokerConfig,
    redis: &RedisConfig,
    topic: &str,
) -> Result<Arc<dyn TopicConsumer>, BrokerError> {
    match broker.backend.as_str() {
        "redis" => Ok(Arc::new(
            stream::RedisStreamConsumer::connect(
                &redis.url(),
                topic,
                &broker.consumer_group,
                &broker.consumer_name,
                broker.poll_wait_secs,
            )
            .await?,
        )),
        "sqs" => Ok(Arc::new(sqs::SqsTopicConsumer::new(broker, topic).await?)),
        other => Err(BrokerError::Config(format!(
            "unknown broker backend '{other}' — supported: redis, sqs"
        ))),
    }
}
