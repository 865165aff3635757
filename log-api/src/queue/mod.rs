//! Message queue transports.
//!
//! The publisher only sees [`MessageQueuePublisher`]. A single instance is
//! created at startup and shared by every request.

#[cfg(feature = "kafka")]
mod kafka;
mod memory;
mod rest_proxy;

use async_trait::async_trait;
use hyper::body::Bytes;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::QueueConfig;

#[cfg(feature = "kafka")]
pub use kafka::KafkaQueue;
pub use memory::{MemoryQueue, PublishedBatch};
pub use rest_proxy::RestProxyQueue;

/// Base delay of the exponential backoff used while establishing connections
pub(crate) const BASE_DELAY: u64 = 500;
/// Longest wait between two connection attempts
pub(crate) const MAX_DELAY: Duration = Duration::from_secs(30);

/// Wait before the connection attempt following `retries` failed ones
pub(crate) fn backoff(retries: u32) -> Duration {
    2_u64
        .checked_pow(retries)
        .and_then(|factor| factor.checked_mul(BASE_DELAY))
        .map_or(MAX_DELAY, Duration::from_millis)
        .min(MAX_DELAY)
}

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Message queue unavailable: {0}")]
    Unavailable(String),

    #[error("No leader available for topic {0}")]
    LeaderNotAvailable(String),

    #[error("Message rejected by the queue: {0}")]
    Rejected(String),

    #[error("Unknown error while sending message: {0}")]
    Unknown(String),

    #[error("Failed to serialize produce request: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Queue transport {0} is not available in this build")]
    Unsupported(&'static str),
}

/// A transport able to append messages to a topic.
#[async_trait]
pub trait MessageQueuePublisher: Send + Sync {
    fn name(&self) -> &'static str;

    /// Appends `messages` to `topic`, all under the same partition key.
    async fn publish(
        &self,
        topic: &str,
        messages: &[Bytes],
        key: Option<&str>,
    ) -> Result<(), QueueError>;

    async fn health_check(&self) -> Result<(), QueueError> {
        Ok(())
    }
}

/// Creates the transport described by `config`.
pub fn from_config(config: &QueueConfig) -> Result<Arc<dyn MessageQueuePublisher>, QueueError> {
    match config {
        QueueConfig::Memory => {
            tracing::warn!("using the in-memory queue, logs are not persisted");
            Ok(Arc::new(MemoryQueue::new()))
        }
        QueueConfig::RestProxy {
            url,
            timeout_secs,
            max_retries,
        } => Ok(Arc::new(RestProxyQueue::new(
            url.clone(),
            Duration::from_secs(*timeout_secs),
            *max_retries,
        )?)),
        #[cfg(feature = "kafka")]
        QueueConfig::Kafka {
            brokers,
            client_id,
            timeout_secs,
            max_retries,
        } => Ok(Arc::new(KafkaQueue::new(
            brokers,
            client_id,
            Duration::from_secs(*timeout_secs),
            *max_retries,
        ))),
        #[cfg(not(feature = "kafka"))]
        QueueConfig::Kafka { .. } => Err(QueueError::Unsupported("kafka")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config() {
        let queue = from_config(&QueueConfig::Memory).unwrap();
        assert_eq!(queue.name(), "memory");

        let queue = from_config(&QueueConfig::RestProxy {
            url: url::Url::parse("http://localhost:8082").unwrap(),
            timeout_secs: 1,
            max_retries: 0,
        })
        .unwrap();
        assert_eq!(queue.name(), "rest_proxy");
    }

    #[test]
    fn test_backoff() {
        assert_eq!(backoff(0), Duration::from_millis(500));
        assert_eq!(backoff(1), Duration::from_secs(1));
        assert_eq!(backoff(3), Duration::from_secs(4));
        assert_eq!(backoff(6), MAX_DELAY);
        assert_eq!(backoff(60), MAX_DELAY);
        assert_eq!(backoff(u32::MAX), MAX_DELAY);
    }

    #[cfg(not(feature = "kafka"))]
    #[test]
    fn test_kafka_requires_feature() {
        let result = from_config(&QueueConfig::Kafka {
            brokers: "localhost:9092".to_string(),
            client_id: "log-api".to_string(),
            timeout_secs: 1,
            max_retries: 0,
        });
        assert!(matches!(result, Err(QueueError::Unsupported("kafka"))));
    }
}
