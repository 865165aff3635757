use async_trait::async_trait;
use hyper::body::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use super::{MessageQueuePublisher, QueueError};

/// One `publish` call as seen by the queue
#[derive(Clone, Debug, PartialEq)]
pub struct PublishedBatch {
    pub topic: String,
    pub key: Option<String>,
    pub messages: Vec<Bytes>,
}

/// In-process queue that records what it receives. Used for local runs and tests.
#[derive(Debug)]
pub struct MemoryQueue {
    published: Mutex<Vec<PublishedBatch>>,
    failing: AtomicBool,
    healthy: AtomicBool,
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self {
            published: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
            healthy: AtomicBool::new(true),
        }
    }

    /// Makes every following `publish` call fail as if the queue were down.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::Relaxed);
    }

    pub fn published(&self) -> Vec<PublishedBatch> {
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of successful `publish` calls
    pub fn calls(&self) -> usize {
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Every message received, across topics and keys
    pub fn messages(&self) -> Vec<Bytes> {
        self.published()
            .into_iter()
            .flat_map(|batch| batch.messages)
            .collect()
    }
}

#[async_trait]
impl MessageQueuePublisher for MemoryQueue {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn publish(
        &self,
        topic: &str,
        messages: &[Bytes],
        key: Option<&str>,
    ) -> Result<(), QueueError> {
        if self.failing.load(Ordering::Relaxed) {
            return Err(QueueError::Unavailable("memory queue is failing".to_string()));
        }

        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(PublishedBatch {
                topic: topic.to_string(),
                key: key.map(String::from),
                messages: messages.to_vec(),
            });
        Ok(())
    }

    async fn health_check(&self) -> Result<(), QueueError> {
        if self.healthy.load(Ordering::Relaxed) {
            Ok(())
        } else {
            Err(QueueError::Unavailable("memory queue is unhealthy".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_published_batches() {
        let queue = MemoryQueue::new();
        queue
            .publish("logs", &[Bytes::from("a"), Bytes::from("b")], Some("k"))
            .await
            .unwrap();

        assert_eq!(queue.calls(), 1);
        assert_eq!(
            queue.published()[0],
            PublishedBatch {
                topic: "logs".to_string(),
                key: Some("k".to_string()),
                messages: vec![Bytes::from("a"), Bytes::from("b")],
            }
        );
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let queue = MemoryQueue::new();
        queue.set_failing(true);
        assert!(queue.publish("logs", &[Bytes::from("a")], None).await.is_err());
        assert_eq!(queue.calls(), 0);

        assert!(queue.health_check().await.is_ok());
        queue.set_healthy(false);
        assert!(queue.health_check().await.is_err());
    }
}
