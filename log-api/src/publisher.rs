use hyper::body::Bytes;
use indexmap::IndexMap;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

use crate::metrics_defs::{LOGS_LOST, LOGS_PUBLISH_TIME, LOGS_PUBLISHED};
use crate::queue::{MessageQueuePublisher, QueueError};
use shared::{counter, histogram};

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Message queue is unavailable: {0}")]
    Unavailable(#[from] QueueError),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),
}

/// Serialized envelopes grouped by partition key, in first-seen key order.
#[derive(Clone, Debug, Default)]
pub struct PublishBatch {
    groups: IndexMap<String, Vec<Bytes>>,
    len: usize,
    total_bytes: usize,
}

impl PublishBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: String, message: Bytes) {
        self.len += 1;
        self.total_bytes += message.len();
        self.groups.entry(key).or_default().push(message);
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    /// Key and messages of each group. An empty key is reported as `None`.
    pub fn groups(&self) -> impl Iterator<Item = (Option<&str>, &[Bytes])> {
        self.groups.iter().map(|(key, messages)| {
            let key = Some(key.as_str()).filter(|key| !key.is_empty());
            (key, messages.as_slice())
        })
    }
}

/// Sends batches of envelopes to every configured topic.
///
/// There is no retry at this level. A failed batch is reported as lost.
pub struct LogPublisher {
    topics: Vec<String>,
    queue: Arc<dyn MessageQueuePublisher>,
}

impl LogPublisher {
    pub fn new(topics: Vec<String>, queue: Arc<dyn MessageQueuePublisher>) -> Self {
        Self { topics, queue }
    }

    pub fn queue(&self) -> &Arc<dyn MessageQueuePublisher> {
        &self.queue
    }

    pub async fn send(&self, batch: &PublishBatch) -> Result<(), PublishError> {
        if batch.is_empty() {
            tracing::debug!("nothing to publish");
            return Ok(());
        }
        if self.topics.is_empty() {
            return Err(PublishError::InvalidMessage("no topic configured".to_string()));
        }
        if batch.groups().any(|(_, messages)| messages.iter().any(Bytes::is_empty)) {
            return Err(PublishError::InvalidMessage("cannot publish an empty message".to_string()));
        }

        let start = Instant::now();
        let result = self.send_to_topics(batch).await;
        histogram!(LOGS_PUBLISH_TIME).record(start.elapsed().as_secs_f64());

        match &result {
            Ok(published) => {
                counter!(LOGS_PUBLISHED).increment(*published as u64);
                tracing::debug!(
                    messages = batch.len(),
                    topics = self.topics.len(),
                    "published logs"
                );
            }
            Err(e) => {
                counter!(LOGS_LOST).increment(batch.len() as u64);
                tracing::error!(
                    error = %e,
                    queue = self.queue.name(),
                    messages = batch.len(),
                    "failed to publish logs"
                );
            }
        }

        result.map(|_| ()).map_err(PublishError::from)
    }

    async fn send_to_topics(&self, batch: &PublishBatch) -> Result<usize, QueueError> {
        let mut published = 0;
        for topic in &self.topics {
            for (key, messages) in batch.groups() {
                self.queue.publish(topic, messages, key).await?;
                published += messages.len();
            }
        }
        Ok(published)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::MemoryQueue;

    fn batch(entries: &[(&str, &str)]) -> PublishBatch {
        let mut batch = PublishBatch::new();
        for (key, message) in entries {
            batch.push(key.to_string(), Bytes::from(message.to_string()));
        }
        batch
    }

    #[test]
    fn test_batch_groups_by_key() {
        let batch = batch(&[("b", "1"), ("a", "22"), ("b", "333"), ("", "4")]);
        assert_eq!(batch.len(), 4);
        assert_eq!(batch.total_bytes(), 7);

        let groups: Vec<_> = batch
            .groups()
            .map(|(key, messages)| (key, messages.len()))
            .collect();
        assert_eq!(groups, vec![(Some("b"), 2), (Some("a"), 1), (None, 1)]);
    }

    #[tokio::test]
    async fn test_empty_batch_is_noop() {
        let queue = Arc::new(MemoryQueue::new());
        let publisher = LogPublisher::new(vec!["logs".to_string()], queue.clone());

        publisher.send(&PublishBatch::new()).await.unwrap();
        assert_eq!(queue.calls(), 0);
    }

    #[tokio::test]
    async fn test_fans_out_to_every_topic() {
        let queue = Arc::new(MemoryQueue::new());
        let publisher = LogPublisher::new(
            vec!["logs".to_string(), "analyzer".to_string()],
            queue.clone(),
        );

        publisher
            .send(&batch(&[("k1", "a"), ("k2", "b"), ("k1", "c")]))
            .await
            .unwrap();

        let published = queue.published();
        let calls: Vec<_> = published
            .iter()
            .map(|b| (b.topic.as_str(), b.key.as_deref(), b.messages.len()))
            .collect();
        assert_eq!(
            calls,
            vec![
                ("logs", Some("k1"), 2),
                ("logs", Some("k2"), 1),
                ("analyzer", Some("k1"), 2),
                ("analyzer", Some("k2"), 1),
            ]
        );
    }

    #[tokio::test]
    async fn test_queue_failure_is_unavailable() {
        let queue = Arc::new(MemoryQueue::new());
        queue.set_failing(true);
        let publisher = LogPublisher::new(vec!["logs".to_string()], queue.clone());

        let err = publisher.send(&batch(&[("k", "a")])).await.unwrap_err();
        assert!(matches!(err, PublishError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_invalid_messages() {
        let queue = Arc::new(MemoryQueue::new());

        let publisher = LogPublisher::new(vec![], queue.clone());
        let err = publisher.send(&batch(&[("k", "a")])).await.unwrap_err();
        assert!(matches!(err, PublishError::InvalidMessage(_)));

        let publisher = LogPublisher::new(vec!["logs".to_string()], queue.clone());
        let err = publisher.send(&batch(&[("k", "")])).await.unwrap_err();
        assert!(matches!(err, PublishError::InvalidMessage(_)));

        assert_eq!(queue.calls(), 0);
    }
}
