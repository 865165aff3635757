use async_trait::async_trait;
use hyper::body::Bytes;
use rdkafka::ClientConfig;
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::sleep;

use super::{MessageQueuePublisher, QueueError, backoff};

/// Publishes straight to Kafka brokers.
///
/// A publish returns once every message has a delivery report, so broker
/// failures surface to the caller. The producer is created on first use and
/// dropped again after the broker reports it unreachable, so the next publish
/// starts from a fresh client.
pub struct KafkaQueue {
    client_config: ClientConfig,
    timeout: Duration,
    max_retries: u32,
    producer: Mutex<Option<Arc<FutureProducer>>>,
}

impl KafkaQueue {
    pub fn new(brokers: &str, client_id: &str, timeout: Duration, max_retries: u32) -> Self {
        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", brokers)
            .set("client.id", client_id)
            .set("message.timeout.ms", timeout.as_millis().to_string());

        Self {
            client_config,
            timeout,
            max_retries,
            producer: Mutex::new(None),
        }
    }

    async fn producer(&self) -> Result<Arc<FutureProducer>, QueueError> {
        let cached = self
            .producer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(producer) = cached {
            return Ok(producer);
        }

        let mut retries = 0;
        let producer = loop {
            match self.client_config.create::<FutureProducer>() {
                Ok(producer) => break Arc::new(producer),
                Err(e) if retries < self.max_retries => {
                    let delay = backoff(retries);
                    tracing::warn!(
                        error = %e,
                        retries,
                        ?delay,
                        "failed to create kafka producer, retrying"
                    );
                    sleep(delay).await;
                    retries += 1;
                }
                Err(e) => return Err(QueueError::Unavailable(e.to_string())),
            }
        };

        *self.producer.lock().unwrap_or_else(PoisonError::into_inner) = Some(producer.clone());
        Ok(producer)
    }

    fn reset(&self) {
        tracing::warn!("resetting kafka producer");
        self.producer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    fn classify(&self, topic: &str, error: KafkaError) -> QueueError {
        match error.rdkafka_error_code() {
            Some(
                RDKafkaErrorCode::LeaderNotAvailable | RDKafkaErrorCode::NotLeaderForPartition,
            ) => {
                self.reset();
                QueueError::LeaderNotAvailable(topic.to_string())
            }
            Some(
                RDKafkaErrorCode::AllBrokersDown
                | RDKafkaErrorCode::BrokerTransportFailure
                | RDKafkaErrorCode::QueueFull
                | RDKafkaErrorCode::MessageTimedOut,
            ) => {
                self.reset();
                QueueError::Unavailable(error.to_string())
            }
            Some(RDKafkaErrorCode::MessageSizeTooLarge) => QueueError::Rejected(error.to_string()),
            _ => QueueError::Unknown(error.to_string()),
        }
    }
}

#[async_trait]
impl MessageQueuePublisher for KafkaQueue {
    fn name(&self) -> &'static str {
        "kafka"
    }

    async fn publish(
        &self,
        topic: &str,
        messages: &[Bytes],
        key: Option<&str>,
    ) -> Result<(), QueueError> {
        let producer = self.producer().await?;

        // Enqueue the whole batch first, then wait for every delivery report
        let mut deliveries = Vec::with_capacity(messages.len());
        for message in messages {
            let mut record = FutureRecord::<str, [u8]>::to(topic).payload(message.as_ref());
            if let Some(key) = key {
                record = record.key(key);
            }
            match producer.send_result(record) {
                Ok(delivery) => deliveries.push(delivery),
                Err((error, _record)) => return Err(self.classify(topic, error)),
            }
        }

        for delivery in deliveries {
            match delivery.await {
                Ok(Ok(_)) => {}
                Ok(Err((error, _message))) => return Err(self.classify(topic, error)),
                Err(_) => {
                    self.reset();
                    return Err(QueueError::Unavailable(
                        "producer dropped before reporting delivery".to_string(),
                    ));
                }
            }
        }

        Ok(())
    }

    async fn health_check(&self) -> Result<(), QueueError> {
        let producer = self.producer().await?;
        let timeout = self.timeout;

        tokio::task::spawn_blocking(move || producer.client().fetch_metadata(None, timeout))
            .await
            .map_err(|e| QueueError::Unknown(e.to_string()))?
            .map(|_| ())
            .map_err(|e| {
                self.reset();
                QueueError::Unavailable(e.to_string())
            })
    }
}
