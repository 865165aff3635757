use hyper::body::Bytes;
use serde_json::Value;
use std::sync::Arc;

use crate::config::Config;
use crate::envelope::{EnvelopeBuilder, EnvelopeError, LogEntry};
use crate::errors::LogApiError;
use crate::key::KeyDeriver;
use crate::metrics_defs::{LOGS_BULKS_REJECTED, LOGS_RECEIVED, LOGS_REJECTED};
use crate::model::{Dimensions, LogObject};
use crate::publisher::{LogPublisher, PublishBatch};
use crate::queue::MessageQueuePublisher;
use crate::truncator::Truncator;
use crate::validation::{ValidationError, validate_dimensions, validate_envelope_size};
use shared::counter;

/// Outcome of processing one request worth of logs
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProcessResult {
    pub accepted: usize,
    pub rejected: usize,
    /// Serialized size of the accepted envelopes
    pub total_bytes: usize,
}

/// Parsed body of a bulk request: `{"dimensions": {...}, "logs": [...]}`.
#[derive(Debug)]
pub struct BulkRequest {
    pub dimensions: Dimensions,
    pub logs: Vec<Value>,
}

impl BulkRequest {
    /// Body level checks. A failure here rejects the request as a whole.
    pub fn from_value(body: Value) -> Result<Self, ValidationError> {
        let Value::Object(mut body) = body else {
            return Err(ValidationError::UnprocessableEntity(
                "Request body must be a JSON object".to_string(),
            ));
        };

        let logs = match body.remove("logs") {
            Some(Value::Array(logs)) => logs,
            Some(_) => {
                return Err(ValidationError::UnprocessableEntity("logs must be a list".to_string()));
            }
            None => {
                return Err(ValidationError::UnprocessableEntity(
                    "Request body should contain logs".to_string(),
                ));
            }
        };

        let dimensions = match body.get("dimensions") {
            None | Some(Value::Null) => Dimensions::new(),
            Some(value) => validate_dimensions(value)?,
        };

        Ok(Self { dimensions, logs })
    }
}

/// Turns validated logs into envelopes and hands them to the publisher
/// as one batch.
pub struct BulkProcessor {
    builder: EnvelopeBuilder,
    truncator: Truncator,
    keys: KeyDeriver,
    publisher: LogPublisher,
}

impl BulkProcessor {
    pub fn new(config: &Config, queue: Arc<dyn MessageQueuePublisher>) -> Self {
        let publisher_config = &config.log_publisher;
        Self {
            builder: EnvelopeBuilder::new(config.service.region.clone()),
            truncator: Truncator::new(
                publisher_config.max_message_size,
                &publisher_config.truncation,
            ),
            keys: KeyDeriver::new(publisher_config.key_format),
            publisher: LogPublisher::new(publisher_config.topics.clone(), queue),
        }
    }

    pub fn builder(&self) -> &EnvelopeBuilder {
        &self.builder
    }

    pub fn publisher(&self) -> &LogPublisher {
        &self.publisher
    }

    /// Processes the items of a bulk request.
    ///
    /// Items failing validation are counted as rejected and skipped. Everything
    /// else is published in a single call.
    pub async fn process(
        &self,
        items: Vec<Value>,
        global_dimensions: &Dimensions,
        tenant_id: Option<&str>,
    ) -> Result<ProcessResult, LogApiError> {
        let Some(tenant_id) = tenant_id.filter(|tenant| !tenant.is_empty()) else {
            counter!(LOGS_BULKS_REJECTED).increment(1);
            return Err(EnvelopeError::MissingTenant.into());
        };

        let mut batch = PublishBatch::new();
        let mut rejected = 0;

        for (index, item) in items.into_iter().enumerate() {
            let prepared = LogEntry::from_value(item)
                .map_err(LogApiError::from)
                .and_then(|entry| self.prepare(entry.into_log(global_dimensions), tenant_id));

            match prepared {
                Ok((key, json)) => batch.push(key, json),
                Err(e) => {
                    rejected += 1;
                    tracing::debug!(index, error = %e, "rejecting log entry");
                }
            }
        }

        counter!(LOGS_RECEIVED).increment(batch.len() as u64);
        counter!(LOGS_REJECTED).increment(rejected as u64);

        let result = ProcessResult {
            accepted: batch.len(),
            rejected,
            total_bytes: batch.total_bytes(),
        };
        self.publisher.send(&batch).await?;
        Ok(result)
    }

    /// Processes one already built log. Any failure is returned to the caller.
    pub async fn process_single(
        &self,
        log: LogObject,
        tenant_id: Option<&str>,
    ) -> Result<ProcessResult, LogApiError> {
        let prepared = tenant_id
            .filter(|tenant| !tenant.is_empty())
            .ok_or_else(|| EnvelopeError::MissingTenant.into())
            .and_then(|tenant_id| self.prepare(log, tenant_id));

        let (key, json) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => {
                counter!(LOGS_REJECTED).increment(1);
                return Err(e);
            }
        };
        counter!(LOGS_RECEIVED).increment(1);

        let mut batch = PublishBatch::new();
        batch.push(key, json);
        self.publisher.send(&batch).await?;

        Ok(ProcessResult {
            accepted: 1,
            rejected: 0,
            total_bytes: batch.total_bytes(),
        })
    }

    /// Builds, truncates and size checks one envelope. Returns its partition
    /// key and serialized form.
    fn prepare(&self, log: LogObject, tenant_id: &str) -> Result<(String, Bytes), LogApiError> {
        let key = self.keys.build_key(Some(tenant_id), Some(&log));
        let mut envelope = self.builder.build_envelope(log, Some(tenant_id))?;
        let serialized = self.truncator.truncate(&mut envelope)?;
        validate_envelope_size(
            self.truncator.envelope_size(&serialized.json),
            self.truncator.max_message_size(),
        )?;
        Ok((key, Bytes::from(serialized.json)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Envelope;
    use crate::testutils::{memory_processor, test_config};
    use http::StatusCode;
    use serde_json::json;

    #[test]
    fn test_bulk_request_parsing() {
        let request = BulkRequest::from_value(json!({
            "dimensions": {"hostname": "h1"},
            "logs": [{"message": "a"}, {"message": "b"}],
        }))
        .unwrap();
        assert_eq!(request.logs.len(), 2);
        assert_eq!(
            request.dimensions.get("hostname").map(String::as_str),
            Some("h1")
        );

        let request = BulkRequest::from_value(json!({"logs": []})).unwrap();
        assert!(request.dimensions.is_empty());

        assert!(BulkRequest::from_value(json!({"dimensions": {}})).is_err());
        assert!(BulkRequest::from_value(json!({"logs": {"message": "a"}})).is_err());
        assert!(BulkRequest::from_value(json!({"logs": [], "dimensions": "a:b"})).is_err());
        assert!(BulkRequest::from_value(json!([{"message": "a"}])).is_err());
    }

    #[tokio::test]
    async fn test_partial_rejection() {
        let (queue, processor) = memory_processor(test_config());
        let items = vec![
            json!({"message": "1"}),
            json!({"message": "2"}),
            json!({"dimensions": {"a": "b"}}),
            json!({"message": "4"}),
            json!({"message": "5"}),
        ];

        let result = processor
            .process(items, &Dimensions::new(), Some("t1"))
            .await
            .unwrap();
        assert_eq!(result.accepted, 4);
        assert_eq!(result.rejected, 1);
        assert!(result.total_bytes > 0);

        // All accepted logs share a key, so they arrive in one call
        assert_eq!(queue.calls(), 1);
        let messages = queue.messages();
        assert_eq!(messages.len(), 4);
        let bodies: Vec<String> = messages
            .iter()
            .map(|m| serde_json::from_slice::<Envelope>(m).unwrap().log.message)
            .collect();
        assert_eq!(bodies, vec!["1", "2", "4", "5"]);
    }

    #[tokio::test]
    async fn test_global_dimensions_are_merged() {
        let (queue, processor) = memory_processor(test_config());
        let mut global = Dimensions::new();
        global.insert("hostname".to_string(), "global".to_string());
        global.insert("service".to_string(), "api".to_string());

        let items = vec![
            json!({"message": "a", "dimensions": {"hostname": "item"}}),
            json!({"message": "b"}),
        ];
        processor.process(items, &global, Some("t1")).await.unwrap();

        let published = queue.published();
        assert_eq!(published.len(), 2);
        assert_eq!(
            published[0].key.as_deref(),
            Some("t1:hostname=item:service=api")
        );
        assert_eq!(
            published[1].key.as_deref(),
            Some("t1:hostname=global:service=api")
        );

        let first: Envelope = serde_json::from_slice(&published[0].messages[0]).unwrap();
        assert_eq!(
            first.log.dimensions.get("hostname").map(String::as_str),
            Some("item")
        );
        assert_eq!(first.meta.tenant_id, "t1");
    }

    #[tokio::test]
    async fn test_missing_tenant_rejects_bulk() {
        let (queue, processor) = memory_processor(test_config());
        let err = processor
            .process(vec![json!({"message": "a"})], &Dimensions::new(), None)
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(queue.calls(), 0);
    }

    #[tokio::test]
    async fn test_all_rejected_publishes_nothing() {
        let (queue, processor) = memory_processor(test_config());
        let result = processor
            .process(
                vec![json!({"no": "message"}), json!(3)],
                &Dimensions::new(),
                Some("t1"),
            )
            .await
            .unwrap();
        assert_eq!(
            result,
            ProcessResult {
                accepted: 0,
                rejected: 2,
                total_bytes: 0,
            }
        );
        assert_eq!(queue.calls(), 0);
    }

    #[tokio::test]
    async fn test_oversized_message_is_truncated() {
        let mut config = test_config();
        config.log_publisher.max_message_size = 512;
        let (queue, processor) = memory_processor(config);

        processor
            .process_single(LogObject::new("z".repeat(4096)), Some("t1"))
            .await
            .unwrap();

        let messages = queue.messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].len() + 13 + 32 < 512);
        let envelope: Envelope = serde_json::from_slice(&messages[0]).unwrap();
        assert_eq!(envelope.log.truncated, Some(true));
    }

    #[tokio::test]
    async fn test_logs_near_the_limit_are_accepted() {
        let (queue, processor) = memory_processor(test_config());
        processor
            .process_single(LogObject::new("w".repeat(300)), Some("t1"))
            .await
            .unwrap();
        let size = queue.messages()[0].len() + 13 + 32;

        // creation_time may serialize with a different width on every call
        for max in size - 4..=size + 4 {
            let mut config = test_config();
            config.log_publisher.max_message_size = max;
            let (queue, processor) = memory_processor(config);

            processor
                .process_single(LogObject::new("w".repeat(300)), Some("t1"))
                .await
                .unwrap();
            let items = vec![json!({"message": "w".repeat(300)})];
            let result = processor
                .process(items, &Dimensions::new(), Some("t1"))
                .await
                .unwrap();
            assert_eq!(result.accepted, 1, "max: {max}");

            for message in queue.messages() {
                assert!(message.len() + 13 + 32 < max, "max: {max}");
            }
        }
    }

    #[tokio::test]
    async fn test_process_single_errors() {
        let (queue, processor) = memory_processor(test_config());

        let err = processor
            .process_single(LogObject::new("a"), Some(""))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);

        queue.set_failing(true);
        let err = processor
            .process_single(LogObject::new("a"), Some("t1"))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
