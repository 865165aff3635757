use crate::config::TruncationConfig;
use crate::metrics_defs::LOGS_TRUNCATED;
use crate::model::Envelope;
use shared::histogram;

/// Length of the `"truncated": true` marker accounted for when shrinking a message
pub const TRUNCATED_PROPERTY_SIZE: usize = "\"truncated\": true".len();

/// A serialized envelope ready for the queue
#[derive(Clone, Debug, PartialEq)]
pub struct SerializedEnvelope {
    pub json: String,
    /// Bytes removed from the message, 0 if it was left intact
    pub truncated_by: usize,
}

/// Shrinks envelope messages so the serialized envelope plus transport
/// overhead stays under the queue's message size limit.
#[derive(Clone, Debug)]
pub struct Truncator {
    max_message_size: usize,
    timestamp_key_size: usize,
    kafka_meta_data_size: usize,
    safe_offset: usize,
}

impl Truncator {
    pub fn new(max_message_size: usize, config: &TruncationConfig) -> Self {
        Self {
            max_message_size,
            timestamp_key_size: config.timestamp_key_size(),
            kafka_meta_data_size: config.kafka_meta_data_size,
            safe_offset: config.safe_offset,
        }
    }

    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    /// Bytes every message costs on top of its serialized envelope
    pub fn overhead(&self) -> usize {
        self.timestamp_key_size + self.kafka_meta_data_size
    }

    /// Size of a serialized envelope as the queue will see it
    pub fn envelope_size(&self, json: &str) -> usize {
        json.len() + self.overhead()
    }

    /// Serializes the envelope, truncating its message first when the result
    /// would not fit.
    ///
    /// Whole characters are removed from the end of the message, so the result
    /// is always valid UTF-8 and may lose a few bytes more than strictly needed.
    pub fn truncate(
        &self,
        envelope: &mut Envelope,
    ) -> Result<SerializedEnvelope, serde_json::Error> {
        let json = envelope.to_json()?;
        let size = self.envelope_size(&json);

        if size < self.max_message_size {
            return Ok(SerializedEnvelope {
                json,
                truncated_by: 0,
            });
        }

        // Leaves the result at least one byte under the limit
        let diff = size + self.safe_offset.max(1) - self.max_message_size;
        let truncate_by = diff + TRUNCATED_PROPERTY_SIZE;
        let message = &mut envelope.log.message;
        let original_len = message.len();
        let mut cut = original_len.saturating_sub(truncate_by);
        while !message.is_char_boundary(cut) {
            cut -= 1;
        }
        message.truncate(cut);
        envelope.log.truncated = Some(true);

        let truncated_by = original_len - cut;
        tracing::warn!(
            envelope_size = size,
            max_message_size = self.max_message_size,
            truncated_by,
            "truncating log message to fit the queue"
        );
        histogram!(LOGS_TRUNCATED).record(truncated_by as f64);

        Ok(SerializedEnvelope {
            json: envelope.to_json()?,
            truncated_by,
        })
    }
}
