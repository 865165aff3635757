use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Dimension name to value, kept in insertion order so serialized
/// envelopes mirror what the client sent.
pub type Dimensions = IndexMap<String, String>;

/// The log record as it is published, before being wrapped in an [`Envelope`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogObject {
    pub message: String,
    #[serde(default)]
    pub dimensions: Dimensions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_type: Option<String>,
    /// Set only when the message was shortened to fit the queue size limit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub truncated: Option<bool>,
    /// Any other properties the client sent alongside the message
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl LogObject {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            dimensions: Dimensions::new(),
            application_type: None,
            truncated: None,
            extra: Map::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    #[serde(rename = "tenantId")]
    pub tenant_id: String,
    /// Serialized as `null` when no region is configured
    pub region: Option<String>,
}

/// Unit of publication: one log plus server-side metadata.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub log: LogObject,
    /// Seconds since the Unix epoch, with sub-second precision
    pub creation_time: f64,
    pub meta: Meta,
}

impl Envelope {
    /// Compact JSON form, exactly as it is handed to the queue
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
