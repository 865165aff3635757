use serde::Deserialize;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use url::Url;

use crate::model::{Envelope, LogObject, Meta};

/// Payload cap applied to the declared `Content-Length` of a request
pub const DEFAULT_MAX_LOG_SIZE: u64 = 1024 * 1024;
/// Largest envelope the queue accepts, overhead included
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1_048_576;
pub const DEFAULT_TOPIC: &str = "logs";
pub const DEFAULT_DELEGATE_ROLE: &str = "monitoring-delegate";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("At least one publisher topic is required")]
    NoTopics,

    #[error("Empty topic name")]
    EmptyTopic,

    #[error("max_log_size cannot be 0")]
    InvalidMaxLogSize,

    #[error(
        "max_message_size ({max_message_size}) must be larger than the fixed envelope overhead ({overhead})"
    )]
    MessageSizeBelowOverhead {
        max_message_size: usize,
        overhead: usize,
    },
}

/// HTTP methods supported for route matching
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Head,
    Post,
    Put,
    Delete,
}

impl PartialEq<http::Method> for HttpMethod {
    fn eq(&self, other: &http::Method) -> bool {
        let method = match self {
            HttpMethod::Get => http::Method::GET,
            HttpMethod::Head => http::Method::HEAD,
            HttpMethod::Post => http::Method::POST,
            HttpMethod::Put => http::Method::PUT,
            HttpMethod::Delete => http::Method::DELETE,
        };
        method == *other
    }
}

/// Handlers a route can dispatch to
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum HandlerAction {
    /// One log per request, dimensions and application type from headers
    SingleLog,
    /// Many logs per request, dimensions from the JSON body
    BulkLogs,
    Healthcheck,
    Versions,
}

/// Log API configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Main listener for incoming requests
    pub listener: Listener,
    /// Admin listener for liveness and readiness checks
    pub admin_listener: Listener,
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub log_publisher: LogPublisherConfig,
    /// Message queue transport the publisher ships envelopes through
    #[serde(default)]
    pub queue: QueueConfig,
    /// Request routing rules
    #[serde(default = "default_routes")]
    pub routes: Vec<Route>,
}

impl Config {
    /// Validates the log API configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.listener.validate()?;
        self.admin_listener.validate()?;

        if self.service.max_log_size == 0 {
            return Err(ConfigError::InvalidMaxLogSize);
        }

        self.log_publisher.validate(self.service.region.as_deref())
    }
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    /// Host address to bind to (e.g., "0.0.0.0" or "127.0.0.1")
    pub host: String,
    /// Port number to listen on
    pub port: u16,
}

impl Listener {
    /// Validates the listener configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        Ok(())
    }
}

/// Service-wide settings shared by every request
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ServiceConfig {
    /// Region stamped into the `meta` block of every envelope
    #[serde(default)]
    pub region: Option<String>,
    /// Maximum accepted request payload in bytes (exclusive)
    #[serde(default = "default_max_log_size")]
    pub max_log_size: u64,
    /// Roles that allow a caller to submit logs on behalf of another tenant
    #[serde(default = "default_delegate_roles")]
    pub delegate_roles: Vec<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            region: None,
            max_log_size: DEFAULT_MAX_LOG_SIZE,
            delegate_roles: default_delegate_roles(),
        }
    }
}

/// How the partition key is assembled from tenant, application type and dimensions
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum KeyFormat {
    /// Segments joined with `:`, dimension pairs written as `name=value`
    #[default]
    Delimited,
    /// Plain concatenation without separators, byte-compatible with older producers
    Legacy,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct LogPublisherConfig {
    /// Every accepted batch is sent to each of these topics
    #[serde(default = "default_topics")]
    pub topics: Vec<String>,
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
    #[serde(default)]
    pub key_format: KeyFormat,
    #[serde(default)]
    pub truncation: TruncationConfig,
}

impl Default for LogPublisherConfig {
    fn default() -> Self {
        Self {
            topics: default_topics(),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            key_format: KeyFormat::default(),
            truncation: TruncationConfig::default(),
        }
    }
}

impl LogPublisherConfig {
    /// `region` is stamped on every envelope and so counts towards the
    /// fixed overhead.
    pub fn validate(&self, region: Option<&str>) -> Result<(), ConfigError> {
        if self.topics.is_empty() {
            return Err(ConfigError::NoTopics);
        }
        if self.topics.iter().any(|topic| topic.trim().is_empty()) {
            return Err(ConfigError::EmptyTopic);
        }

        // A truncated envelope with an empty message must still fit. Tenant
        // ids, dimensions and extra properties come on top of this.
        let overhead = minimal_envelope_size(region)
            + self.truncation.timestamp_key_size()
            + self.truncation.kafka_meta_data_size
            + self.truncation.safe_offset;
        if self.max_message_size <= overhead {
            return Err(ConfigError::MessageSizeBelowOverhead {
                max_message_size: self.max_message_size,
                overhead,
            });
        }

        Ok(())
    }
}

/// Widest `creation_time` the serializer produces for current dates
const WIDEST_CREATION_TIME: f64 = 9_999_999_999.999_998;

/// Serialized size of a truncated envelope with an empty message, tenant id
/// and dimensions.
fn minimal_envelope_size(region: Option<&str>) -> usize {
    let mut log = LogObject::new("");
    log.truncated = Some(true);
    let envelope = Envelope {
        log,
        creation_time: WIDEST_CREATION_TIME,
        meta: Meta {
            tenant_id: String::new(),
            region: region.map(String::from),
        },
    };
    envelope.to_json().map_or(0, |json| json.len())
}

/// Size estimates added to every serialized envelope before comparing it
/// against `max_message_size`.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct TruncationConfig {
    /// Protocol overhead allowance per message
    #[serde(default = "default_kafka_meta_data_size")]
    pub kafka_meta_data_size: usize,
    #[serde(default = "default_safe_offset")]
    pub safe_offset: usize,
    /// Byte length of the broker timestamp. Estimated from the current
    /// epoch milliseconds when not set.
    #[serde(default)]
    pub timestamp_key_size: Option<usize>,
}

impl Default for TruncationConfig {
    fn default() -> Self {
        Self {
            kafka_meta_data_size: default_kafka_meta_data_size(),
            safe_offset: default_safe_offset(),
            timestamp_key_size: None,
        }
    }
}

impl TruncationConfig {
    pub fn timestamp_key_size(&self) -> usize {
        self.timestamp_key_size
            .unwrap_or_else(estimate_timestamp_key_size)
    }
}

fn estimate_timestamp_key_size() -> usize {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    millis.to_string().len()
}

/// Message queue transport
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
#[serde(tag = "type")]
pub enum QueueConfig {
    /// Keeps published batches in process memory. Not for production use.
    #[default]
    Memory,
    /// Kafka REST proxy reachable over HTTP
    RestProxy {
        url: Url,
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
        #[serde(default = "default_max_retries")]
        max_retries: u32,
    },
    /// Native Kafka producer, requires the `kafka` feature
    Kafka {
        /// Comma separated `host:port` list
        brokers: String,
        #[serde(default = "default_client_id")]
        client_id: String,
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
        #[serde(default = "default_max_retries")]
        max_retries: u32,
    },
}

/// Routing rule configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Route {
    /// Conditions for matching incoming requests
    pub r#match: Match,
    /// Handler invoked when the match conditions are met
    pub action: HandlerAction,
}

/// Request matching criteria
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct Match {
    /// Optional hostname to match (e.g., "logs.example.com")
    pub host: Option<String>,
    /// Optional exact path to match (e.g., "/v3.0/logs")
    pub path: Option<String>,
    /// Optional path prefix to match (e.g., "/version/")
    pub path_prefix: Option<String>,
    /// Optional HTTP method to match
    pub method: Option<HttpMethod>,
}

fn route(method: Option<HttpMethod>, path: &str, action: HandlerAction) -> Route {
    Route {
        r#match: Match {
            path: Some(path.to_string()),
            method,
            ..Match::default()
        },
        action,
    }
}

pub fn default_routes() -> Vec<Route> {
    use HandlerAction::{BulkLogs, Healthcheck, SingleLog, Versions};
    use HttpMethod::{Get, Post};

    vec![
        route(Some(Post), "/v2.0/log/single", SingleLog),
        route(Some(Post), "/v3.0/logs", BulkLogs),
        route(None, "/healthcheck", Healthcheck),
        route(Some(Get), "/", Versions),
        route(Some(Get), "/version", Versions),
        Route {
            r#match: Match {
                path_prefix: Some("/version/".to_string()),
                method: Some(Get),
                ..Match::default()
            },
            action: Versions,
        },
    ]
}

fn default_max_log_size() -> u64 {
    DEFAULT_MAX_LOG_SIZE
}

fn default_delegate_roles() -> Vec<String> {
    vec![DEFAULT_DELEGATE_ROLE.to_string()]
}

fn default_topics() -> Vec<String> {
    vec![DEFAULT_TOPIC.to_string()]
}

fn default_max_message_size() -> usize {
    DEFAULT_MAX_MESSAGE_SIZE
}

fn default_kafka_meta_data_size() -> usize {
    32
}

fn default_safe_offset() -> usize {
    1
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_max_retries() -> u32 {
    3
}

fn default_client_id() -> String {
    "log-api".to_string()
}
