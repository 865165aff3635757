use serde_json::{Map, Value};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

use crate::model::{Dimensions, Envelope, LogObject, Meta};
use crate::validation::{
    ValidationError, validate_application_type, validate_dimension_map, validate_dimensions,
    validate_log_message,
};

pub const JSON_CONTENT_TYPE: &str = "application/json";
pub const TEXT_CONTENT_TYPE: &str = "text/plain";

/// Properties the server owns. Client supplied values for these are replaced.
const RESERVED_PROPERTIES: [&str; 4] = ["message", "dimensions", "application_type", "truncated"];

#[derive(Error, Debug)]
pub enum EnvelopeError {
    #[error("Envelope cannot be created without a log")]
    MissingLog,

    #[error("Envelope cannot be created without a tenant")]
    MissingTenant,
}

/// Where the dimensions of a log come from
#[derive(Debug)]
pub enum DimensionsSource<'a> {
    /// Raw `X-Dimensions` header value, `None` when the header was not sent
    Header(Option<&'a str>),
    /// Dimensions already extracted from a JSON body
    Mapping(Dimensions),
}

/// Parses the `name:value,name:value` form of the `X-Dimensions` header.
///
/// Entries with an empty name or value after trimming are skipped. Everything
/// after the first `:` belongs to the value.
pub fn parse_dimensions(header: &str) -> Result<Dimensions, ValidationError> {
    if header.trim().is_empty() {
        return Err(ValidationError::UnprocessableEntity("Dimensions are required".to_string()));
    }

    let mut dimensions = Dimensions::new();
    for entry in header.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            return Err(ValidationError::UnprocessableEntity(
                "Dimension cannot be empty".to_string(),
            ));
        }
        let Some((name, value)) = entry.split_once(':') else {
            return Err(ValidationError::UnprocessableEntity(format!(
                "{entry} is not a valid dimension"
            )));
        };
        let (name, value) = (name.trim(), value.trim());
        if !name.is_empty() && !value.is_empty() {
            dimensions.insert(name.to_string(), value.to_string());
        }
    }
    Ok(dimensions)
}

/// Trims an application type, treating blank values as absent.
pub fn parse_application_type(application_type: Option<&str>) -> Option<String> {
    application_type
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(String::from)
}

/// Pulls the message out of a raw log map. Strings are taken as they are,
/// other JSON values keep their JSON text.
fn take_message(log: &mut Map<String, Value>) -> Result<String, ValidationError> {
    validate_log_message(log)?;
    let message = match log.remove("message") {
        Some(Value::String(message)) => message,
        Some(other) => other.to_string(),
        None => String::new(),
    };
    if message.is_empty() {
        return Err(ValidationError::UnprocessableEntity("Log message cannot be empty".to_string()));
    }
    Ok(message)
}

fn strip_reserved(mut log: Map<String, Value>) -> Map<String, Value> {
    for property in RESERVED_PROPERTIES {
        log.remove(property);
    }
    log
}

/// One element of a bulk `logs` array, validated but not yet merged with
/// request level dimensions.
#[derive(Clone, Debug, PartialEq)]
pub struct LogEntry {
    pub message: String,
    pub dimensions: Option<Dimensions>,
    pub application_type: Option<String>,
    pub extra: Map<String, Value>,
}

impl LogEntry {
    pub fn from_value(value: Value) -> Result<Self, ValidationError> {
        let Value::Object(mut log) = value else {
            return Err(ValidationError::UnprocessableEntity(
                "Log entry must be an object".to_string(),
            ));
        };

        let message = take_message(&mut log)?;

        let dimensions = match log.get("dimensions") {
            None | Some(Value::Null) => None,
            Some(value) => Some(validate_dimensions(value)?),
        };

        let application_type = match log.get("application_type") {
            None | Some(Value::Null) => None,
            Some(Value::String(value)) => parse_application_type(Some(value)),
            Some(_) => {
                return Err(ValidationError::UnprocessableEntity(
                    "Application type must be a string".to_string(),
                ));
            }
        };
        validate_application_type(application_type.as_deref())?;

        Ok(Self {
            message,
            dimensions,
            application_type,
            extra: strip_reserved(log),
        })
    }

    /// Combines the entry with request level dimensions, the entry's own
    /// values winning on conflict.
    pub fn into_log(self, global_dimensions: &Dimensions) -> LogObject {
        let mut dimensions = global_dimensions.clone();
        if let Some(own) = self.dimensions {
            dimensions.extend(own);
        }
        LogObject {
            message: self.message,
            dimensions,
            application_type: self.application_type,
            truncated: None,
            extra: self.extra,
        }
    }
}

/// Builds validated log objects and wraps them into envelopes.
#[derive(Clone, Debug, Default)]
pub struct EnvelopeBuilder {
    region: Option<String>,
}

impl EnvelopeBuilder {
    pub fn new(region: Option<String>) -> Self {
        Self { region }
    }

    /// Builds a log object from a raw request payload.
    ///
    /// JSON payloads must be an object carrying a `message`. Plain text
    /// payloads become the message as a whole.
    pub fn build_log(
        &self,
        application_type: Option<&str>,
        dimensions: DimensionsSource<'_>,
        payload: &[u8],
        content_type: &str,
    ) -> Result<LogObject, ValidationError> {
        let mut log = match content_type {
            JSON_CONTENT_TYPE => match serde_json::from_slice(payload) {
                Ok(Value::Object(log)) => log,
                Ok(_) => {
                    return Err(ValidationError::UnprocessableEntity(
                        "Log payload must be a JSON object".to_string(),
                    ));
                }
                Err(e) => return Err(ValidationError::MalformedBody(e.to_string())),
            },
            TEXT_CONTENT_TYPE => {
                let text = std::str::from_utf8(payload)
                    .map_err(|e| ValidationError::MalformedBody(e.to_string()))?;
                let mut log = Map::new();
                log.insert("message".to_string(), Value::String(text.to_string()));
                log
            }
            other => {
                return Err(ValidationError::UnsupportedMediaType(
                    other.to_string(),
                    [JSON_CONTENT_TYPE, TEXT_CONTENT_TYPE].join(", "),
                ));
            }
        };

        let application_type = parse_application_type(application_type);
        validate_application_type(application_type.as_deref())?;

        let dimensions = match dimensions {
            DimensionsSource::Header(None) => Dimensions::new(),
            DimensionsSource::Header(Some(header)) => parse_dimensions(header)?,
            DimensionsSource::Mapping(dimensions) => dimensions,
        };
        validate_dimension_map(&dimensions)?;

        let message = take_message(&mut log)?;

        Ok(LogObject {
            message,
            dimensions,
            application_type,
            truncated: None,
            extra: strip_reserved(log),
        })
    }

    /// Wraps a log with the tenant and server metadata.
    pub fn build_envelope(
        &self,
        log: LogObject,
        tenant_id: Option<&str>,
    ) -> Result<Envelope, EnvelopeError> {
        if log.message.is_empty() {
            return Err(EnvelopeError::MissingLog);
        }
        let tenant_id = tenant_id
            .filter(|tenant| !tenant.is_empty())
            .ok_or(EnvelopeError::MissingTenant)?;

        let creation_time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64();

        Ok(Envelope {
            log,
            creation_time,
            meta: Meta {
                tenant_id: tenant_id.to_string(),
                region: self.region.clone(),
            },
        })
    }
}
