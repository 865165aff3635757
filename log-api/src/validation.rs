//! Request and payload validation.
//!
//! Every check returns a [`ValidationError`] that knows the HTTP status it
//! maps to, so handlers can propagate failures with `?`.

use http::StatusCode;
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;
use thiserror::Error;

use crate::model::Dimensions;

pub const APPLICATION_TYPE_MAX_LENGTH: usize = 255;
pub const DIMENSION_NAME_MAX_LENGTH: usize = 255;
pub const DIMENSION_VALUE_MAX_LENGTH: usize = 255;

static APPLICATION_TYPE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_.\-]+$").expect("application type pattern is valid")
});

static DIMENSION_NAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^[^><={}(), '";&]+$"#).expect("dimension name pattern is valid")
});

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("{0}")]
    UnprocessableEntity(String),

    #[error("Dimensions {0} must be a dictionary")]
    DimensionsNotMapping(String),

    #[error("Dimension value for {0} must be a string")]
    DimensionValueNotString(String),

    #[error("Malformed request body: {0}")]
    MalformedBody(String),

    #[error("Content-Length header is required")]
    LengthRequired,

    #[error("Log payload size {size} exceeds maximum allowed size {max}")]
    TooLarge { size: u64, max: u64 },

    #[error("Content-Type header is required")]
    MissingContentType,

    #[error("{0} is not supported, supported are {1}")]
    UnsupportedMediaType(String, String),

    #[error("Projects {caller} cannot POST cross tenant logs")]
    CrossTenantForbidden { caller: String },

    #[error("Envelope size {size} exceeds maximum allowed size {max}")]
    EnvelopeTooLarge { size: usize, max: usize },
}

impl ValidationError {
    pub fn status(&self) -> StatusCode {
        match self {
            ValidationError::UnprocessableEntity(_)
            | ValidationError::DimensionsNotMapping(_)
            | ValidationError::DimensionValueNotString(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ValidationError::MalformedBody(_) | ValidationError::MissingContentType => {
                StatusCode::BAD_REQUEST
            }
            ValidationError::LengthRequired => StatusCode::LENGTH_REQUIRED,
            ValidationError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ValidationError::UnsupportedMediaType(..) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ValidationError::CrossTenantForbidden { .. } => StatusCode::FORBIDDEN,
            // Raised after truncation could not shrink the message enough.
            ValidationError::EnvelopeTooLarge { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn unprocessable(msg: impl Into<String>) -> ValidationError {
    ValidationError::UnprocessableEntity(msg.into())
}

/// Validates an already trimmed application type. `None` means absent and is accepted.
pub fn validate_application_type(application_type: Option<&str>) -> Result<(), ValidationError> {
    let Some(application_type) = application_type else {
        return Ok(());
    };

    if application_type.chars().count() > APPLICATION_TYPE_MAX_LENGTH {
        return Err(unprocessable(format!(
            "Application type {application_type} must be {APPLICATION_TYPE_MAX_LENGTH} characters or less"
        )));
    }
    if !APPLICATION_TYPE_PATTERN.is_match(application_type) {
        return Err(unprocessable(format!(
            "Application type {application_type} may only contain: \"a-z A-Z 0-9 _ - .\""
        )));
    }
    Ok(())
}

fn validate_dimension_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(unprocessable("Dimension name cannot be empty"));
    }
    if name.chars().count() > DIMENSION_NAME_MAX_LENGTH {
        return Err(unprocessable(format!(
            "Dimension name {name} must be {DIMENSION_NAME_MAX_LENGTH} characters or less"
        )));
    }
    if name.starts_with('_') {
        return Err(unprocessable(format!(
            "Dimension name {name} cannot start with underscore (_)"
        )));
    }
    if !DIMENSION_NAME_PATTERN.is_match(name) {
        return Err(unprocessable(format!(
            "Dimension name {name} may not contain: > < = {{ }} ( ) , ' \" ; & or spaces"
        )));
    }
    Ok(())
}

fn validate_dimension_value(name: &str, value: &str) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(unprocessable(format!("Dimension value for {name} cannot be empty")));
    }
    if value.chars().count() > DIMENSION_VALUE_MAX_LENGTH {
        return Err(unprocessable(format!(
            "Dimension value {value} must be {DIMENSION_VALUE_MAX_LENGTH} characters or less"
        )));
    }
    Ok(())
}

/// Validates every name/value pair of an already typed dimension map.
pub fn validate_dimension_map(dimensions: &Dimensions) -> Result<(), ValidationError> {
    for (name, value) in dimensions {
        validate_dimension_name(name)?;
        validate_dimension_value(name, value)?;
    }
    Ok(())
}

/// Validates untyped dimensions taken from a JSON body and converts them.
pub fn validate_dimensions(value: &Value) -> Result<Dimensions, ValidationError> {
    let Value::Object(map) = value else {
        return Err(ValidationError::DimensionsNotMapping(value.to_string()));
    };

    let mut dimensions = Dimensions::with_capacity(map.len());
    for (name, value) in map {
        validate_dimension_name(name)?;
        let Value::String(value) = value else {
            return Err(ValidationError::DimensionValueNotString(name.clone()));
        };
        validate_dimension_value(name, value)?;
        dimensions.insert(name.clone(), value.clone());
    }
    Ok(dimensions)
}

/// Checks that a declared content type is one of `allowed`, ignoring
/// parameters such as `charset`. Returns the bare media type.
pub fn validate_content_type(
    declared: Option<&str>,
    allowed: &[&str],
) -> Result<String, ValidationError> {
    let essence = declared
        .and_then(|value| value.split(';').next())
        .map(|value| value.trim().to_ascii_lowercase())
        .filter(|value| !value.is_empty())
        .ok_or(ValidationError::MissingContentType)?;

    if !allowed.contains(&essence.as_str()) {
        return Err(ValidationError::UnsupportedMediaType(essence, allowed.join(", ")));
    }
    Ok(essence)
}

/// Checks the declared `Content-Length` against the configured limit.
/// A payload exactly at the limit is rejected.
pub fn validate_payload_size(declared: Option<u64>, max: u64) -> Result<u64, ValidationError> {
    let size = declared.ok_or(ValidationError::LengthRequired)?;
    if size >= max {
        return Err(ValidationError::TooLarge { size, max });
    }
    Ok(size)
}

/// Final size check on an envelope after truncation, overhead included.
pub fn validate_envelope_size(size: usize, max: usize) -> Result<(), ValidationError> {
    if size >= max {
        return Err(ValidationError::EnvelopeTooLarge { size, max });
    }
    Ok(())
}

pub fn validate_log_message(log: &Map<String, Value>) -> Result<(), ValidationError> {
    match log.get("message") {
        None | Some(Value::Null) => Err(unprocessable("Log property should have message")),
        Some(_) => Ok(()),
    }
}

/// A caller may only name another tenant when it holds a delegate role.
pub fn validate_cross_tenant(
    tenant_id: Option<&str>,
    cross_tenant_id: Option<&str>,
    is_delegate: bool,
) -> Result<(), ValidationError> {
    if cross_tenant_id.is_some() && !is_delegate {
        return Err(ValidationError::CrossTenantForbidden {
            caller: tenant_id.unwrap_or_default().to_string(),
        });
    }
    Ok(())
}

/// Whether a comma separated role list contains any of `delegate_roles`.
pub fn is_delegate(roles: Option<&str>, delegate_roles: &[String]) -> bool {
    roles.is_some_and(|roles| {
        roles
            .split(',')
            .map(str::trim)
            .any(|role| delegate_roles.iter().any(|delegate| delegate == role))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_application_type() {
        assert!(validate_application_type(None).is_ok());
        assert!(validate_application_type(Some("apache-2.4_x")).is_ok());

        let err = validate_application_type(Some(&"a".repeat(300))).unwrap_err();
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(err.to_string().contains("255 characters or less"));

        assert!(validate_application_type(Some(&"a".repeat(255))).is_ok());
        assert!(validate_application_type(Some("white space")).is_err());
        assert!(validate_application_type(Some("semi;colon")).is_err());
    }

    #[test]
    fn test_dimensions_must_be_mapping() {
        for value in [json!("notamap"), json!(null), json!(12), json!(["a", "b"])] {
            let err = validate_dimensions(&value).unwrap_err();
            assert!(matches!(err, ValidationError::DimensionsNotMapping(_)));
            assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
        }
    }

    #[test]
    fn test_dimension_rules() {
        let dims = validate_dimensions(&json!({"hostname": "h1", "service": "api"})).unwrap();
        assert_eq!(dims.get("hostname").map(String::as_str), Some("h1"));
        assert_eq!(dims.keys().collect::<Vec<_>>(), vec!["hostname", "service"]);

        let err = validate_dimensions(&json!({"_bad": "x"})).unwrap_err();
        assert!(err.to_string().contains("cannot start with underscore"));

        assert!(validate_dimensions(&json!({"": "x"})).is_err());
        assert!(validate_dimensions(&json!({"a b": "x"})).is_err());
        assert!(validate_dimensions(&json!({"a=b": "x"})).is_err());
        assert!(validate_dimensions(&json!({"a": ""})).is_err());
        assert!(validate_dimensions(&json!({ ("a".repeat(256)): "x" })).is_err());
        assert!(validate_dimensions(&json!({"a": "v".repeat(256)})).is_err());
        assert!(validate_dimensions(&json!({"a": "v".repeat(255)})).is_ok());

        let err = validate_dimensions(&json!({"port": 8080})).unwrap_err();
        assert!(matches!(err, ValidationError::DimensionValueNotString(name) if name == "port"));
    }

    #[test]
    fn test_content_type() {
        let allowed = ["application/json", "text/plain"];
        assert_eq!(
            validate_content_type(Some("application/json"), &allowed).unwrap(),
            "application/json"
        );
        assert_eq!(
            validate_content_type(Some("Text/Plain; charset=utf-8"), &allowed).unwrap(),
            "text/plain"
        );

        let err = validate_content_type(None, &allowed).unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let err = validate_content_type(Some("application/xml"), &allowed).unwrap_err();
        assert!(matches!(err, ValidationError::UnsupportedMediaType(..)));
    }

    #[test]
    fn test_payload_size() {
        assert_eq!(validate_payload_size(Some(99), 100).unwrap(), 99);

        let err = validate_payload_size(Some(100), 100).unwrap_err();
        assert_eq!(err.status(), StatusCode::PAYLOAD_TOO_LARGE);

        let err = validate_payload_size(None, 100).unwrap_err();
        assert_eq!(err.status(), StatusCode::LENGTH_REQUIRED);
    }

    #[test]
    fn test_envelope_size() {
        assert!(validate_envelope_size(99, 100).is_ok());
        let err = validate_envelope_size(100, 100).unwrap_err();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_log_message_required() {
        let log = json!({"message": "x"});
        assert!(validate_log_message(log.as_object().unwrap()).is_ok());

        let log = json!({"msg": "x"});
        assert!(validate_log_message(log.as_object().unwrap()).is_err());

        let log = json!({"message": null});
        assert!(validate_log_message(log.as_object().unwrap()).is_err());
    }

    #[test]
    fn test_cross_tenant() {
        assert!(validate_cross_tenant(Some("t1"), None, false).is_ok());
        assert!(validate_cross_tenant(Some("t1"), Some("t2"), true).is_ok());

        let err = validate_cross_tenant(Some("t1"), Some("t2"), false).unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_delegate_roles() {
        let delegate_roles = vec!["monitoring-delegate".to_string()];
        assert!(is_delegate(Some("admin, monitoring-delegate"), &delegate_roles));
        assert!(is_delegate(Some("monitoring-delegate"), &delegate_roles));
        assert!(!is_delegate(Some("admin,member"), &delegate_roles));
        assert!(!is_delegate(Some("monitoring-delegate-x"), &delegate_roles));
        assert!(!is_delegate(None, &delegate_roles));
    }
}
