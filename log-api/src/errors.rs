use http::header::{CONTENT_TYPE, HeaderValue, RETRY_AFTER};
use hyper::body::Bytes;
use hyper::{Response, StatusCode};
use serde::Serialize;
use thiserror::Error;

use crate::config::ConfigError;
use crate::envelope::EnvelopeError;
use crate::publisher::PublishError;
use crate::queue::QueueError;
use crate::validation::ValidationError;

/// Seconds a client should wait before retrying when the queue is down
pub const RETRY_AFTER_SECS: u64 = 60;

/// Result type alias for log-api operations
pub type Result<T, E = LogApiError> = std::result::Result<T, E>;

/// Errors that can occur while handling log-api requests
#[derive(Error, Debug)]
pub enum LogApiError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error("Failed to read request body: {0}")]
    RequestBodyError(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to set up message queue: {0}")]
    Queue(#[from] QueueError),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    title: &'a str,
    description: String,
}

impl LogApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            LogApiError::Validation(e) => e.status(),
            LogApiError::Publish(PublishError::Unavailable(_)) | LogApiError::Queue(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            LogApiError::RequestBodyError(_) => StatusCode::BAD_REQUEST,
            LogApiError::Envelope(_)
            | LogApiError::Publish(PublishError::InvalidMessage(_))
            | LogApiError::Serialization(_)
            | LogApiError::Config(_)
            | LogApiError::InternalError(_)
            | LogApiError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// JSON error response with a `title` and `description`.
    pub fn into_response(self) -> Response<Bytes> {
        let status = self.status();
        let body = ErrorBody {
            title: status.canonical_reason().unwrap_or("Error"),
            description: self.to_string(),
        };

        let Ok(body) = serde_json::to_vec(&body) else {
            return shared::http::make_error_response(status);
        };

        let mut response = Response::new(Bytes::from(body));
        *response.status_mut() = status;
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if status == StatusCode::SERVICE_UNAVAILABLE {
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(RETRY_AFTER_SECS));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    #[test]
    fn test_error_response_body() {
        let response =
            LogApiError::from(ValidationError::LengthRequired).into_response();
        assert_eq!(response.status(), StatusCode::LENGTH_REQUIRED);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "application/json"
        );
        let body: Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(
            body,
            json!({
                "title": "Length Required",
                "description": "Content-Length header is required",
            })
        );
    }

    #[test]
    fn test_unavailable_sets_retry_after() {
        let err = LogApiError::from(PublishError::Unavailable(QueueError::Unavailable(
            "down".to_string(),
        )));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers().get(RETRY_AFTER).unwrap(), "60");
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            LogApiError::from(EnvelopeError::MissingTenant).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            LogApiError::from(PublishError::InvalidMessage("empty".to_string())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            LogApiError::from(ValidationError::CrossTenantForbidden {
                caller: "t1".to_string()
            })
            .status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            LogApiError::RequestBodyError("reset".to_string()).status(),
            StatusCode::BAD_REQUEST
        );
    }
}
