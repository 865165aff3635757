use crate::errors::LogApiError;
use crate::handler::HandlerBody;
use crate::validation::ValidationError;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::Bytes;
use hyper::header::{CONTENT_TYPE, HeaderValue};
use hyper::{Response, StatusCode};
use serde::Serialize;

/// Buffers a request body, failing once more than `limit` bytes arrive.
pub async fn read_body(body: HandlerBody, limit: u64) -> Result<Bytes, LogApiError> {
    let limit = usize::try_from(limit).unwrap_or(usize::MAX);
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.is::<LengthLimitError>() => Err(ValidationError::TooLarge {
            size: limit as u64 + 1,
            max: limit as u64,
        }
        .into()),
        Err(e) => match e.downcast::<LogApiError>() {
            Ok(e) => Err(*e),
            Err(e) => Err(LogApiError::RequestBodyError(e.to_string())),
        },
    }
}

/// Serializes a value into a JSON response.
pub fn json_response<T: Serialize>(
    status: StatusCode,
    value: &T,
) -> Result<Response<Bytes>, LogApiError> {
    let body = serde_json::to_vec(value).map(Bytes::from)?;
    let mut response = Response::new(body);
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Ok(response)
}

pub fn status_response(status: StatusCode) -> Response<Bytes> {
    let mut response = Response::new(Bytes::new());
    *response.status_mut() = status;
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::Full;

    fn body(data: &'static str) -> HandlerBody {
        Full::new(Bytes::from(data))
            .map_err(|e| match e {})
            .boxed_unsync()
    }

    #[tokio::test]
    async fn test_read_body_within_limit() {
        let bytes = read_body(body("hello"), 5).await.unwrap();
        assert_eq!(bytes.as_ref(), b"hello");
    }

    #[tokio::test]
    async fn test_read_body_over_limit() {
        let err = read_body(body("hello world"), 5).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[test]
    fn test_json_response() {
        let response = json_response(StatusCode::OK, &serde_json::json!({"kafka": "OK"})).unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body().as_ref(), br#"{"kafka":"OK"}"#);
    }
}
