use crate::errors::LogApiError;
use async_trait::async_trait;
use http_body_util::combinators::UnsyncBoxBody;
use hyper::body::Bytes;
use hyper::{Request, Response};

/// Request body as seen by handlers
pub type HandlerBody = UnsyncBoxBody<Bytes, LogApiError>;

/// Endpoint logic behind a route.
///
/// Handlers get the body unread, so header checks can run before any
/// payload is buffered. Errors are turned into responses by the router.
#[async_trait]
pub trait Handler: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle(&self, request: Request<HandlerBody>) -> Result<Response<Bytes>, LogApiError>;
}
