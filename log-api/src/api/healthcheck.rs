use async_trait::async_trait;
use hyper::body::Bytes;
use hyper::{Method, Request, Response, StatusCode};
use serde::Serialize;
use std::sync::Arc;

use crate::api::utils::{json_response, status_response};
use crate::errors::LogApiError;
use crate::handler::{Handler, HandlerBody};
use crate::queue::MessageQueuePublisher;

const HEALTHY: &str = "OK";

#[derive(Serialize)]
struct HealthReport {
    kafka: String,
}

/// `HEAD` answers 204 without touching the queue. `GET` reports queue health.
pub struct HealthcheckHandler {
    queue: Arc<dyn MessageQueuePublisher>,
}

impl HealthcheckHandler {
    pub fn new(queue: Arc<dyn MessageQueuePublisher>) -> Self {
        Self { queue }
    }
}

#[async_trait]
impl Handler for HealthcheckHandler {
    fn name(&self) -> &'static str {
        "healthcheck"
    }

    async fn handle(&self, request: Request<HandlerBody>) -> Result<Response<Bytes>, LogApiError> {
        match *request.method() {
            Method::HEAD => Ok(status_response(StatusCode::NO_CONTENT)),
            Method::GET => match self.queue.health_check().await {
                Ok(()) => json_response(
                    StatusCode::OK,
                    &HealthReport {
                        kafka: HEALTHY.to_string(),
                    },
                ),
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        queue = self.queue.name(),
                        "queue health check failed"
                    );
                    json_response(
                        StatusCode::SERVICE_UNAVAILABLE,
                        &HealthReport {
                            kafka: e.to_string(),
                        },
                    )
                }
            },
            _ => Ok(status_response(StatusCode::METHOD_NOT_ALLOWED)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::MemoryQueue;
    use crate::testutils::request;
    use serde_json::{Value, json};

    #[tokio::test]
    async fn test_head_skips_queue() {
        let queue = Arc::new(MemoryQueue::new());
        queue.set_healthy(false);
        let handler = HealthcheckHandler::new(queue);

        let req = request("HEAD", "/healthcheck", &[], "");
        let response = handler.handle(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(response.body().is_empty());
    }

    #[tokio::test]
    async fn test_get_reports_queue_health() {
        let queue = Arc::new(MemoryQueue::new());
        let handler = HealthcheckHandler::new(queue.clone());

        let req = request("GET", "/healthcheck", &[], "");
        let response = handler.handle(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body, json!({"kafka": "OK"}));

        queue.set_healthy(false);
        let req = request("GET", "/healthcheck", &[], "");
        let response = handler.handle(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body: Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(
            body,
            json!({"kafka": "Message queue unavailable: memory queue is unhealthy"})
        );
    }

    #[tokio::test]
    async fn test_other_methods() {
        let handler = HealthcheckHandler::new(Arc::new(MemoryQueue::new()));
        let req = request("POST", "/healthcheck", &[], "");
        let response = handler.handle(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
