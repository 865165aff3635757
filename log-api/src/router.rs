use crate::adapter::RequestAdapter;
use crate::api::healthcheck::HealthcheckHandler;
use crate::api::logs::LogsHandler;
use crate::api::versions::VersionsHandler;
use crate::bulk::BulkProcessor;
use crate::config::{Config, HandlerAction, Route};
use crate::errors::LogApiError;
use crate::handler::Handler;
use crate::metrics_defs::{REQUEST_DURATION, REQUESTS_INFLIGHT};
use crate::queue::MessageQueuePublisher;
use http_body_util::BodyExt;
use hyper::body::{Body, Bytes};
use hyper::{Request, Response, StatusCode};
use shared::{gauge, histogram};
use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Instant;

/// Counts a request as in flight until dropped, including when the client
/// goes away and the request future is abandoned.
struct InflightGuard;

impl InflightGuard {
    fn new() -> Self {
        gauge!(REQUESTS_INFLIGHT).increment(1.0);
        Self
    }
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        gauge!(REQUESTS_INFLIGHT).decrement(1.0);
    }
}

/// Router that matches incoming requests against configured routes
#[derive(Clone)]
pub struct Router {
    routes: Arc<Vec<Route>>,
    handlers: Arc<HashMap<HandlerAction, Arc<dyn Handler>>>,
}

impl Router {
    /// Creates a new router with the given routes and handlers
    pub fn new(routes: Vec<Route>, handlers: HashMap<HandlerAction, Arc<dyn Handler>>) -> Self {
        Self {
            routes: Arc::new(routes),
            handlers: Arc::new(handlers),
        }
    }

    /// Wires every handler to a shared processor and queue
    pub fn from_config(config: &Config, queue: Arc<dyn MessageQueuePublisher>) -> Self {
        let service = Arc::new(config.service.clone());
        let processor = Arc::new(BulkProcessor::new(config, queue.clone()));

        let handlers: HashMap<HandlerAction, Arc<dyn Handler>> = HashMap::from([
            (
                HandlerAction::SingleLog,
                Arc::new(LogsHandler::new(
                    RequestAdapter::HeaderDimensions,
                    service.clone(),
                    processor.clone(),
                )) as Arc<dyn Handler>,
            ),
            (
                HandlerAction::BulkLogs,
                Arc::new(LogsHandler::new(
                    RequestAdapter::BodyDimensions,
                    service,
                    processor,
                )) as Arc<dyn Handler>,
            ),
            (
                HandlerAction::Healthcheck,
                Arc::new(HealthcheckHandler::new(queue)) as Arc<dyn Handler>,
            ),
            (
                HandlerAction::Versions,
                Arc::new(VersionsHandler) as Arc<dyn Handler>,
            ),
        ]);

        Self::new(config.routes.clone(), handlers)
    }

    /// Routes an incoming request to the appropriate handler. Handler errors
    /// are rendered as JSON error responses.
    pub async fn route<B>(&self, req: Request<B>) -> Response<Bytes>
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Display,
    {
        let Some(handler) = self
            .find_matching_route(&req)
            .and_then(|action| self.handlers.get(action))
        else {
            tracing::warn!(
                method = %req.method(),
                path = %req.uri().path(),
                "No route matched"
            );
            return shared::http::make_error_response(StatusCode::NOT_FOUND);
        };

        let start = Instant::now();
        let inflight = InflightGuard::new();

        let req = req.map(|body| {
            body.map_err(|e| LogApiError::RequestBodyError(e.to_string()))
                .boxed_unsync()
        });
        let response = match handler.handle(req).await {
            Ok(response) => response,
            Err(e) => {
                let status = e.status();
                if status.is_server_error() {
                    tracing::error!(handler = handler.name(), error = %e, "request failed");
                } else {
                    tracing::debug!(handler = handler.name(), error = %e, "request rejected");
                }
                e.into_response()
            }
        };

        drop(inflight);
        histogram!(
            REQUEST_DURATION,
            "handler" => handler.name(),
            "status" => response.status().as_str().to_owned()
        )
        .record(start.elapsed().as_secs_f64());

        response
    }

    /// Finds the first route that matches the incoming request
    fn find_matching_route<B>(&self, req: &Request<B>) -> Option<&HandlerAction> {
        self.routes
            .iter()
            .find(|route| self.matches_route(req, route))
            .map(|route| &route.action)
    }

    /// Checks if a request matches a route's criteria
    fn matches_route<B>(&self, req: &Request<B>, route: &Route) -> bool {
        // Match host if specified
        if let Some(expected_host) = &route.r#match.host {
            let req_host = req
                .headers()
                .get(hyper::header::HOST)
                .and_then(|h| h.to_str().ok());

            match req_host {
                Some(host) => {
                    // Strip port if present for comparison
                    let host_without_port = host.split(':').next().unwrap_or(host);
                    if host_without_port != expected_host {
                        return false;
                    }
                }
                None => return false,
            }
        }

        if let Some(expected_path) = &route.r#match.path
            && req.uri().path() != expected_path
        {
            return false;
        }

        if let Some(prefix) = &route.r#match.path_prefix
            && !req.uri().path().starts_with(prefix.as_str())
        {
            return false;
        }

        if let Some(expected_method) = &route.r#match.method
            && expected_method != req.method()
        {
            return false;
        }

        true
    }
}
