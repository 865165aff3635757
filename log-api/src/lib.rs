pub mod adapter;
pub mod api;
pub mod bulk;
pub mod config;
pub mod envelope;
pub mod errors;
pub mod handler;
pub mod key;
pub mod metrics_defs;
pub mod model;
pub mod publisher;
pub mod queue;
pub mod router;
pub mod truncator;
pub mod validation;

#[cfg(test)]
mod testutils;

use crate::errors::LogApiError;
use crate::router::Router;
use http_body_util::{BodyExt, Full, combinators::BoxBody};
use hyper::body::Bytes;
use hyper::body::Incoming;
use hyper::service::Service;
use hyper::{Request, Response};
use shared::admin_service::AdminService;
use shared::http::run_http_service;
use std::pin::Pin;

/// Serves the log API and its admin listener until either fails.
pub async fn run(config: config::Config) -> Result<(), LogApiError> {
    config.validate()?;

    let queue = queue::from_config(&config.queue)?;
    tracing::info!(
        queue = queue.name(),
        topics = ?config.log_publisher.topics,
        "starting log api"
    );

    let router = Router::from_config(&config, queue.clone());
    let api_service = LogApiService { router };
    let admin_service = AdminService::<_, LogApiError>::new(move || {
        let queue = queue.clone();
        async move { queue.health_check().await.is_ok() }
    });

    let api_task = run_http_service(&config.listener.host, config.listener.port, api_service);
    let admin_task = run_http_service(
        &config.admin_listener.host,
        config.admin_listener.port,
        admin_service,
    );

    tokio::try_join!(api_task, admin_task)?;
    Ok(())
}

struct LogApiService {
    router: Router,
}

impl Service<Request<Incoming>> for LogApiService {
    type Response = Response<BoxBody<Bytes, Self::Error>>;
    type Error = LogApiError;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let router = self.router.clone();
        Box::pin(async move {
            let response = router.route(req).await;
            Ok(response.map(|body| Full::new(body).map_err(|e| match e {}).boxed()))
        })
    }
}
