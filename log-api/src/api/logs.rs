use async_trait::async_trait;
use hyper::body::Bytes;
use hyper::{Request, Response, StatusCode};
use std::sync::Arc;
use std::time::Instant;

use crate::adapter::{RequestAdapter, RequestContext};
use crate::api::utils::{read_body, status_response};
use crate::bulk::{BulkProcessor, BulkRequest, ProcessResult};
use crate::config::ServiceConfig;
use crate::envelope::DimensionsSource;
use crate::errors::LogApiError;
use crate::handler::{Handler, HandlerBody};
use crate::metrics_defs::{LOGS_BULKS_REJECTED, LOGS_PROCESSING_TIME, LOGS_REJECTED, LOGS_SIZE};
use crate::validation::ValidationError;
use shared::{counter, histogram};

/// Accepts logs and publishes them, answering 204 once the queue has them.
///
/// The same handler serves both request families. The adapter decides where
/// dimensions come from and which content types are allowed.
pub struct LogsHandler {
    adapter: RequestAdapter,
    service: Arc<ServiceConfig>,
    processor: Arc<BulkProcessor>,
}

impl LogsHandler {
    pub fn new(
        adapter: RequestAdapter,
        service: Arc<ServiceConfig>,
        processor: Arc<BulkProcessor>,
    ) -> Self {
        Self {
            adapter,
            service,
            processor,
        }
    }

    async fn single(
        &self,
        ctx: &RequestContext,
        payload: Bytes,
    ) -> Result<ProcessResult, LogApiError> {
        let log = self
            .processor
            .builder()
            .build_log(
                ctx.application_type.as_deref(),
                DimensionsSource::Header(ctx.dimensions.as_deref()),
                &payload,
                &ctx.content_type,
            )
            .inspect_err(|_| counter!(LOGS_REJECTED).increment(1))?;

        self.processor
            .process_single(log, ctx.effective_tenant())
            .await
    }

    async fn bulk(
        &self,
        ctx: &RequestContext,
        payload: Bytes,
    ) -> Result<ProcessResult, LogApiError> {
        let request = serde_json::from_slice(&payload)
            .map_err(|e| ValidationError::MalformedBody(e.to_string()))
            .and_then(BulkRequest::from_value)
            .inspect_err(|_| counter!(LOGS_BULKS_REJECTED).increment(1))?;

        self.processor
            .process(request.logs, &request.dimensions, ctx.effective_tenant())
            .await
    }
}

#[async_trait]
impl Handler for LogsHandler {
    fn name(&self) -> &'static str {
        match self.adapter {
            RequestAdapter::HeaderDimensions => "single_log",
            RequestAdapter::BodyDimensions => "bulk_logs",
        }
    }

    async fn handle(&self, request: Request<HandlerBody>) -> Result<Response<Bytes>, LogApiError> {
        let start = Instant::now();
        let (parts, body) = request.into_parts();

        let ctx = self
            .adapter
            .context(&parts, &self.service)
            .inspect_err(|_| {
                if self.adapter == RequestAdapter::BodyDimensions {
                    counter!(LOGS_BULKS_REJECTED).increment(1);
                } else {
                    counter!(LOGS_REJECTED).increment(1);
                }
            })?;
        let payload = read_body(body, self.service.max_log_size).await?;
        histogram!(LOGS_SIZE).record(payload.len() as f64);

        let result = match self.adapter {
            RequestAdapter::HeaderDimensions => self.single(&ctx, payload).await?,
            RequestAdapter::BodyDimensions => self.bulk(&ctx, payload).await?,
        };
        histogram!(LOGS_PROCESSING_TIME).record(start.elapsed().as_secs_f64());

        tracing::debug!(
            handler = self.name(),
            tenant = ctx.effective_tenant(),
            accepted = result.accepted,
            rejected = result.rejected,
            bytes = result.total_bytes,
            "logs processed"
        );

        Ok(status_response(StatusCode::NO_CONTENT))
    }
}
