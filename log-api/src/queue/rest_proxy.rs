use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use http::StatusCode;
use http::header::{ACCEPT, CONTENT_TYPE};
use hyper::body::Bytes;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;
use url::Url;

use super::{MessageQueuePublisher, QueueError, backoff};

const BINARY_CONTENT_TYPE: &str = "application/vnd.kafka.binary.v2+json";
const ACCEPT_CONTENT_TYPE: &str = "application/vnd.kafka.v2+json";

#[derive(Serialize)]
struct ProduceRequest {
    records: Vec<ProduceRecord>,
}

#[derive(Serialize)]
struct ProduceRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    key: Option<String>,
    value: String,
}

#[derive(Deserialize)]
struct ProduceResponse {
    #[serde(default)]
    offsets: Vec<ProduceOffset>,
}

#[derive(Deserialize)]
struct ProduceOffset {
    #[serde(default)]
    error_code: Option<i64>,
    #[serde(default)]
    error: Option<String>,
}

/// Publishes through a Kafka REST proxy using the binary embedded format.
///
/// Connection attempts are retried with exponential backoff. A produce
/// request that reached the proxy is never retried.
pub struct RestProxyQueue {
    client: reqwest::Client,
    base_url: Url,
    max_retries: u32,
}

impl RestProxyQueue {
    pub fn new(base_url: Url, timeout: Duration, max_retries: u32) -> Result<Self, QueueError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            base_url,
            max_retries,
        })
    }

    fn url(&self, segments: &[&str]) -> Result<Url, QueueError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| QueueError::Unavailable(format!("invalid proxy url {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send_with_retries(
        &self,
        build: impl Fn() -> reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, QueueError> {
        let mut retries = 0;
        loop {
            match build().send().await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_connect() && retries < self.max_retries => {
                    let delay = backoff(retries);
                    tracing::warn!(
                        error = %e,
                        retries,
                        ?delay,
                        "failed to connect to the rest proxy, retrying"
                    );
                    sleep(delay).await;
                    retries += 1;
                }
                Err(e) if e.is_connect() || e.is_timeout() => {
                    return Err(QueueError::Unavailable(e.to_string()));
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

#[async_trait]
impl MessageQueuePublisher for RestProxyQueue {
    fn name(&self) -> &'static str {
        "rest_proxy"
    }

    async fn publish(
        &self,
        topic: &str,
        messages: &[Bytes],
        key: Option<&str>,
    ) -> Result<(), QueueError> {
        let key = key.map(|key| STANDARD.encode(key));
        let request = ProduceRequest {
            records: messages
                .iter()
                .map(|message| ProduceRecord {
                    key: key.clone(),
                    value: STANDARD.encode(message),
                })
                .collect(),
        };
        let body = Bytes::from(serde_json::to_vec(&request)?);
        let url = self.url(&["topics", topic])?;

        let response = self
            .send_with_retries(|| {
                self.client
                    .post(url.clone())
                    .header(CONTENT_TYPE, BINARY_CONTENT_TYPE)
                    .header(ACCEPT, ACCEPT_CONTENT_TYPE)
                    .body(body.clone())
            })
            .await?;

        let status = response.status();
        match status {
            s if s.is_success() => {}
            StatusCode::NOT_FOUND => {
                return Err(QueueError::LeaderNotAvailable(topic.to_string()));
            }
            StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT => {
                return Err(QueueError::Unavailable(format!("rest proxy responded with {status}")));
            }
            s if s.is_client_error() => {
                let detail = response.text().await.unwrap_or_default();
                return Err(QueueError::Rejected(format!("{status}: {detail}")));
            }
            _ => {
                return Err(QueueError::Unknown(format!("rest proxy responded with {status}")));
            }
        }

        let produced: ProduceResponse = response.json().await?;
        if let Some(failed) = produced
            .offsets
            .iter()
            .find(|offset| offset.error_code.is_some() || offset.error.is_some())
        {
            return Err(QueueError::Rejected(
                failed
                    .error
                    .clone()
                    .unwrap_or_else(|| format!("error code {:?}", failed.error_code)),
            ));
        }

        tracing::debug!(topic, count = messages.len(), "published to rest proxy");
        Ok(())
    }

    async fn health_check(&self) -> Result<(), QueueError> {
        let url = self.url(&["topics"])?;
        let response = self
            .client
            .get(url)
            .header(ACCEPT, ACCEPT_CONTENT_TYPE)
            .send()
            .await
            .map_err(|e| QueueError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(QueueError::Unavailable(format!(
                "rest proxy responded with {}",
                response.status()
            )));
        }
        Ok(())
    }
}
