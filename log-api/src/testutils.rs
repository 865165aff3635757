use crate::bulk::BulkProcessor;
use crate::config::Config;
use crate::handler::HandlerBody;
use crate::queue::MemoryQueue;
use http_body_util::{BodyExt, Full};
use hyper::Request;
use hyper::body::Bytes;
use std::sync::Arc;

const TEST_CONFIG: &str = r#"
listener:
    host: "127.0.0.1"
    port: 5607
admin_listener:
    host: "127.0.0.1"
    port: 5608
service:
    region: test
log_publisher:
    topics: [logs]
    truncation:
        timestamp_key_size: 13
"#;

pub fn test_config() -> Config {
    serde_yaml::from_str(TEST_CONFIG).unwrap()
}

pub fn memory_processor(config: Config) -> (Arc<MemoryQueue>, BulkProcessor) {
    let queue = Arc::new(MemoryQueue::new());
    let processor = BulkProcessor::new(&config, queue.clone());
    (queue, processor)
}

/// Builds a request with a `content-length` matching `body`.
pub fn request(
    method: &str,
    uri: &str,
    headers: &[(&str, &str)],
    body: &str,
) -> Request<HandlerBody> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-length", body.len());
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    builder
        .body(
            Full::new(Bytes::from(body.to_string()))
                .map_err(|e| match e {})
                .boxed_unsync(),
        )
        .unwrap()
}
