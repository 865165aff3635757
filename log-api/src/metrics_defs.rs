use shared::metrics_defs::{MetricDef, MetricType};

pub const REQUEST_DURATION: MetricDef = MetricDef {
    name: "request.duration",
    metric_type: MetricType::Histogram,
    description: "Request duration in seconds. Tagged with status, handler.",
};

pub const REQUESTS_INFLIGHT: MetricDef = MetricDef {
    name: "requests.inflight",
    metric_type: MetricType::Gauge,
    description: "Number of requests currently being processed",
};

pub const LOGS_RECEIVED: MetricDef = MetricDef {
    name: "logs.in",
    metric_type: MetricType::Counter,
    description: "Logs accepted for publishing",
};

pub const LOGS_REJECTED: MetricDef = MetricDef {
    name: "logs.rejected",
    metric_type: MetricType::Counter,
    description: "Logs rejected during validation",
};

pub const LOGS_BULKS_REJECTED: MetricDef = MetricDef {
    name: "logs.bulks_rejected",
    metric_type: MetricType::Counter,
    description: "Bulk requests rejected as a whole",
};

pub const LOGS_SIZE: MetricDef = MetricDef {
    name: "logs.size",
    metric_type: MetricType::Histogram,
    description: "Request payload size in bytes",
};

pub const LOGS_PROCESSING_TIME: MetricDef = MetricDef {
    name: "logs.processing_time",
    metric_type: MetricType::Histogram,
    description: "Time spent validating and enveloping a request, in seconds",
};

pub const LOGS_PUBLISHED: MetricDef = MetricDef {
    name: "logs.published",
    metric_type: MetricType::Counter,
    description: "Envelopes handed to the queue. Counted once per topic.",
};

pub const LOGS_LOST: MetricDef = MetricDef {
    name: "logs.lost",
    metric_type: MetricType::Counter,
    description: "Envelopes the queue failed to accept",
};

pub const LOGS_PUBLISH_TIME: MetricDef = MetricDef {
    name: "logs.publish_time",
    metric_type: MetricType::Histogram,
    description: "Time spent publishing a batch to all topics, in seconds",
};

pub const LOGS_TRUNCATED: MetricDef = MetricDef {
    name: "logs.truncated",
    metric_type: MetricType::Histogram,
    description: "Bytes removed from messages that exceeded the queue size limit",
};

pub const ALL_METRICS: &[MetricDef] = &[
    REQUEST_DURATION,
    REQUESTS_INFLIGHT,
    LOGS_RECEIVED,
    LOGS_REJECTED,
    LOGS_BULKS_REJECTED,
    LOGS_SIZE,
    LOGS_PROCESSING_TIME,
    LOGS_PUBLISHED,
    LOGS_LOST,
    LOGS_PUBLISH_TIME,
    LOGS_TRUNCATED,
];
