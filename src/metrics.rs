use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Gauge, Histogram, register_counter, register_counter_vec,
    register_gauge, register_histogram,
};

lazy_static! {
    pub static ref REQUEST_TOTAL: Counter =
        register_counter!("gateway_requests_total", "Total number of proxied requests").unwrap();
    pub static ref RATE_LIMITED_TOTAL: CounterVec = register_counter_vec!(
        "gateway_rate_limited_total",
        "Requests rejected with 429, by endpoint class",
        &["class"]
    )
    .unwrap();
    pub static ref UPSTREAM_FAILURES: Counter = register_counter!(
        "gateway_upstream_failures_total",
        "Upstream calls that failed at the transport level"
    )
    .unwrap();
    pub static ref UPSTREAM_LATENCY: Histogram = register_histogram!(
        "gateway_upstream_latency_seconds",
        "Upstream latency in seconds"
    )
    .unwrap();
    pub static ref TRACKED_IDENTIFIERS: Gauge = register_gauge!(
        "gateway_tracked_identifiers",
        "Identifiers currently held by the rate limiter"
    )
    .unwrap();
}
