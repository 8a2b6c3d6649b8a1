//! Metrics collection and export module
//!
//! Thin recording functions over the `metrics` crate facade, exported in Prometheus text
//! format. With the `metrics` feature disabled every function is a no-op and `/metrics`
//! answers 404.

pub mod exporters;
pub mod middleware;

pub use exporters::{install_recorder, metrics_handler};
pub use middleware::metrics_middleware;

#[cfg(feature = "metrics")]
use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// One classified upstream attempt.
pub fn record_dispatch(outcome: &'static str) {
    #[cfg(feature = "metrics")]
    counter!("key_broker_dispatch_total", "outcome" => outcome).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = outcome;
}

/// A logical request answered by the fallback path, labelled by producer.
pub fn record_fallback(source: &'static str) {
    #[cfg(feature = "metrics")]
    counter!("key_broker_fallback_total", "source" => source).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = source;
}

/// Final result of a logical request: `success`, `degraded`, `failed` or `cancelled`.
pub fn record_request(result: &'static str, duration: Duration) {
    #[cfg(feature = "metrics")]
    {
        counter!("key_broker_requests_total", "result" => result).increment(1);
        histogram!("key_broker_request_duration_seconds").record(duration.as_secs_f64());
    }
    #[cfg(not(feature = "metrics"))]
    let _ = (result, duration);
}

pub fn record_key_switch() {
    #[cfg(feature = "metrics")]
    counter!("key_broker_key_switches_total").increment(1);
}

pub fn set_available_keys(available: usize, total: usize) {
    #[cfg(feature = "metrics")]
    {
        gauge!("key_broker_keys_available").set(available as f64);
        gauge!("key_broker_keys_total").set(total as f64);
    }
    #[cfg(not(feature = "metrics"))]
    let _ = (available, total);
}

/// HTTP-level request, recorded by [`metrics_middleware`].
pub fn record_http_request(method: String, path: String, status: u16, duration: Duration) {
    #[cfg(feature = "metrics")]
    {
        counter!("key_broker_http_requests_total", "method" => method.clone(), "path" => path.clone(), "status" => status.to_string()).increment(1);
        histogram!("key_broker_http_request_duration_seconds", "method" => method, "path" => path)
            .record(duration.as_secs_f64());
    }
    #[cfg(not(feature = "metrics"))]
    let _ = (method, path, status, duration);
}
