//! Prometheus metrics for the prompt gateway.
//!
//! A single process-wide registry tracks HTTP traffic, moderation decisions,
//! stream outcomes and provider latency.

use prometheus::{
    register_gauge_vec, register_histogram_vec, register_int_counter_vec, GaugeVec, HistogramVec,
    IntCounterVec,
};
use std::sync::OnceLock;

/// Container for all application metrics.
pub struct Metrics {
    /// Total number of requests by method, endpoint and status
    pub request_count: IntCounterVec,

    /// Request duration histogram in seconds (time to first byte for streams)
    pub request_duration: HistogramVec,

    /// Number of currently active requests by endpoint
    pub active_requests: GaugeVec,

    /// Prompts refused by the content policy, by reason
    pub moderation_blocks: IntCounterVec,

    /// Terminal outcome of each pipeline run, by provider
    pub stream_outcomes: IntCounterVec,

    /// Events handed to the emitter, by event type
    pub events_emitted: IntCounterVec,

    /// Time spent inside a provider adapter, in seconds
    pub provider_latency: HistogramVec,
}

static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Initialize the metrics registry.
///
/// Safe to call more than once; later calls return the same instance.
///
/// ```no_run
/// use prompt_gateway::core::metrics::init_metrics;
///
/// let metrics = init_metrics();
/// metrics.request_count.with_label_values(&["GET", "/api/ping", "200"]).inc();
/// ```
pub fn init_metrics() -> &'static Metrics {
    METRICS.get_or_init(|| {
        let request_count = register_int_counter_vec!(
            "prompt_gateway_requests_total",
            "Total number of requests",
            &["method", "endpoint", "status_code"]
        )
        .expect("Failed to register request_count metric");

        let request_duration = register_histogram_vec!(
            "prompt_gateway_request_duration_seconds",
            "Request duration in seconds",
            &["method", "endpoint"],
            vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]
        )
        .expect("Failed to register request_duration metric");

        let active_requests = register_gauge_vec!(
            "prompt_gateway_active_requests",
            "Number of active requests",
            &["endpoint"]
        )
        .expect("Failed to register active_requests metric");

        let moderation_blocks = register_int_counter_vec!(
            "prompt_gateway_moderation_blocks_total",
            "Prompts blocked by the content policy",
            &["reason"]
        )
        .expect("Failed to register moderation_blocks metric");

        let stream_outcomes = register_int_counter_vec!(
            "prompt_gateway_stream_outcomes_total",
            "Terminal outcome of each request pipeline",
            &["provider", "outcome"]
        )
        .expect("Failed to register stream_outcomes metric");

        let events_emitted = register_int_counter_vec!(
            "prompt_gateway_events_emitted_total",
            "Events written to client streams",
            &["event_type"]
        )
        .expect("Failed to register events_emitted metric");

        let provider_latency = register_histogram_vec!(
            "prompt_gateway_provider_latency_seconds",
            "Time spent driving a provider adapter in seconds",
            &["provider"],
            vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0]
        )
        .expect("Failed to register provider_latency metric");

        Metrics {
            request_count,
            request_duration,
            active_requests,
            moderation_blocks,
            stream_outcomes,
            events_emitted,
            provider_latency,
        }
    })
}

/// Get the global metrics instance, initializing it on first use.
pub fn get_metrics() -> &'static Metrics {
    init_metrics()
}
