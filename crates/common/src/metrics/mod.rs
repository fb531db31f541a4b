//! Metrics and observability utilities
//!
//! Provides Prometheus metrics with SLO-aligned histograms
//! and standardized naming conventions.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all StudyBuddy metrics
pub const METRICS_PREFIX: &str = "studybuddy";

/// SLO-aligned histogram buckets for request latency (in seconds)
///
/// Most routes proxy an LLM/OCR/search call, so the tail stretches to the
/// upstream timeout.
pub const LATENCY_BUCKETS: &[f64] = &[
    0.005,  // 5ms
    0.010,  // 10ms
    0.025,  // 25ms
    0.050,  // 50ms
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.500,  // 2.5s
    5.000,  // 5s
    10.00,  // 10s
    30.00,  // 30s
    60.00,  // 60s
    120.0,  // upstream timeout
];

/// Buckets for AI service calls (completion, OCR, search)
pub const AI_BUCKETS: &[f64] = &[
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.500,  // 2.5s
    5.000,  // 5s
    10.00,  // 10s
    20.00,  // 20s
    30.00,  // 30s
    60.00,  // 60s
    120.0,  // upstream timeout
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Request metrics
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    // AI service metrics
    describe_counter!(
        format!("{}_ai_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total calls to external AI services (completion, OCR, search)"
    );

    describe_histogram!(
        format!("{}_ai_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "AI service call latency in seconds"
    );

    // Quiz generation metrics
    describe_counter!(
        format!("{}_quiz_questions_generated_total", METRICS_PREFIX),
        Unit::Count,
        "Total quiz questions returned to clients"
    );

    // Resources cache metrics
    describe_counter!(
        format!("{}_resources_cache_events_total", METRICS_PREFIX),
        Unit::Count,
        "Resource cache hits, stale reads, and rebuilds"
    );

    // Refresh worker metrics
    describe_counter!(
        format!("{}_refresh_runs_total", METRICS_PREFIX),
        Unit::Count,
        "Background refresh loop iterations by outcome"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

/// Helper to record an AI service call
pub fn record_ai_request(service: &str, duration_secs: f64, success: bool) {
    let outcome = if success { "success" } else { "error" };

    counter!(
        format!("{}_ai_requests_total", METRICS_PREFIX),
        "service" => service.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);

    histogram!(
        format!("{}_ai_request_duration_seconds", METRICS_PREFIX),
        "service" => service.to_string()
    )
    .record(duration_secs);
}

/// Helper to record generated quiz questions
pub fn record_questions_generated(count: usize, source: &str) {
    counter!(
        format!("{}_quiz_questions_generated_total", METRICS_PREFIX),
        "source" => source.to_string()
    )
    .increment(count as u64);
}

/// Helper to record resource-cache activity (`hit`, `stale`, `rebuild`)
pub fn record_cache_event(event: &str) {
    counter!(
        format!("{}_resources_cache_events_total", METRICS_PREFIX),
        "event" => event.to_string()
    )
    .increment(1);
}

/// Helper to record a refresh-worker iteration
pub fn record_refresh_run(success: bool) {
    let outcome = if success { "success" } else { "error" };

    counter!(
        format!("{}_refresh_runs_total", METRICS_PREFIX),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_buckets_sorted() {
        let mut prev = 0.0;
        for &bucket in LATENCY_BUCKETS {
            assert!(bucket > prev);
            prev = bucket;
        }

        // Tail must cover the upstream timeout
        assert!(LATENCY_BUCKETS.contains(&120.0));
        assert!(AI_BUCKETS.contains(&120.0));
    }

    #[test]
    fn test_request_metrics() {
        let metrics = RequestMetrics::start("GET", "/api/health");
        std::thread::sleep(std::time::Duration::from_millis(10));
        metrics.finish(200);
        // Just verify it runs without panic
    }

    #[test]
    fn test_record_helpers() {
        record_ai_request("completion", 1.5, true);
        record_ai_request("ocr", 0.2, false);
        record_questions_generated(5, "generate");
        record_cache_event("hit");
        record_refresh_run(true);
    }
}
