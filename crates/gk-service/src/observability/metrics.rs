//! Metrics definitions for the Gatekeeper service.
//!
//! All metrics follow Prometheus naming conventions:
//! - `gk_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded to prevent cardinality explosion:
//! - `status`: 2 values (success, error)
//! - `error_category`: bounded by `TokenRejection` variants
//! - `outcome`: 4 values (allowed, unmapped, unauthenticated, forbidden)
//! - `endpoint`: known service paths, everything else is `/other`
//!
//! Cache metrics are recorded by `gk-cache` as `gk_cache_operations_total`.

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize the Prometheus recorder and return the handle used to serve
/// `/metrics`.
///
/// # Errors
///
/// Returns an error if a recorder is already installed.
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("gk_http_request".to_string()),
            &[
                0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// Token Metrics
// ============================================================================

/// Record a token being issued.
///
/// Metric: `gk_token_issuance_total`
/// Labels: `status`
pub fn record_token_issuance(status: &'static str) {
    counter!("gk_token_issuance_total", "status" => status).increment(1);
}

/// Record a token verification result.
///
/// Metric: `gk_token_validations_total`
/// Labels: `status`, `error_category`
pub fn record_token_validation(status: &'static str, error_category: Option<&'static str>) {
    let category = error_category.unwrap_or("none");
    counter!(
        "gk_token_validations_total",
        "status" => status,
        "error_category" => category
    )
    .increment(1);
}

// ============================================================================
// Authorization Metrics
// ============================================================================

/// Record an admission decision made by the mapping middleware.
///
/// Metric: `gk_authorization_decisions_total`
/// Labels: `outcome`
pub fn record_authorization_decision(outcome: &'static str) {
    counter!("gk_authorization_decisions_total", "outcome" => outcome).increment(1);
}

// ============================================================================
// HTTP Metrics
// ============================================================================

/// Record HTTP request completion.
///
/// Metric: `gk_http_requests_total`, `gk_http_request_duration_seconds`
/// Labels: `method`, `endpoint`, `status`
pub fn record_http_request(method: &str, endpoint: &str, status_code: u16, duration: Duration) {
    let endpoint = normalize_endpoint(endpoint);
    let status = categorize_status_code(status_code);

    histogram!("gk_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => endpoint,
        "status" => status
    )
    .record(duration.as_secs_f64());

    counter!("gk_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => endpoint,
        "status" => status
    )
    .increment(1);
}

fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        200..=399 => "success",
        408 | 504 => "timeout",
        _ => "error",
    }
}

/// Collapse arbitrary request paths onto a fixed label set.
fn normalize_endpoint(path: &str) -> &'static str {
    match path {
        "/health" => "/health",
        "/ready" => "/ready",
        "/metrics" => "/metrics",
        _ => "/other",
    }
}
