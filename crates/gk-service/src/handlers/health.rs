//! Health check handlers.
//!
//! - `/health`: Liveness probe - returns OK if the process is running
//! - `/ready`: Readiness probe - checks the cache backend and signing key

use crate::routes::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use gk_cache::CacheBackend;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Key written and read back by the readiness probe.
const READINESS_PROBE_KEY: &str = "__readiness_probe__";

#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signing_key: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Liveness probe handler. Does not check dependencies.
pub async fn health_check() -> &'static str {
    "OK"
}

/// Readiness probe handler.
///
/// Returns 200 when a value can be written to and read back from the primary
/// cache and the signing key can be loaded, 503 otherwise. Failure details
/// are logged, not returned.
#[tracing::instrument(skip_all, name = "gk.health.readiness")]
pub async fn readiness_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let probe = Value::from(Utc::now().timestamp_millis());

    let round_trip = match state
        .cache
        .set(READINESS_PROBE_KEY, probe, Some(Duration::from_secs(10)))
        .await
    {
        Ok(()) => state.cache.get(READINESS_PROBE_KEY).await,
        Err(e) => Err(e),
    };

    match round_trip {
        Ok(Some(_)) => {}
        Ok(None) => {
            tracing::warn!(target: "gk.health", "Readiness check failed: probe value not readable");
            return not_ready("unhealthy", None);
        }
        Err(e) => {
            tracing::warn!(target: "gk.health", error = %e, "Readiness check failed: cache error");
            return not_ready("unhealthy", None);
        }
    }

    if !state.auth.authenticator.signing_key_available() {
        tracing::warn!(target: "gk.health", "Readiness check failed: signing key unavailable");
        return not_ready("healthy", Some("unavailable"));
    }

    (
        StatusCode::OK,
        Json(ReadinessResponse {
            status: "ready",
            cache: Some("healthy"),
            signing_key: Some("available"),
            error: None,
        }),
    )
}

/// The signing key is only reported once the cache check has passed.
fn not_ready(
    cache: &'static str,
    signing_key: Option<&'static str>,
) -> (StatusCode, Json<ReadinessResponse>) {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(ReadinessResponse {
            status: "not_ready",
            cache: Some(cache),
            signing_key,
            error: Some("Service dependencies unavailable".to_string()),
        }),
    )
}
