//! HTTP routes for Gatekeeper.
//!
//! Defines the Axum router and application state. Embedders pass their own
//! routes to [`build_routes`] (or wrap them with [`protect`]) so the URL
//! policies apply to them.

use crate::handlers;
use crate::middleware::{attach_auth_context, enforce_mappings, http_metrics_middleware, AuthState};
use axum::{
    middleware,
    routing::get,
    Router,
};
use gk_cache::CacheFactory;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Cache backends; the primary one is probed by `/ready`.
    pub cache: CacheFactory,

    /// Authenticator, session settings and URL policies.
    pub auth: Arc<AuthState>,
}

/// Apply the auth middleware to `router`.
///
/// `attach_auth_context` runs first and stores the request's
/// [`RequestAuthContext`](crate::context::RequestAuthContext) in extensions;
/// `enforce_mappings` then admits or refuses the request. Only routes already
/// on `router` are covered.
pub fn protect<S>(router: Router<S>, auth: Arc<AuthState>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router
        .layer(middleware::from_fn_with_state(
            Arc::clone(&auth),
            enforce_mappings,
        ))
        .layer(middleware::from_fn_with_state(auth, attach_auth_context))
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/health` - Liveness probe (simple "OK") - never subject to policies
/// - `/ready` - Readiness probe (cache round trip + signing key)
/// - `/metrics` - Prometheus metrics endpoint
/// - `{info_path}` - Current user's claims (GET)
/// - `{logout_path}` - End the session (GET, POST)
/// - `app_routes` - caller's routes, subject to the URL policies
/// - TraceLayer for request logging
/// - HTTP metrics middleware
/// - 30 second request timeout
pub fn build_routes(
    state: Arc<AppState>,
    app_routes: Router,
    metrics_handle: PrometheusHandle,
) -> Router {
    let settings = Arc::clone(&state.auth.settings);

    // Operational routes (no policies)
    let operational_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .with_state(Arc::clone(&state));

    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    // Session routes and the caller's routes share the auth middleware
    let session_routes = Router::new()
        .route(&settings.info_path, get(handlers::info))
        .route(
            &settings.logout_path,
            get(handlers::logout).post(handlers::logout),
        )
        .merge(app_routes);
    let protected_routes = protect(session_routes, Arc::clone(&state.auth));

    // Layer order (bottom-to-top execution):
    // 1. TimeoutLayer - Timeout the request (innermost)
    // 2. TraceLayer - Log request details
    // 3. http_metrics_middleware - Record ALL responses (outermost)
    operational_routes
        .merge(metrics_routes)
        .merge(protected_routes)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(middleware::from_fn(http_metrics_middleware))
}
