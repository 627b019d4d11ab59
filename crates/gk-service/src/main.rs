//! Gatekeeper
//!
//! Serves the session endpoints, health probes and metrics behind the
//! configured URL policies.

use axum::Router;
use gk_cache::CacheFactory;
use gk_service::authorization::AuthorizationMapper;
use gk_service::config::Config;
use gk_service::middleware::AuthState;
use gk_service::observability::{init_tracing, metrics::init_metrics_recorder};
use gk_service::routes::{self, AppState};
use gk_service::token::TokenAuthenticator;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logging settings come from the config when it loads, defaults otherwise,
    // so a configuration error is still reported through tracing.
    let config = Config::from_env();
    let observability = config
        .as_ref()
        .map(|c| c.observability.clone())
        .unwrap_or_default();
    init_tracing(&observability)?;

    info!("Starting Gatekeeper");

    let config = config.map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        cache_method = %config.cache.method,
        algorithm = ?config.signing.algorithm,
        mappings = config.mappings.len(),
        "Configuration loaded successfully"
    );

    // Initialize Prometheus metrics recorder
    let metrics_handle = init_metrics_recorder().map_err(|e| {
        error!("Failed to initialize metrics recorder: {}", e);
        e
    })?;

    // Connect the cache backend
    let cache = CacheFactory::from_config(&config.cache).await.map_err(|e| {
        error!("Failed to initialize cache: {}", e);
        e
    })?;

    // Load signing and verification keys
    let authenticator = TokenAuthenticator::new(
        config.keys.clone(),
        config.signing.clone(),
        cache.secrets(),
    );
    authenticator.preload_keys().map_err(|e| {
        error!("Failed to load signing keys: {}", e);
        e
    })?;

    info!("Signing keys loaded");

    let mapper = AuthorizationMapper::new(config.mappings.clone()).map_err(|e| {
        error!("Failed to compile URL policies: {}", e);
        e
    })?;

    let addr: SocketAddr = config.bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;

    let state = Arc::new(AppState {
        cache,
        auth: Arc::new(AuthState {
            authenticator: Arc::new(authenticator),
            settings: Arc::new(config.auth),
            mapper: Arc::new(mapper),
        }),
    });

    let app = routes::build_routes(state, Router::new(), metrics_handle);

    info!("Gatekeeper listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    info!("Gatekeeper shutdown complete");

    Ok(())
}
