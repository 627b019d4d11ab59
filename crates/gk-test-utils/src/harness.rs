//! Router harness for in-process HTTP tests
//!
//! Provides TestGatekeeper: a fully wired router backed by the local cache
//! and a deterministic Ed25519 keypair on disk. Requests are driven with
//! `tower::ServiceExt::oneshot`, no socket is bound.

use crate::crypto_fixtures::{test_keypair, write_key_files, KeyFiles, TestKeyPair};
use axum::Router;
use gk_cache::CacheFactory;
use gk_service::authorization::{AuthMapping, AuthorizationMapper};
use gk_service::context::{AuthSettings, CookieSettings};
use gk_service::middleware::AuthState;
use gk_service::routes::{build_routes, AppState};
use gk_service::token::{Claims, KeyPaths, SigningOptions, TokenAuthenticator};
use jsonwebtoken::Algorithm;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::collections::BTreeSet;
use std::sync::Arc;
use tempfile::TempDir;

/// Seed of the keypair every harness signs with.
pub const HARNESS_KEY_SEED: u8 = 42;

/// Test harness wiring Gatekeeper's router around caller routes
///
/// # Example
/// ```rust,ignore
/// let gk = TestGatekeeper::new(vec![mapping("^/admin", &["ADMIN"], &[])])?;
/// let app = Router::new().route("/admin", get(|| async { "secret" }));
///
/// let response = gk.router(app).oneshot(request).await?;
/// ```
pub struct TestGatekeeper {
    state: Arc<AppState>,
    keys: TestKeyPair,
    key_files: KeyFiles,
    _dir: TempDir,
}

impl TestGatekeeper {
    /// Harness with default settings except for a non-`Secure` cookie.
    pub fn new(mappings: Vec<AuthMapping>) -> Result<Self, anyhow::Error> {
        let mut settings = AuthSettings::default();
        settings.cookie = CookieSettings {
            secure: false,
            ..CookieSettings::default()
        };
        Self::with_settings(mappings, settings)
    }

    /// Harness with explicit session settings (paths, hooks, cookie).
    pub fn with_settings(
        mappings: Vec<AuthMapping>,
        settings: AuthSettings,
    ) -> Result<Self, anyhow::Error> {
        let dir = tempfile::tempdir()?;
        let key_files = write_key_files(dir.path(), HARNESS_KEY_SEED)?;
        let keys = test_keypair(HARNESS_KEY_SEED)?;

        let cache = CacheFactory::local();
        let authenticator = TokenAuthenticator::new(
            KeyPaths {
                private_key: key_files.private_key.clone(),
                public_key: key_files.public_key.clone(),
            },
            SigningOptions {
                algorithm: Algorithm::EdDSA,
                ..SigningOptions::default()
            },
            cache.secrets(),
        );
        authenticator
            .preload_keys()
            .map_err(|e| anyhow::anyhow!("Failed to load harness keys: {}", e))?;

        let mapper = AuthorizationMapper::new(mappings)
            .map_err(|e| anyhow::anyhow!("Invalid harness mappings: {}", e))?;

        let state = Arc::new(AppState {
            cache,
            auth: Arc::new(AuthState {
                authenticator: Arc::new(authenticator),
                settings: Arc::new(settings),
                mapper: Arc::new(mapper),
            }),
        });

        Ok(Self {
            state,
            keys,
            key_files,
            _dir: dir,
        })
    }

    /// Full router with `app_routes` behind the URL policies.
    pub fn router(&self, app_routes: Router) -> Router {
        // Unregistered recorder: the global one can only be installed once
        // per process.
        let handle = PrometheusBuilder::new().build_recorder().handle();
        build_routes(Arc::clone(&self.state), app_routes, handle)
    }

    pub fn state(&self) -> Arc<AppState> {
        Arc::clone(&self.state)
    }

    pub fn auth_state(&self) -> Arc<AuthState> {
        Arc::clone(&self.state.auth)
    }

    pub fn authenticator(&self) -> Arc<TokenAuthenticator> {
        Arc::clone(&self.state.auth.authenticator)
    }

    /// Issue a token the harness will accept.
    pub fn issue_token(&self, claims: &Claims) -> Result<String, anyhow::Error> {
        self.state
            .auth
            .authenticator
            .encode(claims, None)
            .map_err(|e| anyhow::anyhow!("Failed to issue token: {}", e))
    }

    /// The harness keypair, for signing tokens by hand.
    pub fn keys(&self) -> &TestKeyPair {
        &self.keys
    }

    pub fn key_files(&self) -> &KeyFiles {
        &self.key_files
    }
}

/// Mapping literal for tests: `mapping("^/admin", &["ADMIN"], &["get"])`.
pub fn mapping(pattern: &str, roles: &[&str], methods: &[&str]) -> AuthMapping {
    let set = |items: &[&str]| -> BTreeSet<String> { items.iter().map(|s| s.to_string()).collect() };
    AuthMapping {
        pattern: pattern.to_string(),
        roles: set(roles),
        methods: set(methods),
    }
}
