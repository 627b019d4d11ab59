//! Authentication and authorization middleware.
//!
//! - `attach_auth_context` - builds a [`RequestAuthContext`] for every request
//!   and stores it in request extensions
//! - `enforce_mappings` - applies the configured URL policies
//!
//! A request the policies refuse is answered without reaching the handler:
//! unauthenticated `GET`/`HEAD` requests are redirected to the login page,
//! other unauthenticated requests get 401, and authenticated requests lacking
//! a required role get 403.

use crate::authorization::AuthorizationMapper;
use crate::context::{AuthSettings, RequestAuthContext};
use crate::errors::GkError;
use crate::observability::metrics::record_authorization_decision;
use crate::token::TokenAuthenticator;
use axum::{
    extract::{Request, State},
    http::Method,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::{debug, instrument};

/// State shared by the auth middleware and session handlers.
#[derive(Clone)]
pub struct AuthState {
    pub authenticator: Arc<TokenAuthenticator>,
    pub settings: Arc<AuthSettings>,
    pub mapper: Arc<AuthorizationMapper>,
}

impl AuthState {
    fn context_for(&self, req: &Request) -> RequestAuthContext {
        RequestAuthContext::from_headers(
            req.headers(),
            Arc::clone(&self.authenticator),
            Arc::clone(&self.settings),
        )
    }
}

/// Build the request's auth context and store it in extensions.
#[instrument(skip_all, name = "gk.middleware.attach_auth_context")]
pub async fn attach_auth_context(
    State(state): State<Arc<AuthState>>,
    mut req: Request,
    next: Next,
) -> Response {
    let ctx = state.context_for(&req);
    req.extensions_mut().insert(ctx);
    next.run(req).await
}

/// Admit or refuse the request according to the first matching URL policy.
///
/// Uses the context stored by [`attach_auth_context`], building one if that
/// layer is not installed.
#[instrument(skip_all, name = "gk.middleware.enforce_mappings")]
pub async fn enforce_mappings(
    State(state): State<Arc<AuthState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, GkError> {
    let url = req
        .uri()
        .path_and_query()
        .map_or_else(|| req.uri().path().to_string(), |pq| pq.as_str().to_string());

    let Some(mapping) = state.mapper.is_url_match(&url, req.method().as_str()) else {
        record_authorization_decision("unmapped");
        return Ok(next.run(req).await);
    };

    if req.extensions().get::<RequestAuthContext>().is_none() {
        let ctx = state.context_for(&req);
        req.extensions_mut().insert(ctx);
    }
    let ctx = req
        .extensions()
        .get::<RequestAuthContext>()
        .ok_or(GkError::Internal)?;

    if state.mapper.has_access(ctx, &mapping.roles) {
        record_authorization_decision("allowed");
        return Ok(next.run(req).await);
    }

    if ctx.is_authenticated() {
        debug!(
            target: "gk.middleware.auth",
            pattern = %mapping.pattern,
            "Request refused: missing required role"
        );
        record_authorization_decision("forbidden");
        return Err(GkError::Forbidden);
    }

    debug!(
        target: "gk.middleware.auth",
        pattern = %mapping.pattern,
        "Request refused: not authenticated"
    );
    record_authorization_decision("unauthenticated");

    let login_url = (req.method() == Method::GET || req.method() == Method::HEAD)
        .then(|| state.settings.login_url(&url));
    Err(GkError::Unauthenticated { login_url })
}
