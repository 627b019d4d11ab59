//! Session endpoints.
//!
//! - `GET {info_path}`: the caller's claims as JSON, or 401
//! - `GET|POST {logout_path}`: end the session and redirect to the logout
//!   success URL

use crate::context::RequestAuthContext;
use crate::errors::GkError;
use crate::token::Claims;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Redirect, Response};
use axum::{Extension, Json};
use tracing::instrument;

/// Return the authenticated user's claims.
#[instrument(skip_all, name = "gk.session.info")]
pub async fn info(Extension(ctx): Extension<RequestAuthContext>) -> Result<Json<Claims>, GkError> {
    ctx.claims()
        .cloned()
        .map(Json)
        .ok_or(GkError::Unauthenticated { login_url: None })
}

/// Clear the session cookie and redirect.
#[instrument(skip_all, name = "gk.session.logout")]
pub async fn logout(Extension(mut ctx): Extension<RequestAuthContext>) -> Response {
    let mut headers = HeaderMap::new();
    ctx.logout(&mut headers);

    let target = ctx.settings().logout_success_url.clone();
    (headers, Redirect::to(&target)).into_response()
}
