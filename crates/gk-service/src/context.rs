//! Per-request authentication state.
//!
//! A [`RequestAuthContext`] is built for every request from its headers:
//! the `GK_AUTH` cookie is preferred, otherwise an `Authorization: JWT
//! <token>` header is used. A token that fails verification leaves the
//! request unauthenticated; it is never an error.

use crate::errors::GkError;
use crate::token::{Claims, TokenAuthenticator};
use axum::http::header::{AUTHORIZATION, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue};
use axum_extra::extract::cookie::CookieJar;
use common::jwt::{parse_auth_header, DEFAULT_AUTH_SCHEME};
use cookie::time::{Duration as CookieDuration, OffsetDateTime};
use cookie::Cookie;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Name of the session cookie.
pub const AUTH_COOKIE_NAME: &str = "GK_AUTH";

/// Attributes of the session cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieSettings {
    pub http_only: bool,
    pub secure: bool,
    /// `None` means a browser-session cookie.
    pub max_age: Option<Duration>,
    pub path: String,
}

impl Default for CookieSettings {
    fn default() -> Self {
        Self {
            http_only: true,
            secure: true,
            max_age: None,
            path: "/".to_string(),
        }
    }
}

impl CookieSettings {
    /// Cookie carrying a freshly issued token.
    #[must_use]
    pub fn session_cookie(&self, token: &str) -> Cookie<'static> {
        let mut cookie = Cookie::build((AUTH_COOKIE_NAME, token.to_string()))
            .path(self.path.clone())
            .http_only(self.http_only)
            .secure(self.secure)
            .build();
        if let Some(max_age) = self.max_age {
            let seconds = i64::try_from(max_age.as_secs()).unwrap_or(i64::MAX);
            cookie.set_max_age(CookieDuration::seconds(seconds));
        }
        cookie
    }

    /// Cookie that makes the browser drop the session immediately.
    #[must_use]
    pub fn expired_cookie(&self) -> Cookie<'static> {
        Cookie::build((AUTH_COOKIE_NAME, ""))
            .path(self.path.clone())
            .http_only(self.http_only)
            .secure(self.secure)
            .max_age(CookieDuration::ZERO)
            .expires(OffsetDateTime::UNIX_EPOCH)
            .build()
    }
}

/// Callbacks fired on session changes.
///
/// Both methods may add headers to the outgoing response (for example a
/// second cookie or an audit header). The defaults do nothing.
pub trait AuthHooks: Send + Sync {
    fn on_login_success(&self, _response: &mut HeaderMap, _user: &Claims) {}

    fn on_logout_success(&self, _response: &mut HeaderMap, _user: Option<&Claims>) {}
}

/// Hooks that do nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl AuthHooks for NoopHooks {}

/// Session paths, redirects, cookie attributes and hooks.
#[derive(Clone)]
pub struct AuthSettings {
    pub login_path: String,
    pub info_path: String,
    pub logout_path: String,
    pub login_success_url: String,
    pub logout_success_url: String,
    pub cookie: CookieSettings,
    hooks: Arc<dyn AuthHooks>,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            login_path: "/login".to_string(),
            info_path: "/info".to_string(),
            logout_path: "/logout".to_string(),
            login_success_url: "/admin".to_string(),
            logout_success_url: "/".to_string(),
            cookie: CookieSettings::default(),
            hooks: Arc::new(NoopHooks),
        }
    }
}

impl fmt::Debug for AuthSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSettings")
            .field("login_path", &self.login_path)
            .field("info_path", &self.info_path)
            .field("logout_path", &self.logout_path)
            .field("login_success_url", &self.login_success_url)
            .field("logout_success_url", &self.logout_success_url)
            .field("cookie", &self.cookie)
            .finish_non_exhaustive()
    }
}

impl AuthSettings {
    /// Replace the session hooks.
    #[must_use]
    pub fn with_hooks(mut self, hooks: Arc<dyn AuthHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    #[must_use]
    pub fn hooks(&self) -> &dyn AuthHooks {
        self.hooks.as_ref()
    }

    /// Login page URL that sends the user back to `return_url` afterwards.
    #[must_use]
    pub fn login_url(&self, return_url: &str) -> String {
        let encoded: String = url::form_urlencoded::byte_serialize(return_url.as_bytes()).collect();
        format!("{}?return={encoded}", self.login_path)
    }
}

fn append_set_cookie(response: &mut HeaderMap, cookie: &Cookie<'_>) -> Result<(), GkError> {
    let value = HeaderValue::from_str(&cookie.to_string()).map_err(|_| GkError::Internal)?;
    response.append(SET_COOKIE, value);
    Ok(())
}

/// Extract the raw token: cookie first, then the `Authorization` header.
fn token_from_headers(headers: &HeaderMap) -> Option<String> {
    let jar = CookieJar::from_headers(headers);
    if let Some(cookie) = jar.get(AUTH_COOKIE_NAME).filter(|c| !c.value().is_empty()) {
        return Some(cookie.value().to_string());
    }

    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_auth_header)
        .filter(|params| params.scheme == DEFAULT_AUTH_SCHEME)
        .map(|params| params.value)
}

/// Authentication state of one request.
#[derive(Clone)]
pub struct RequestAuthContext {
    raw_token: Option<String>,
    claims: Option<Claims>,
    authenticator: Arc<TokenAuthenticator>,
    settings: Arc<AuthSettings>,
}

impl fmt::Debug for RequestAuthContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestAuthContext")
            .field("raw_token", &self.raw_token.as_ref().map(|_| "[REDACTED]"))
            .field("claims", &self.claims)
            .finish_non_exhaustive()
    }
}

impl RequestAuthContext {
    /// Build the context for a request.
    pub fn from_headers(
        headers: &HeaderMap,
        authenticator: Arc<TokenAuthenticator>,
        settings: Arc<AuthSettings>,
    ) -> Self {
        let raw_token = token_from_headers(headers);
        let claims = raw_token
            .as_deref()
            .and_then(|token| authenticator.decode(token).ok());

        Self {
            raw_token,
            claims,
            authenticator,
            settings,
        }
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.claims.is_some()
    }

    /// Verified claims, or `None` when unauthenticated.
    #[must_use]
    pub fn claims(&self) -> Option<&Claims> {
        self.claims.as_ref()
    }

    /// Token presented with the request, whether or not it verified.
    #[must_use]
    pub fn raw_token(&self) -> Option<&str> {
        self.raw_token.as_deref()
    }

    #[must_use]
    pub fn settings(&self) -> &AuthSettings {
        &self.settings
    }

    #[must_use]
    pub fn login_url(&self, return_url: &str) -> String {
        self.settings.login_url(return_url)
    }

    /// Start a session for `user`.
    ///
    /// Fires the login hook, issues a token, appends the session cookie to
    /// `response` and marks this request as authenticated. Returns the token.
    ///
    /// # Errors
    ///
    /// Returns any error from [`TokenAuthenticator::encode`].
    pub fn authenticate(&mut self, response: &mut HeaderMap, user: &Claims) -> Result<String, GkError> {
        self.settings.hooks().on_login_success(response, user);

        let token = self.authenticator.encode(user, None)?;
        append_set_cookie(response, &self.settings.cookie.session_cookie(&token))?;

        debug!(target: "gk.context", "Session started");
        self.raw_token = Some(token.clone());
        self.claims = Some(user.clone());
        Ok(token)
    }

    /// End the session.
    ///
    /// Fires the logout hook, clears this request's state and appends a
    /// cookie that expires `GK_AUTH` in the browser.
    pub fn logout(&mut self, response: &mut HeaderMap) {
        self.settings.hooks().on_logout_success(response, self.claims.as_ref());

        self.raw_token = None;
        self.claims = None;

        if let Err(e) = append_set_cookie(response, &self.settings.cookie.expired_cookie()) {
            warn!(target: "gk.context", error = %e, "Failed to write logout cookie");
        }
        debug!(target: "gk.context", "Session ended");
    }
}
