//! Session start and end through `RequestAuthContext`.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use axum::http::header::{AUTHORIZATION, COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use gk_service::context::{AuthHooks, AuthSettings, RequestAuthContext};
use gk_service::token::Claims;
use gk_test_utils::{TestClaimsBuilder, TestGatekeeper};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct RecordingHooks {
    events: Mutex<Vec<String>>,
}

impl AuthHooks for RecordingHooks {
    fn on_login_success(&self, response: &mut HeaderMap, user: &Claims) {
        self.events
            .lock()
            .unwrap()
            .push(format!("login:{}", user.username));
        response.insert(
            HeaderName::from_static("x-audit"),
            HeaderValue::from_static("login"),
        );
    }

    fn on_logout_success(&self, _response: &mut HeaderMap, user: Option<&Claims>) {
        let name = user.map_or("anonymous", |u| u.username.as_str());
        self.events.lock().unwrap().push(format!("logout:{name}"));
    }
}

fn context(gk: &TestGatekeeper, headers: &HeaderMap) -> RequestAuthContext {
    let auth = gk.auth_state();
    RequestAuthContext::from_headers(
        headers,
        Arc::clone(&auth.authenticator),
        Arc::clone(&auth.settings),
    )
}

fn set_cookies(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect()
}

#[test]
fn test_authenticate_sets_cookie_and_claims() -> Result<(), anyhow::Error> {
    // Arrange
    let gk = TestGatekeeper::new(Vec::new())?;
    let mut ctx = context(&gk, &HeaderMap::new());
    let user = TestClaimsBuilder::new().for_user("alice").with_role("ADMIN").build();
    let mut response = HeaderMap::new();

    // Act
    let token = ctx.authenticate(&mut response, &user)?;

    // Assert
    assert!(ctx.is_authenticated());
    assert_eq!(ctx.claims(), Some(&user));
    assert_eq!(ctx.raw_token(), Some(token.as_str()));

    let cookies = set_cookies(&response);
    assert_eq!(cookies.len(), 1);
    assert!(cookies[0].starts_with(&format!("GK_AUTH={token}")));
    assert!(cookies[0].contains("HttpOnly"));
    Ok(())
}

#[test]
fn test_issued_cookie_authenticates_next_request() -> Result<(), anyhow::Error> {
    // Arrange
    let gk = TestGatekeeper::new(Vec::new())?;
    let user = TestClaimsBuilder::new().for_user("bob").with_role("EDITOR").build();
    let mut response = HeaderMap::new();
    let token = context(&gk, &HeaderMap::new()).authenticate(&mut response, &user)?;

    let mut next_request = HeaderMap::new();
    next_request.insert(COOKIE, HeaderValue::from_str(&format!("GK_AUTH={token}"))?);

    // Act
    let ctx = context(&gk, &next_request);

    // Assert
    assert!(ctx.is_authenticated());
    assert_eq!(ctx.claims().unwrap().username, "bob");
    Ok(())
}

#[test]
fn test_authorization_header_authenticates() -> Result<(), anyhow::Error> {
    // Arrange
    let gk = TestGatekeeper::new(Vec::new())?;
    let token = gk.issue_token(&TestClaimsBuilder::new().for_user("carol").build())?;
    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("JWT {token}"))?);

    // Act
    let ctx = context(&gk, &headers);

    // Assert
    assert_eq!(ctx.claims().unwrap().username, "carol");
    Ok(())
}

#[test]
fn test_invalid_token_leaves_request_unauthenticated() -> Result<(), anyhow::Error> {
    // Arrange
    let gk = TestGatekeeper::new(Vec::new())?;
    let mut headers = HeaderMap::new();
    headers.insert(COOKIE, HeaderValue::from_static("GK_AUTH=not.a.token"));

    // Act
    let ctx = context(&gk, &headers);

    // Assert
    assert!(!ctx.is_authenticated());
    assert_eq!(ctx.raw_token(), Some("not.a.token"));
    Ok(())
}

#[test]
fn test_logout_clears_state_and_expires_cookie() -> Result<(), anyhow::Error> {
    // Arrange
    let gk = TestGatekeeper::new(Vec::new())?;
    let token = gk.issue_token(&TestClaimsBuilder::new().build())?;
    let mut headers = HeaderMap::new();
    headers.insert(COOKIE, HeaderValue::from_str(&format!("GK_AUTH={token}"))?);
    let mut ctx = context(&gk, &headers);
    let mut response = HeaderMap::new();

    // Act
    ctx.logout(&mut response);

    // Assert
    assert!(!ctx.is_authenticated());
    assert_eq!(ctx.raw_token(), None);

    let cookies = set_cookies(&response);
    assert_eq!(cookies.len(), 1);
    assert!(cookies[0].starts_with("GK_AUTH=;"));
    assert!(cookies[0].contains("Max-Age=0"));
    Ok(())
}

#[test]
fn test_hooks_fire_on_login_and_logout() -> Result<(), anyhow::Error> {
    // Arrange
    let hooks = Arc::new(RecordingHooks::default());
    let settings = AuthSettings::default().with_hooks(hooks.clone());
    let gk = TestGatekeeper::with_settings(Vec::new(), settings)?;
    let mut ctx = context(&gk, &HeaderMap::new());
    let user = TestClaimsBuilder::new().for_user("dave").build();

    // Act
    let mut login_response = HeaderMap::new();
    ctx.authenticate(&mut login_response, &user)?;
    let mut logout_response = HeaderMap::new();
    ctx.logout(&mut logout_response);
    ctx.logout(&mut logout_response);

    // Assert
    assert_eq!(
        *hooks.events.lock().unwrap(),
        vec!["login:dave", "logout:dave", "logout:anonymous"]
    );
    assert_eq!(login_response.get("x-audit").unwrap(), "login");
    assert!(login_response.contains_key(SET_COOKIE));
    Ok(())
}
