//! URL policy evaluation from configuration through access decisions.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use axum::http::header::COOKIE;
use axum::http::{HeaderMap, HeaderValue};
use gk_service::authorization::AuthorizationMapper;
use gk_service::config::Config;
use gk_service::context::RequestAuthContext;
use gk_test_utils::{mapping, TestClaimsBuilder, TestGatekeeper};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

fn roles(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|s| (*s).to_string()).collect()
}

fn context_for(gk: &TestGatekeeper, token: Option<&str>) -> RequestAuthContext {
    let mut headers = HeaderMap::new();
    if let Some(token) = token {
        headers.insert(
            COOKIE,
            HeaderValue::from_str(&format!("GK_AUTH={token}")).unwrap(),
        );
    }
    let auth = gk.auth_state();
    RequestAuthContext::from_headers(
        &headers,
        Arc::clone(&auth.authenticator),
        Arc::clone(&auth.settings),
    )
}

#[test]
fn test_mappings_from_environment_keep_order() -> Result<(), anyhow::Error> {
    // Arrange
    let vars: HashMap<String, String> = [
        ("AUTH_PRIVATE_KEY_PATH", "/keys/private.pem"),
        ("AUTH_PUBLIC_KEY_PATH", "/keys/public.pem"),
        (
            "AUTH_MAPPINGS",
            r#"[
                {"pattern": "/admin/*", "roles": ["ADMIN"], "method": ["get", "post"]},
                {"pattern": "/profile/*"}
            ]"#,
        ),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();

    // Act
    let config = Config::from_vars(&vars)?;
    let mapper = AuthorizationMapper::new(config.mappings)?;

    // Assert
    let admin = mapper.is_url_match("/admin/users", "GET").unwrap();
    assert_eq!(admin.roles, roles(&["ADMIN"]));
    assert!(mapper.is_url_match("/admin/users", "PUT").is_none());

    let profile = mapper.is_url_match("/profile/me", "PUT").unwrap();
    assert!(profile.roles.is_empty());
    Ok(())
}

#[test]
fn test_has_access_for_request_contexts() -> Result<(), anyhow::Error> {
    // Arrange
    let gk = TestGatekeeper::new(vec![mapping("^/admin", &["ADMIN"], &[])])?;
    let admin = gk.issue_token(&TestClaimsBuilder::new().with_role("ADMIN").build())?;
    let viewer = gk.issue_token(&TestClaimsBuilder::new().with_role("VIEWER").build())?;
    let auth = gk.auth_state();
    let mapper = &auth.mapper;

    let anonymous_ctx = context_for(&gk, None);
    let admin_ctx = context_for(&gk, Some(&admin));
    let viewer_ctx = context_for(&gk, Some(&viewer));

    // Act / Assert
    assert!(!mapper.has_access(&anonymous_ctx, &roles(&[])));
    assert!(!mapper.has_access(&anonymous_ctx, &roles(&["ADMIN"])));

    assert!(mapper.has_access(&admin_ctx, &roles(&[])));
    assert!(mapper.has_access(&admin_ctx, &roles(&["ADMIN", "OPS"])));
    assert!(!mapper.has_access(&admin_ctx, &roles(&["OPS"])));

    assert!(mapper.has_access(&viewer_ctx, &roles(&[])));
    assert!(!mapper.has_access(&viewer_ctx, &roles(&["ADMIN"])));
    Ok(())
}

#[test]
fn test_unmatched_method_falls_through_to_later_rule() -> Result<(), anyhow::Error> {
    // Arrange
    let mapper = AuthorizationMapper::new(vec![
        mapping("^/reports", &["AUDITOR"], &["delete"]),
        mapping("^/reports", &[], &[]),
    ])?;

    // Act
    let delete = mapper.is_url_match("/reports/2024", "DELETE").unwrap();
    let get = mapper.is_url_match("/reports/2024", "GET").unwrap();

    // Assert
    assert_eq!(delete.roles, roles(&["AUDITOR"]));
    assert!(get.roles.is_empty());
    Ok(())
}
