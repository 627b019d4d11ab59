//! Token verification against tokens the service did not issue itself.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use gk_service::token::TokenRejection;
use gk_test_utils::{
    payload_expiring_in, sign_raw_claims, test_keypair, TestClaimsBuilder, TestGatekeeper,
};
use serde_json::json;

#[test]
fn test_expired_token_is_rejected() -> Result<(), anyhow::Error> {
    // Arrange
    let gk = TestGatekeeper::new(Vec::new())?;
    let token = sign_raw_claims(
        &gk.keys().private_pem,
        &payload_expiring_in("alice", &["ADMIN"], -3600),
    )?;

    // Act
    let result = gk.authenticator().decode(&token);

    // Assert
    assert_eq!(result.unwrap_err(), TokenRejection::Expired);
    Ok(())
}

#[test]
fn test_token_signed_with_other_key_is_rejected() -> Result<(), anyhow::Error> {
    // Arrange
    let gk = TestGatekeeper::new(Vec::new())?;
    let foreign = test_keypair(7)?;
    let token = sign_raw_claims(
        &foreign.private_pem,
        &payload_expiring_in("mallory", &["ADMIN"], 3600),
    )?;

    // Act
    let result = gk.authenticator().decode(&token);

    // Assert
    assert_eq!(result.unwrap_err(), TokenRejection::InvalidSignature);
    Ok(())
}

#[test]
fn test_externally_signed_valid_token_is_accepted() -> Result<(), anyhow::Error> {
    // Arrange
    let gk = TestGatekeeper::new(Vec::new())?;
    let token = sign_raw_claims(
        &gk.keys().private_pem,
        &payload_expiring_in("carol", &["EDITOR"], 600),
    )?;

    // Act
    let claims = gk.authenticator().decode(&token)?;

    // Assert
    assert_eq!(claims.username, "carol");
    assert!(claims.roles.contains("EDITOR"));
    assert!(claims.extra.get("exp").is_none(), "registered claims are stripped");
    Ok(())
}

#[test]
fn test_token_without_exp_is_rejected() -> Result<(), anyhow::Error> {
    // Arrange
    let gk = TestGatekeeper::new(Vec::new())?;
    let token = sign_raw_claims(&gk.keys().private_pem, &json!({"username": "dave"}))?;

    // Act
    let result = gk.authenticator().decode(&token);

    // Assert
    assert_eq!(result.unwrap_err(), TokenRejection::InvalidClaims);
    Ok(())
}

#[test]
fn test_token_without_username_is_rejected() -> Result<(), anyhow::Error> {
    // Arrange
    let gk = TestGatekeeper::new(Vec::new())?;
    let mut payload = payload_expiring_in("erin", &[], 600);
    payload.as_object_mut().unwrap().remove("username");
    let token = sign_raw_claims(&gk.keys().private_pem, &payload)?;

    // Act
    let result = gk.authenticator().decode(&token);

    // Assert
    assert_eq!(result.unwrap_err(), TokenRejection::InvalidClaims);
    Ok(())
}

#[test]
fn test_single_string_role_decodes_to_set() -> Result<(), anyhow::Error> {
    // Arrange
    let gk = TestGatekeeper::new(Vec::new())?;
    let mut payload = payload_expiring_in("frank", &[], 600);
    payload["roles"] = json!("AUDITOR");
    let token = sign_raw_claims(&gk.keys().private_pem, &payload)?;

    // Act
    let claims = gk.authenticator().decode(&token)?;

    // Assert
    assert_eq!(claims.roles.len(), 1);
    assert!(claims.roles.contains("AUDITOR"));
    Ok(())
}

#[test]
fn test_issued_token_round_trips_custom_claims() -> Result<(), anyhow::Error> {
    // Arrange
    let gk = TestGatekeeper::new(Vec::new())?;
    let claims = TestClaimsBuilder::new()
        .for_user("grace")
        .with_role("ADMIN")
        .with_claim("tenant", "acme")
        .with_claim("level", 3)
        .build();

    // Act
    let token = gk.issue_token(&claims)?;
    let decoded = gk.authenticator().decode(&token)?;

    // Assert
    assert_eq!(decoded, claims);
    Ok(())
}
