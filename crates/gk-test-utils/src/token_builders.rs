//! Builder patterns for test data construction
//!
//! Provides fluent APIs for session claims, and a raw signer for payloads
//! the service itself would refuse to issue (expired, foreign issuer, ...).

use chrono::{Duration, Utc};
use gk_service::token::Claims;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde_json::{json, Map, Value};

/// Builder for session claims
///
/// # Example
/// ```rust,ignore
/// let claims = TestClaimsBuilder::new()
///     .for_user("alice")
///     .with_role("ADMIN")
///     .with_claim("tenant", "acme")
///     .build();
/// ```
pub struct TestClaimsBuilder {
    username: String,
    roles: Vec<String>,
    extra: Map<String, Value>,
}

impl TestClaimsBuilder {
    /// Create a new builder for `test-user` with no roles
    pub fn new() -> Self {
        Self {
            username: "test-user".to_string(),
            roles: Vec::new(),
            extra: Map::new(),
        }
    }

    /// Set the username
    pub fn for_user(mut self, username: &str) -> Self {
        self.username = username.to_string();
        self
    }

    /// Add a role
    pub fn with_role(mut self, role: &str) -> Self {
        self.roles.push(role.to_string());
        self
    }

    /// Add a custom claim
    pub fn with_claim(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.extra.insert(name.to_string(), value.into());
        self
    }

    /// Build the claims
    pub fn build(self) -> Claims {
        self.extra
            .into_iter()
            .fold(Claims::new(self.username, self.roles), |claims, (name, value)| {
                claims.with_claim(name, value)
            })
    }
}

impl Default for TestClaimsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Payload for `username` with `exp` set `seconds` from now (negative for
/// an already expired token).
pub fn payload_expiring_in(username: &str, roles: &[&str], seconds: i64) -> Value {
    let now = Utc::now();
    json!({
        "username": username,
        "roles": roles,
        "iat": now.timestamp(),
        "exp": (now + Duration::seconds(seconds)).timestamp(),
    })
}

/// Sign an arbitrary JSON payload with an Ed25519 PEM private key.
pub fn sign_raw_claims(private_pem: &str, payload: &Value) -> Result<String, anyhow::Error> {
    let key = EncodingKey::from_ed_pem(private_pem.as_bytes())?;
    Ok(jsonwebtoken::encode(&Header::new(Algorithm::EdDSA), payload, &key)?)
}
