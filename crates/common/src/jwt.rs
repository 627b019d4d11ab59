//! JWT constants and `Authorization` header parsing shared by Gatekeeper crates.
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - The header parser never logs the credential value

use std::fmt;

// =============================================================================
// Constants
// =============================================================================

/// Maximum allowed JWT size in bytes (8KB).
///
/// Tokens larger than this are rejected before any base64 decoding or
/// signature verification. Typical session tokens are 300-700 bytes; 8KB
/// leaves room for custom claims while bounding the work an attacker can
/// force per request.
pub const MAX_JWT_SIZE_BYTES: usize = 8192;

/// Scheme accepted in the `Authorization` header (`Authorization: JWT <token>`).
///
/// Compared case-sensitively against the parsed scheme.
pub const DEFAULT_AUTH_SCHEME: &str = "JWT";

// =============================================================================
// Header Parsing
// =============================================================================

/// Parsed `Authorization` header value: `<scheme> <value>`.
///
/// The `value` is a credential and is redacted in Debug output.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthParams {
    /// Authentication scheme as sent by the client (case preserved).
    pub scheme: String,
    /// Credential following the scheme.
    pub value: String,
}

impl fmt::Debug for AuthParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthParams")
            .field("scheme", &self.scheme)
            .field("value", &"[REDACTED]")
            .finish()
    }
}

/// Parse an `Authorization` header value into scheme and credential.
///
/// Accepts `<scheme><whitespace><value>` where neither part contains
/// whitespace. Surrounding whitespace is ignored.
///
/// Returns `None` for empty input, a missing credential, or a credential
/// that contains internal whitespace.
///
/// # Example
///
/// ```rust
/// use common::jwt::parse_auth_header;
///
/// let params = parse_auth_header("JWT eyJhbGciOi.eyJ1c2VyIjo.c2ln").unwrap();
/// assert_eq!(params.scheme, "JWT");
/// assert_eq!(params.value, "eyJhbGciOi.eyJ1c2VyIjo.c2ln");
///
/// assert!(parse_auth_header("JWT").is_none());
/// ```
#[must_use]
pub fn parse_auth_header(header: &str) -> Option<AuthParams> {
    let (scheme, rest) = header.trim().split_once(char::is_whitespace)?;
    let value = rest.trim();

    if scheme.is_empty() || value.is_empty() || value.contains(char::is_whitespace) {
        tracing::debug!(
            target: "common.jwt",
            "Authorization header rejected: expected '<scheme> <value>'"
        );
        return None;
    }

    Some(AuthParams {
        scheme: scheme.to_string(),
        value: value.to_string(),
    })
}

// =============================================================================
// Tests
// =============================================================================
