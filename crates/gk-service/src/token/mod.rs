//! Session token issuing and verification.
//!
//! Key material is read from PEM files on first use and memoized in the
//! process-local secrets cache, so each file is read at most once per
//! process no matter how many requests race on a cold start.
//!
//! # Security
//!
//! - Tokens larger than [`MAX_JWT_SIZE_BYTES`] are rejected before any
//!   base64 decoding or signature work
//! - Every token carries `exp`; verification uses no leeway unless configured
//! - Only asymmetric algorithms are accepted, so a verifier never holds
//!   signing material
//! - Tokens and key material are never logged

pub mod claims;

pub use claims::{Claims, RoleSet, REGISTERED_CLAIMS};

use crate::errors::GkError;
use crate::observability::metrics::{record_token_issuance, record_token_validation};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use common::jwt::MAX_JWT_SIZE_BYTES;
use common::secret::{ExposeSecret, SecretString};
use gk_cache::LocalCache;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument, warn};

/// Secrets cache key for the signing (private) key PEM.
pub const SIGNING_KEY_CACHE_KEY: &str = "signing-key";

/// Secrets cache key for the verification (public) key PEM.
pub const VERIFICATION_KEY_CACHE_KEY: &str = "verification-key";

/// Default token lifetime.
pub const DEFAULT_EXPIRES_IN: Duration = Duration::from_secs(2 * 60 * 60);

/// Locations of the PEM key pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPaths {
    pub private_key: PathBuf,
    pub public_key: PathBuf,
}

/// How tokens are signed and what verification requires.
#[derive(Debug, Clone, PartialEq)]
pub struct SigningOptions {
    pub algorithm: Algorithm,
    pub expires_in: Duration,
    pub issuer: Option<String>,
    pub audience: Option<String>,
    pub subject: Option<String>,
    /// Extra fields merged into the JOSE header (e.g. `kid`)
    pub header: Map<String, Value>,
    /// Tolerance applied to `exp` during verification
    pub leeway: Duration,
}

impl Default for SigningOptions {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::RS256,
            expires_in: DEFAULT_EXPIRES_IN,
            issuer: None,
            audience: None,
            subject: None,
            header: Map::new(),
            leeway: Duration::ZERO,
        }
    }
}

/// Why a token was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TokenRejection {
    #[error("Token exceeds maximum size")]
    TooLarge,

    #[error("Token is malformed")]
    Malformed,

    #[error("Signature verification failed")]
    InvalidSignature,

    #[error("Token algorithm does not match the configured algorithm")]
    AlgorithmMismatch,

    #[error("Token has expired")]
    Expired,

    #[error("Token issuer does not match")]
    InvalidIssuer,

    #[error("Token audience does not match")]
    InvalidAudience,

    #[error("Token subject does not match")]
    InvalidSubject,

    #[error("Verification key unavailable")]
    KeyUnavailable,

    #[error("Token claims are invalid")]
    InvalidClaims,
}

impl TokenRejection {
    /// Bounded label for metrics.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenRejection::TooLarge => "too_large",
            TokenRejection::Malformed => "malformed",
            TokenRejection::InvalidSignature => "invalid_signature",
            TokenRejection::AlgorithmMismatch => "algorithm_mismatch",
            TokenRejection::Expired => "expired",
            TokenRejection::InvalidIssuer => "invalid_issuer",
            TokenRejection::InvalidAudience => "invalid_audience",
            TokenRejection::InvalidSubject => "invalid_subject",
            TokenRejection::KeyUnavailable => "key_unavailable",
            TokenRejection::InvalidClaims => "invalid_claims",
        }
    }
}

impl From<jsonwebtoken::errors::Error> for TokenRejection {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => TokenRejection::Expired,
            ErrorKind::InvalidSignature => TokenRejection::InvalidSignature,
            ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
                TokenRejection::AlgorithmMismatch
            }
            ErrorKind::InvalidIssuer => TokenRejection::InvalidIssuer,
            ErrorKind::InvalidAudience => TokenRejection::InvalidAudience,
            ErrorKind::InvalidSubject => TokenRejection::InvalidSubject,
            ErrorKind::MissingRequiredClaim(_) | ErrorKind::ImmatureSignature => {
                TokenRejection::InvalidClaims
            }
            _ => TokenRejection::Malformed,
        }
    }
}

/// True for the algorithms this service can sign and verify with.
#[must_use]
pub fn is_supported_algorithm(algorithm: Algorithm) -> bool {
    !matches!(
        algorithm,
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
    )
}

fn encoding_key(algorithm: Algorithm, pem: &[u8]) -> jsonwebtoken::errors::Result<EncodingKey> {
    match algorithm {
        Algorithm::RS256
        | Algorithm::RS384
        | Algorithm::RS512
        | Algorithm::PS256
        | Algorithm::PS384
        | Algorithm::PS512 => EncodingKey::from_rsa_pem(pem),
        Algorithm::ES256 | Algorithm::ES384 => EncodingKey::from_ec_pem(pem),
        Algorithm::EdDSA => EncodingKey::from_ed_pem(pem),
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => {
            Err(ErrorKind::InvalidAlgorithm.into())
        }
    }
}

fn decoding_key(algorithm: Algorithm, pem: &[u8]) -> jsonwebtoken::errors::Result<DecodingKey> {
    match algorithm {
        Algorithm::RS256
        | Algorithm::RS384
        | Algorithm::RS512
        | Algorithm::PS256
        | Algorithm::PS384
        | Algorithm::PS512 => DecodingKey::from_rsa_pem(pem),
        Algorithm::ES256 | Algorithm::ES384 => DecodingKey::from_ec_pem(pem),
        Algorithm::EdDSA => DecodingKey::from_ed_pem(pem),
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => {
            Err(ErrorKind::InvalidAlgorithm.into())
        }
    }
}

fn read_key_file(path: &Path) -> Result<SecretString, GkError> {
    debug!(target: "gk.token", path = %path.display(), "Loading key file");
    std::fs::read_to_string(path)
        .map(SecretString::from)
        .map_err(|e| {
            warn!(target: "gk.token", path = %path.display(), error = %e, "Failed to read key file");
            GkError::KeyLoad(format!("{}: {e}", path.display()))
        })
}

/// Issues and verifies session tokens.
pub struct TokenAuthenticator {
    keys: KeyPaths,
    options: SigningOptions,
    secrets: Arc<LocalCache<SecretString>>,
}

impl std::fmt::Debug for TokenAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenAuthenticator")
            .field("keys", &self.keys)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl TokenAuthenticator {
    #[must_use]
    pub fn new(
        keys: KeyPaths,
        options: SigningOptions,
        secrets: Arc<LocalCache<SecretString>>,
    ) -> Self {
        Self {
            keys,
            options,
            secrets,
        }
    }

    #[must_use]
    pub fn options(&self) -> &SigningOptions {
        &self.options
    }

    fn signing_pem(&self) -> Result<SecretString, GkError> {
        self.secrets.upsert(
            SIGNING_KEY_CACHE_KEY,
            || read_key_file(&self.keys.private_key),
            None,
        )
    }

    fn verification_pem(&self) -> Result<SecretString, GkError> {
        self.secrets.upsert(
            VERIFICATION_KEY_CACHE_KEY,
            || read_key_file(&self.keys.public_key),
            None,
        )
    }

    /// Load and parse both keys.
    ///
    /// Called once at startup so a missing or unusable key stops the process
    /// instead of failing the first login.
    ///
    /// # Errors
    ///
    /// Returns `GkError::KeyLoad` if a file cannot be read and
    /// `GkError::Crypto` if it is not a valid key for the configured
    /// algorithm.
    pub fn preload_keys(&self) -> Result<(), GkError> {
        let algorithm = self.options.algorithm;

        let signing = self.signing_pem()?;
        encoding_key(algorithm, signing.expose_secret().as_bytes()).map_err(|e| {
            GkError::Crypto(format!("Invalid signing key for {algorithm:?}: {e}"))
        })?;

        let verification = self.verification_pem()?;
        decoding_key(algorithm, verification.expose_secret().as_bytes()).map_err(|e| {
            GkError::Crypto(format!("Invalid verification key for {algorithm:?}: {e}"))
        })?;

        debug!(target: "gk.token", algorithm = ?algorithm, "Signing keys loaded");
        Ok(())
    }

    /// True when the signing key can be loaded.
    #[must_use]
    pub fn signing_key_available(&self) -> bool {
        self.signing_pem().is_ok()
    }

    /// Issue a signed token for `claims`.
    ///
    /// The payload is `claims` plus `iat`, `exp` (`expires_in` or the
    /// configured lifetime) and the configured `iss`, `aud` and `sub`.
    ///
    /// # Errors
    ///
    /// Returns `GkError::InvalidClaims` when `claims.extra` uses a reserved
    /// claim name, `GkError::KeyLoad` when the signing key cannot be read,
    /// and `GkError::Crypto` when signing fails.
    #[instrument(skip_all)]
    pub fn encode(&self, claims: &Claims, expires_in: Option<Duration>) -> Result<String, GkError> {
        let result = self.sign(claims, expires_in);
        record_token_issuance(if result.is_ok() { "success" } else { "error" });
        result
    }

    fn sign(&self, claims: &Claims, expires_in: Option<Duration>) -> Result<String, GkError> {
        if let Some(name) = claims.extra.keys().find(|name| claims::is_reserved_claim(name)) {
            return Err(GkError::InvalidClaims(format!(
                "'{name}' is reserved and cannot be set as an extra claim"
            )));
        }

        let lifetime = expires_in.unwrap_or(self.options.expires_in);
        let lifetime = i64::try_from(lifetime.as_secs())
            .map_err(|_| GkError::InvalidClaims("Token lifetime is too large".to_string()))?;
        let issued_at = Utc::now().timestamp();
        let expires_at = issued_at
            .checked_add(lifetime)
            .ok_or_else(|| GkError::InvalidClaims("Token lifetime is too large".to_string()))?;

        let Value::Object(mut payload) = serde_json::to_value(claims)
            .map_err(|e| GkError::InvalidClaims(e.to_string()))?
        else {
            return Err(GkError::Internal);
        };
        payload.insert("iat".to_string(), Value::from(issued_at));
        payload.insert("exp".to_string(), Value::from(expires_at));
        if let Some(issuer) = &self.options.issuer {
            payload.insert("iss".to_string(), Value::from(issuer.clone()));
        }
        if let Some(audience) = &self.options.audience {
            payload.insert("aud".to_string(), Value::from(audience.clone()));
        }
        if let Some(subject) = &self.options.subject {
            payload.insert("sub".to_string(), Value::from(subject.clone()));
        }

        let Value::Object(mut header) = serde_json::to_value(Header::new(self.options.algorithm))
            .map_err(|e| GkError::Crypto(format!("Failed to serialize header: {e}")))?
        else {
            return Err(GkError::Internal);
        };
        for (name, value) in &self.options.header {
            header.entry(name.clone()).or_insert_with(|| value.clone());
        }

        let header_json = serde_json::to_vec(&header)
            .map_err(|e| GkError::Crypto(format!("Failed to serialize header: {e}")))?;
        let payload_json = serde_json::to_vec(&payload)
            .map_err(|e| GkError::InvalidClaims(e.to_string()))?;
        let message = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(header_json),
            URL_SAFE_NO_PAD.encode(payload_json)
        );

        let pem = self.signing_pem()?;
        let key = encoding_key(self.options.algorithm, pem.expose_secret().as_bytes())
            .map_err(|e| GkError::Crypto(format!("Invalid signing key: {e}")))?;
        let signature = jsonwebtoken::crypto::sign(message.as_bytes(), &key, self.options.algorithm)
            .map_err(|e| GkError::Crypto(format!("Signing failed: {e}")))?;

        Ok(format!("{message}.{signature}"))
    }

    /// Verify `token` and return its claims.
    ///
    /// # Errors
    ///
    /// Returns the [`TokenRejection`] describing why the token was refused.
    /// Rejections are logged and counted here; callers treat any error as
    /// "not authenticated".
    #[instrument(skip_all)]
    pub fn decode(&self, token: &str) -> Result<Claims, TokenRejection> {
        let result = self.verify(token);
        match &result {
            Ok(_) => record_token_validation("success", None),
            Err(rejection) => {
                if *rejection == TokenRejection::KeyUnavailable {
                    warn!(target: "gk.token", "Token rejected: verification key unavailable");
                } else {
                    debug!(target: "gk.token", reason = rejection.as_str(), "Token rejected");
                }
                record_token_validation("error", Some(rejection.as_str()));
            }
        }
        result
    }

    fn verify(&self, token: &str) -> Result<Claims, TokenRejection> {
        if token.len() > MAX_JWT_SIZE_BYTES {
            return Err(TokenRejection::TooLarge);
        }

        let algorithm = self.options.algorithm;
        let pem = self
            .verification_pem()
            .map_err(|_| TokenRejection::KeyUnavailable)?;
        let key = decoding_key(algorithm, pem.expose_secret().as_bytes())
            .map_err(|_| TokenRejection::KeyUnavailable)?;

        let mut validation = Validation::new(algorithm);
        validation.leeway = self.options.leeway.as_secs();
        validation.set_required_spec_claims(&["exp"]);
        if let Some(issuer) = &self.options.issuer {
            validation.set_issuer(&[issuer]);
        }
        match &self.options.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }
        validation.sub.clone_from(&self.options.subject);

        let data = jsonwebtoken::decode::<Map<String, Value>>(token, &key, &validation)?;

        let mut payload = data.claims;
        for name in REGISTERED_CLAIMS {
            payload.remove(name);
        }

        serde_json::from_value(Value::Object(payload)).map_err(|_| TokenRejection::InvalidClaims)
    }
}
