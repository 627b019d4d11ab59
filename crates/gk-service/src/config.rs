//! Gatekeeper configuration.
//!
//! Configuration is loaded from environment variables once at startup and
//! injected into the components that need it. The Redis URL is held as a
//! secret and redacted in Debug output.

use crate::authorization::AuthMapping;
use crate::context::{AuthSettings, CookieSettings};
use crate::token::{is_supported_algorithm, KeyPaths, SigningOptions, DEFAULT_EXPIRES_IN};
use common::config::{ObservabilityConfig, RedisConfig};
use gk_cache::{CacheConfig, CacheMethod};
use jsonwebtoken::Algorithm;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default HTTP bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Upper bound for `AUTH_JWT_LEEWAY_SECONDS`.
pub const MAX_JWT_LEEWAY_SECONDS: u64 = 300;

/// Header fields the token layer always sets itself.
const RESERVED_HEADER_FIELDS: [&str; 2] = ["alg", "typ"];

#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// Signing and verification key files.
    pub keys: KeyPaths,

    /// Token signing and verification options.
    pub signing: SigningOptions,

    /// Session paths, redirects and cookie attributes.
    pub auth: AuthSettings,

    /// Ordered URL policies; the first match wins.
    pub mappings: Vec<AuthMapping>,

    /// Primary cache backend selection.
    pub cache: CacheConfig,

    pub observability: ObservabilityConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {name}: {reason}")]
    InvalidValue { name: String, reason: String },

    #[error("Invalid authorization mappings: {0}")]
    InvalidMappings(String),

    #[error("Unsupported JWT algorithm {0}: a public/private key algorithm is required")]
    UnsupportedAlgorithm(String),
}

fn invalid(name: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        name: name.to_string(),
        reason: reason.into(),
    }
}

fn required(vars: &HashMap<String, String>, name: &str) -> Result<String, ConfigError> {
    vars.get(name)
        .filter(|value| !value.trim().is_empty())
        .cloned()
        .ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
}

fn string_or(vars: &HashMap<String, String>, name: &str, default: &str) -> String {
    vars.get(name)
        .cloned()
        .unwrap_or_else(|| default.to_string())
}

/// Route paths must be absolute; axum refuses to mount anything else.
fn route_path(vars: &HashMap<String, String>, name: &str, default: &str) -> Result<String, ConfigError> {
    let path = string_or(vars, name, default);
    if path.starts_with('/') {
        Ok(path)
    } else {
        Err(invalid(name, format!("must start with '/', got '{path}'")))
    }
}

fn optional_string(vars: &HashMap<String, String>, name: &str) -> Option<String> {
    vars.get(name).filter(|value| !value.is_empty()).cloned()
}

fn parse_bool(vars: &HashMap<String, String>, name: &str, default: bool) -> Result<bool, ConfigError> {
    match vars.get(name) {
        None => Ok(default),
        Some(value) => match value.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            other => Err(invalid(name, format!("expected a boolean, got '{other}'"))),
        },
    }
}

fn parse_u64(vars: &HashMap<String, String>, name: &str) -> Result<Option<u64>, ConfigError> {
    vars.get(name)
        .map(|value| {
            value
                .trim()
                .parse::<u64>()
                .map_err(|e| invalid(name, format!("expected a non-negative integer, got '{value}': {e}")))
        })
        .transpose()
}

fn parse_timeout_ms(
    vars: &HashMap<String, String>,
    name: &str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match parse_u64(vars, name)? {
        None => Ok(default),
        Some(0) => Err(invalid(name, "must be greater than 0")),
        Some(ms) => Ok(Duration::from_millis(ms)),
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let bind_address = string_or(vars, "BIND_ADDRESS", DEFAULT_BIND_ADDRESS);

        let keys = KeyPaths {
            private_key: PathBuf::from(required(vars, "AUTH_PRIVATE_KEY_PATH")?),
            public_key: PathBuf::from(required(vars, "AUTH_PUBLIC_KEY_PATH")?),
        };

        let signing = Self::signing_from_vars(vars)?;
        let auth = Self::auth_from_vars(vars)?;

        let mappings = match vars.get("AUTH_MAPPINGS") {
            Some(raw) if !raw.trim().is_empty() => serde_json::from_str::<Vec<AuthMapping>>(raw)
                .map_err(|e| ConfigError::InvalidMappings(e.to_string()))?,
            _ => Vec::new(),
        };

        let cache = Self::cache_from_vars(vars)?;

        let observability = ObservabilityConfig {
            log_level: string_or(vars, "LOG_LEVEL", "info"),
            json_logs: parse_bool(vars, "LOG_JSON", false)?,
        };

        Ok(Config {
            bind_address,
            keys,
            signing,
            auth,
            mappings,
            cache,
            observability,
        })
    }

    fn signing_from_vars(vars: &HashMap<String, String>) -> Result<SigningOptions, ConfigError> {
        let algorithm = match vars.get("AUTH_JWT_ALGORITHM") {
            None => Algorithm::RS256,
            Some(name) => {
                let algorithm = Algorithm::from_str(name.trim())
                    .map_err(|_| invalid("AUTH_JWT_ALGORITHM", format!("unknown algorithm '{name}'")))?;
                if !is_supported_algorithm(algorithm) {
                    return Err(ConfigError::UnsupportedAlgorithm(name.clone()));
                }
                algorithm
            }
        };

        let expires_in = match vars.get("AUTH_JWT_EXPIRES_IN") {
            None => DEFAULT_EXPIRES_IN,
            Some(value) => {
                let expires_in = humantime::parse_duration(value.trim()).map_err(|e| {
                    invalid("AUTH_JWT_EXPIRES_IN", format!("'{value}' is not a duration: {e}"))
                })?;
                if expires_in.as_secs() == 0 {
                    return Err(invalid("AUTH_JWT_EXPIRES_IN", "must be at least one second"));
                }
                expires_in
            }
        };

        let header = match vars.get("AUTH_JWT_HEADER") {
            None => Map::new(),
            Some(raw) => {
                let header: Map<String, Value> = serde_json::from_str(raw).map_err(|e| {
                    invalid("AUTH_JWT_HEADER", format!("expected a JSON object: {e}"))
                })?;
                if let Some(field) = RESERVED_HEADER_FIELDS
                    .iter()
                    .find(|field| header.contains_key(**field))
                {
                    return Err(invalid(
                        "AUTH_JWT_HEADER",
                        format!("'{field}' is set by the token layer"),
                    ));
                }
                header
            }
        };

        let leeway_seconds = parse_u64(vars, "AUTH_JWT_LEEWAY_SECONDS")?.unwrap_or(0);
        if leeway_seconds > MAX_JWT_LEEWAY_SECONDS {
            return Err(invalid(
                "AUTH_JWT_LEEWAY_SECONDS",
                format!("must not exceed {MAX_JWT_LEEWAY_SECONDS} seconds, got {leeway_seconds}"),
            ));
        }

        Ok(SigningOptions {
            algorithm,
            expires_in,
            issuer: optional_string(vars, "AUTH_JWT_ISSUER"),
            audience: optional_string(vars, "AUTH_JWT_AUDIENCE"),
            subject: optional_string(vars, "AUTH_JWT_SUBJECT"),
            header,
            leeway: Duration::from_secs(leeway_seconds),
        })
    }

    fn auth_from_vars(vars: &HashMap<String, String>) -> Result<AuthSettings, ConfigError> {
        let defaults = AuthSettings::default();

        // Zero keeps the original meaning of a session-only cookie
        let max_age = parse_u64(vars, "AUTH_COOKIE_MAX_AGE_SECONDS")?
            .filter(|seconds| *seconds > 0)
            .map(Duration::from_secs);

        let cookie = CookieSettings {
            http_only: parse_bool(vars, "AUTH_COOKIE_HTTP_ONLY", defaults.cookie.http_only)?,
            secure: parse_bool(vars, "AUTH_COOKIE_SECURE", defaults.cookie.secure)?,
            max_age,
            ..defaults.cookie.clone()
        };

        let mut settings = defaults;
        settings.login_path = route_path(vars, "AUTH_LOGIN_PATH", &settings.login_path)?;
        settings.info_path = route_path(vars, "AUTH_INFO_PATH", &settings.info_path)?;
        settings.logout_path = route_path(vars, "AUTH_LOGOUT_PATH", &settings.logout_path)?;
        settings.login_success_url =
            string_or(vars, "AUTH_LOGIN_SUCCESS_URL", &settings.login_success_url);
        settings.logout_success_url =
            string_or(vars, "AUTH_LOGOUT_SUCCESS_URL", &settings.logout_success_url);
        settings.cookie = cookie;
        Ok(settings)
    }

    fn cache_from_vars(vars: &HashMap<String, String>) -> Result<CacheConfig, ConfigError> {
        let defaults = CacheConfig::default();

        let method = match vars.get("CACHE_METHOD") {
            None => CacheMethod::Local,
            Some(value) => value
                .parse::<CacheMethod>()
                .map_err(|e| invalid("CACHE_METHOD", e.to_string()))?,
        };

        let redis = match method {
            CacheMethod::Local => None,
            CacheMethod::Redis => {
                let mut redis = RedisConfig::new(required(vars, "REDIS_URL")?);
                if let Some(prefix) = vars.get("CACHE_PREFIX") {
                    redis.key_prefix.clone_from(prefix);
                }
                redis.connect_timeout =
                    parse_timeout_ms(vars, "CACHE_CONNECT_TIMEOUT_MS", redis.connect_timeout)?;
                redis.operation_timeout =
                    parse_timeout_ms(vars, "CACHE_OPERATION_TIMEOUT_MS", redis.operation_timeout)?;
                Some(redis)
            }
        };

        let population_timeout = parse_timeout_ms(
            vars,
            "CACHE_POPULATION_TIMEOUT_MS",
            defaults.population_timeout,
        )?;

        Ok(CacheConfig {
            method,
            redis,
            population_timeout,
        })
    }
}
