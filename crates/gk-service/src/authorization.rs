//! Role-based URL policies.
//!
//! Policies are evaluated in configuration order and the first one whose
//! pattern matches the URL (and whose method list is empty or contains the
//! request method) decides which roles are required.

use crate::config::ConfigError;
use crate::context::RequestAuthContext;
use crate::errors::GkError;
use crate::token::claims::deserialize_one_or_many;
use crate::token::Claims;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One URL policy as written in configuration:
/// `{"pattern": "^/admin", "roles": ["ADMIN"], "method": ["get", "post"]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthMapping {
    /// Regular expression searched for anywhere in the URL (not anchored
    /// unless the pattern itself uses `^`/`$`).
    pub pattern: String,

    /// Roles that grant access; empty means any authenticated user.
    #[serde(default, deserialize_with = "deserialize_one_or_many")]
    pub roles: BTreeSet<String>,

    /// HTTP methods the policy applies to, compared case-insensitively;
    /// empty means every method.
    #[serde(default, rename = "method", deserialize_with = "deserialize_one_or_many")]
    pub methods: BTreeSet<String>,
}

struct CompiledMapping {
    mapping: AuthMapping,
    regex: Regex,
    methods: BTreeSet<String>,
}

impl CompiledMapping {
    fn matches(&self, url: &str, method: &str) -> bool {
        self.regex.is_match(url)
            && (self.methods.is_empty() || self.methods.contains(&method.to_ascii_uppercase()))
    }
}

/// Ordered, compiled URL policies.
pub struct AuthorizationMapper {
    rules: Vec<CompiledMapping>,
}

impl std::fmt::Debug for AuthorizationMapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.rules.iter().map(|rule| &rule.mapping.pattern))
            .finish()
    }
}

impl AuthorizationMapper {
    /// Compile `mappings`, keeping their order.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidMappings` for a pattern that is not a
    /// valid regular expression.
    pub fn new(mappings: Vec<AuthMapping>) -> Result<Self, GkError> {
        let rules = mappings
            .into_iter()
            .enumerate()
            .map(|(index, mapping)| {
                let regex = Regex::new(&mapping.pattern).map_err(|e| {
                    ConfigError::InvalidMappings(format!(
                        "mapping {index} has an invalid pattern '{}': {e}",
                        mapping.pattern
                    ))
                })?;
                let methods = mapping
                    .methods
                    .iter()
                    .map(|m| m.to_ascii_uppercase())
                    .collect();
                Ok(CompiledMapping {
                    mapping,
                    regex,
                    methods,
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Ok(Self { rules })
    }

    /// Policies in evaluation order.
    pub fn mappings(&self) -> impl Iterator<Item = &AuthMapping> {
        self.rules.iter().map(|rule| &rule.mapping)
    }

    /// First policy matching `url` and `method`, if any.
    #[must_use]
    pub fn is_url_match(&self, url: &str, method: &str) -> Option<&AuthMapping> {
        self.rules
            .iter()
            .find(|rule| rule.matches(url, method))
            .map(|rule| &rule.mapping)
    }

    /// Whether the request holds any of `required`.
    #[must_use]
    pub fn has_access(&self, ctx: &RequestAuthContext, required: &BTreeSet<String>) -> bool {
        has_roles(ctx.claims(), required)
    }
}

/// Unauthenticated callers never have access. An empty `required` set
/// admits any authenticated caller; otherwise one shared role is enough.
#[must_use]
pub fn has_roles(claims: Option<&Claims>, required: &BTreeSet<String>) -> bool {
    match claims {
        None => false,
        Some(_) if required.is_empty() => true,
        Some(claims) => claims.roles.intersects(required),
    }
}
