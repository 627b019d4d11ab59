//! Token payload types.
//!
//! [`Claims`] is what callers hand to `encode` and what `decode` returns.
//! Registered JWT claims (`iss`, `aud`, `sub`, `iat`, `exp`, `nbf`, `jti`)
//! never appear here: they are added from the signing options when a token
//! is issued and stripped again when it is verified.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Claim names owned by the token layer.
pub const REGISTERED_CLAIMS: [&str; 7] = ["iss", "aud", "sub", "iat", "exp", "nbf", "jti"];

/// Claim names that `extra` may not use.
pub(crate) fn is_reserved_claim(name: &str) -> bool {
    name == "username" || name == "roles" || REGISTERED_CLAIMS.contains(&name)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

/// Accepts `"admin"`, `["admin", "editor"]` or `null`.
pub(crate) fn deserialize_one_or_many<'de, D>(deserializer: D) -> Result<BTreeSet<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => BTreeSet::new(),
        Some(OneOrMany::One(role)) => BTreeSet::from([role]),
        Some(OneOrMany::Many(roles)) => roles.into_iter().collect(),
    })
}

/// Normalized set of role names held by a user.
///
/// A token carrying a single role as a bare string decodes to a one-element
/// set; a missing or null `roles` claim decodes to the empty set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RoleSet(BTreeSet<String>);

impl RoleSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn contains(&self, role: &str) -> bool {
        self.0.contains(role)
    }

    /// True when at least one of `required` is held.
    #[must_use]
    pub fn intersects(&self, required: &BTreeSet<String>) -> bool {
        !self.0.is_disjoint(required)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'de> Deserialize<'de> for RoleSet {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserialize_one_or_many(deserializer).map(RoleSet)
    }
}

impl<S: Into<String>> FromIterator<S> for RoleSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        RoleSet(iter.into_iter().map(Into::into).collect())
    }
}

impl From<BTreeSet<String>> for RoleSet {
    fn from(roles: BTreeSet<String>) -> Self {
        RoleSet(roles)
    }
}

/// The user carried by a session token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub username: String,

    #[serde(default)]
    pub roles: RoleSet,

    /// Application-defined claims, serialized alongside `username` and
    /// `roles` at the top level of the payload.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Claims {
    pub fn new<I, S>(username: impl Into<String>, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            username: username.into(),
            roles: roles.into_iter().collect(),
            extra: Map::new(),
        }
    }

    /// Add an application-defined claim.
    #[must_use]
    pub fn with_claim(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(name.into(), value.into());
        self
    }
}
