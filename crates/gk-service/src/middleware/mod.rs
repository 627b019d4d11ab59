//! HTTP middleware for the Gatekeeper service.

pub mod auth;
pub mod http_metrics;

pub use auth::{attach_auth_context, enforce_mappings, AuthState};
pub use http_metrics::http_metrics_middleware;
