//! HTTP request handlers for the Gatekeeper service.

pub mod health;
pub mod metrics;
pub mod session;

pub use health::{health_check, readiness_check};
pub use metrics::metrics_handler;
pub use session::{info, logout};
