//! Gatekeeper service library.
//!
//! JWT session authentication and role-based URL authorization for axum
//! applications:
//!
//! - [`token::TokenAuthenticator`] issues and verifies signed session tokens
//!   with keys loaded once through the cache layer
//! - [`context::RequestAuthContext`] carries one request's authentication
//!   state and starts or ends sessions
//! - [`authorization::AuthorizationMapper`] evaluates ordered URL policies
//! - [`middleware`] and [`routes`] wire these into an axum router
//!
//! The `gatekeeper` binary serves the session endpoints on their own; an
//! embedding application passes its routes to [`routes::build_routes`].

pub mod authorization;
pub mod config;
pub mod context;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod observability;
pub mod routes;
pub mod token;
