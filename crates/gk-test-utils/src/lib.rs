//! # Gatekeeper Test Utilities
//!
//! Shared test utilities for the Gatekeeper crates.
//!
//! This crate provides:
//! - Deterministic crypto fixtures (fixed Ed25519 keys written as PEM files)
//! - Claim builders and a raw signer for tokens the service would never issue
//! - A router harness (`TestGatekeeper`) for `oneshot` tests
//!
//! ## Usage
//!
//! ```rust,ignore
//! use gk_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> Result<(), anyhow::Error> {
//!     let gk = TestGatekeeper::new(vec![mapping("^/admin", &["ADMIN"], &[])])?;
//!     let token = gk.issue_token(&TestClaimsBuilder::new().with_role("ADMIN").build())?;
//!
//!     let response = gk.router(app_routes()).oneshot(request_with_cookie(&token)).await?;
//!     assert_eq!(response.status(), StatusCode::OK);
//!     Ok(())
//! }
//! ```

pub mod crypto_fixtures;
pub mod harness;
pub mod token_builders;

// Re-export commonly used items
pub use crypto_fixtures::*;
pub use harness::*;
pub use token_builders::*;
