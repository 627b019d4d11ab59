//! Common utilities and types shared across Gatekeeper crates.

#![warn(clippy::pedantic)]

/// Module for shared configuration types
pub mod config;

/// Module for secret types that prevent accidental logging
pub mod secret;

/// Module for JWT constants and `Authorization` header parsing
pub mod jwt;
