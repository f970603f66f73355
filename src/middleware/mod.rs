//! HTTP middleware components.
//!
//! Middleware are functions that run before route handlers.
//! They can:
//! - Authenticate requests
//! - Short-circuit requests (reject unauthorized)
//! - Decorate responses (rate-limit headers)

/// Admin secret / session authentication middleware
pub mod admin;
/// Admission-gate middleware for the public API
pub mod auth;
