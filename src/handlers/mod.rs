//! HTTP request handlers (route handlers).
//!
//! Each handler is an async function that:
//! 1. Receives HTTP request data (JSON body, URL params, etc.)
//! 2. Performs business logic (database queries, validation)
//! 3. Returns HTTP response (JSON, status code)

/// Admin login and privileged endpoints
pub mod admin;
/// Health check endpoint
pub mod health;
/// API key issuing, dashboard, and revocation
pub mod keys;
/// Public movie catalog endpoints (behind the admission gate)
pub mod movies;
