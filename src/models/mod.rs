//! Data models representing database entities.
//!
//! This module contains all data structures that map to database tables.

/// API key credential model
pub mod api_key;
/// Movie catalog models
pub mod movie;
/// Owner account model
pub mod user;
