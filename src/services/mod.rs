//! Business logic services.
//!
//! Services contain core logic separated from HTTP handlers and middleware:
//! the admission gate, the HMAC signature layer, and admin authentication.

pub mod admin_auth;
pub mod admission;
pub mod signature;
