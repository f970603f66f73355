//! API key model for authentication.
//!
//! Keys are bearer credentials: the key string itself is both the exact-match
//! lookup value and the HMAC signing secret for request signatures, so it is
//! stored verbatim rather than hashed. Revocation is a soft delete
//! (`is_active = false`); key rows are never physically removed.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// Key fields exposed to the owner on the dashboard and at issue time.
///
/// The full `api_keys` row also carries `daily_limit` and the
/// `last_cleanup_at` bookkeeping column; those are read exclusively through
/// the admission gate's store and never serialized to callers.
#[derive(Debug, Serialize, FromRow)]
pub struct ApiKeySummary {
    pub id: Uuid,
    pub api_key: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}
