//! Durable-store contract consumed by the admission gate.
//!
//! The gate never talks to sqlx directly; it goes through this trait so that
//! the quota, cleanup, and session logic can be exercised against an
//! in-memory store in tests. All coordination between concurrent requests for
//! the same key happens through the store's atomicity guarantees; the gate
//! itself caches nothing between invocations.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

/// Error raised by a store backend.
///
/// The gate converts these into a `ServiceUnavailable` decision at its
/// boundary; handlers convert them into HTTP 500 via `AppError`.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// An active API key as seen by the gate: just the row id and the stored
/// per-key limit. The caller-supplied key string itself is the lookup value.
#[derive(Debug, Clone, Copy)]
pub struct ActiveKey {
    pub id: Uuid,
    pub daily_limit: i32,
}

/// Point lookups and atomic mutations over the relational store.
///
/// Methods map one-to-one onto the operations the gate needs; nothing here is
/// batched or pipelined: each call is an independent round trip.
#[async_trait]
pub trait GateStore: Send + Sync + 'static {
    /// Exact-match lookup of an active key. No partial matches, no case
    /// folding. Revoked (inactive) keys are invisible here.
    async fn find_active_key(&self, key: &str) -> Result<Option<ActiveKey>, StoreError>;

    /// Request count for (key, UTC day); 0 when no row exists yet.
    async fn daily_usage(&self, key_id: Uuid, date: NaiveDate) -> Result<i64, StoreError>;

    /// Atomically insert-or-increment the (key, day) counter and return the
    /// post-increment count. This is the one operation that must be
    /// linearizable: a lost update here would under-count admitted traffic.
    async fn increment_daily_usage(
        &self,
        key_id: Uuid,
        date: NaiveDate,
    ) -> Result<i64, StoreError>;

    /// Append an audit row for an admitted request.
    async fn append_usage_log(
        &self,
        key_id: Uuid,
        endpoint: &str,
        status_code: i32,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// When retention cleanup last ran for this key, if ever.
    async fn last_cleanup_at(&self, key_id: Uuid) -> Result<Option<DateTime<Utc>>, StoreError>;

    /// Delete usage logs older than the cutoff, across all keys. Returns the
    /// number of rows removed. Idempotent.
    async fn delete_usage_logs_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;

    /// Record that cleanup ran for this key at the given instant.
    async fn record_cleanup(&self, key_id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Expiry timestamp of an admin session token, if the token exists.
    async fn find_admin_session(
        &self,
        token: &str,
    ) -> Result<Option<DateTime<Utc>>, StoreError>;

    /// Persist a freshly issued admin session.
    async fn insert_admin_session(
        &self,
        token: &str,
        admin_key: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Remove all sessions whose expiry is at or before `now`. Returns the
    /// number of rows removed.
    async fn delete_expired_admin_sessions(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;
}

pub mod postgres;

#[cfg(test)]
pub mod memory;
