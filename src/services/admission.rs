//! The admission gate.
//!
//! Decides whether a request identified by an API key may proceed, and
//! records the decision's effects durably. One call covers the full pipeline:
//! key lookup, optional HMAC verification, quota check, atomic counter
//! increment, usage-log append, and opportunistic retention cleanup.
//!
//! # Side-effect rules
//!
//! Counter mutation and log append happen only on the admitted path. Denied
//! paths never mutate usage state, so a flood of invalid-key or forged
//! requests cannot corrupt legitimate quota accounting. A decision is only
//! returned after the side-effecting writes complete: a request that fails
//! partway is `ServiceUnavailable`, never `Allowed`.
//!
//! # Races
//!
//! The quota pre-check is advisory. Concurrent admitted requests for the same
//! key can race past it together, overrunning the limit by at most the number
//! of in-flight requests; the atomic increment-and-return keeps the stored
//! count exact and `remaining` clamps at 0. This bounded overrun is accepted
//! in lieu of wrapping check and increment in a transaction.

use std::sync::Arc;

use axum::http::StatusCode;
use chrono::{DateTime, Days, Duration, NaiveTime, Utc};
use uuid::Uuid;

use crate::clock::Clock;
use crate::services::signature::{self, SignatureError, SignedRequest};
use crate::store::{ActiveKey, GateStore, StoreError};

/// Fixed operational daily limit (free plan), applied regardless of the
/// per-key `daily_limit` field unless `enforce_per_key_limits` is set.
pub const DEFAULT_DAILY_LIMIT: i64 = 100;

/// Usage-log rows older than this many days are eligible for deletion.
pub const RETENTION_DAYS: i64 = 90;

/// Minimum interval between cleanup runs for one key.
pub const CLEANUP_INTERVAL_HOURS: i64 = 24;

/// Why a request was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// Key absent, unknown, malformed, or revoked
    InvalidKey,
    /// Signature header present but timestamp missing (or vice versa)
    MissingSignature,
    /// Signature timestamp outside the 5-minute replay window
    TimestampExpired,
    /// Computed HMAC digest differs from the supplied signature
    SignatureMismatch,
    /// Daily request cap reached
    QuotaExceeded,
}

impl DenyReason {
    /// HTTP status the denial maps to.
    pub fn status(&self) -> StatusCode {
        match self {
            DenyReason::QuotaExceeded => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::UNAUTHORIZED,
        }
    }

    /// Stable machine-readable code for response bodies.
    pub fn code(&self) -> &'static str {
        match self {
            DenyReason::InvalidKey => "invalid_api_key",
            DenyReason::MissingSignature => "missing_signature",
            DenyReason::TimestampExpired => "timestamp_expired",
            DenyReason::SignatureMismatch => "signature_mismatch",
            DenyReason::QuotaExceeded => "rate_limit_exceeded",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            DenyReason::InvalidKey => {
                "The provided API key is invalid or has been deactivated"
            }
            DenyReason::MissingSignature => "Missing HMAC signature or timestamp",
            DenyReason::TimestampExpired => "Request timestamp expired",
            DenyReason::SignatureMismatch => "Invalid signature",
            DenyReason::QuotaExceeded => {
                "Daily request limit exceeded. Limit resets at midnight UTC"
            }
        }
    }
}

impl From<SignatureError> for DenyReason {
    fn from(err: SignatureError) -> Self {
        match err {
            SignatureError::Missing => DenyReason::MissingSignature,
            SignatureError::TimestampExpired => DenyReason::TimestampExpired,
            SignatureError::Mismatch => DenyReason::SignatureMismatch,
        }
    }
}

/// Outcome of an authorization call.
///
/// Backend failures are a distinct variant: they must never be mistaken for
/// an authorization denial, and never default to allowed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allowed {
        key_id: Uuid,
        /// Requests left today after this one, floored at 0
        remaining: i64,
        /// Next UTC midnight
        reset_at: DateTime<Utc>,
    },
    Denied {
        reason: DenyReason,
        status: StatusCode,
        remaining: Option<i64>,
        reset_at: Option<DateTime<Utc>>,
    },
    ServiceUnavailable,
}

impl Decision {
    fn deny(reason: DenyReason) -> Self {
        Decision::Denied {
            status: reason.status(),
            reason,
            remaining: None,
            reset_at: None,
        }
    }

    fn deny_quota(reset_at: DateTime<Utc>) -> Self {
        Decision::Denied {
            reason: DenyReason::QuotaExceeded,
            status: StatusCode::TOO_MANY_REQUESTS,
            remaining: Some(0),
            reset_at: Some(reset_at),
        }
    }
}

/// Tomorrow at 00:00:00 UTC, relative to `now`.
///
/// The quota window is a fixed UTC calendar day, not a rolling 24 hours, so
/// the reset instant never depends on which day's counter was read.
pub fn next_utc_midnight(now: DateTime<Utc>) -> DateTime<Utc> {
    (now.date_naive() + Days::new(1))
        .and_time(NaiveTime::MIN)
        .and_utc()
}

/// The gate. Stateless between calls: key validity, quota state, and session
/// validity are never cached in process memory, since each invocation may run
/// on a different instance.
pub struct AdmissionGate {
    store: Arc<dyn GateStore>,
    clock: Arc<dyn Clock>,
    enforce_per_key_limits: bool,
}

impl AdmissionGate {
    pub fn new(
        store: Arc<dyn GateStore>,
        clock: Arc<dyn Clock>,
        enforce_per_key_limits: bool,
    ) -> Self {
        Self {
            store,
            clock,
            enforce_per_key_limits,
        }
    }

    /// Authorize a request.
    ///
    /// `endpoint` is a logical route identifier used only for logging, never
    /// for authorization. `signed` carries the raw request pieces needed for
    /// HMAC verification; verification runs only when a signature header is
    /// actually present.
    pub async fn authorize(
        &self,
        key: &str,
        endpoint: &str,
        signed: Option<&SignedRequest<'_>>,
    ) -> Decision {
        match self.try_authorize(key, endpoint, signed).await {
            Ok(decision) => decision,
            Err(err) => {
                tracing::error!(%endpoint, error = %err, "store failure during authorization");
                Decision::ServiceUnavailable
            }
        }
    }

    async fn try_authorize(
        &self,
        key: &str,
        endpoint: &str,
        signed: Option<&SignedRequest<'_>>,
    ) -> Result<Decision, StoreError> {
        // 1. Exact-match lookup of an active key.
        let Some(active) = self.store.find_active_key(key).await? else {
            return Ok(Decision::deny(DenyReason::InvalidKey));
        };

        // 2. Signature verification, when the caller opted in. Terminal on
        //    failure and runs before any quota accounting.
        if let Some(signed) = signed {
            if signed.signature.is_some() {
                if let Err(err) = signature::verify(key, signed, self.clock.now_ms()) {
                    return Ok(Decision::deny(err.into()));
                }
            }
        }

        // 3-4. Advisory quota check against today's counter.
        let now = self.clock.now();
        let today = now.date_naive();
        let limit = self.effective_daily_limit(&active);

        let count = self.store.daily_usage(active.id, today).await?;
        if count >= limit {
            return Ok(Decision::deny_quota(next_utc_midnight(now)));
        }

        // 5. Admit: atomic insert-or-increment, then the audit row.
        let new_count = self.store.increment_daily_usage(active.id, today).await?;
        self.store
            .append_usage_log(active.id, endpoint, 200, now)
            .await?;

        // 6. Opportunistic retention cleanup, best-effort: a failed cleanup
        //    must not deny or fault the request that triggered it.
        if let Err(err) = self.maybe_cleanup(active.id, now).await {
            tracing::warn!(key_id = %active.id, error = %err, "retention cleanup failed");
        }

        Ok(Decision::Allowed {
            key_id: active.id,
            remaining: (limit - new_count).max(0),
            reset_at: next_utc_midnight(now),
        })
    }

    /// Resolve the limit the gate actually compares against.
    ///
    /// The stored per-key field and the operational constant disagree for
    /// keys issued by some paths; which one wins is a configuration decision,
    /// pending product clarification.
    fn effective_daily_limit(&self, key: &ActiveKey) -> i64 {
        if self.enforce_per_key_limits {
            key.daily_limit as i64
        } else {
            DEFAULT_DAILY_LIMIT
        }
    }

    /// Run retention cleanup at most once per key per rolling 24 hours.
    ///
    /// The marker is per-key but the deletion is a global date threshold, so
    /// cleanup frequency scales with traffic rather than a timer. Deletion is
    /// idempotent, which makes the imprecision harmless.
    async fn maybe_cleanup(&self, key_id: Uuid, now: DateTime<Utc>) -> Result<(), StoreError> {
        if let Some(last) = self.store.last_cleanup_at(key_id).await? {
            if now - last < Duration::hours(CLEANUP_INTERVAL_HOURS) {
                return Ok(());
            }
        }

        let cutoff = now - Duration::days(RETENTION_DAYS);
        let deleted = self.store.delete_usage_logs_before(cutoff).await?;
        if deleted > 0 {
            tracing::info!(deleted, "purged usage logs past retention window");
        }

        self.store.record_cleanup(key_id, now).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::memory::MemoryStore;
    use chrono::TimeZone;

    const KEY: &str = "mk_abc";

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 15, 30, 0).unwrap()
    }

    fn gate_with(
        enforce: bool,
    ) -> (Arc<MemoryStore>, Arc<ManualClock>, AdmissionGate) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::at(start()));
        let gate = AdmissionGate::new(store.clone(), clock.clone(), enforce);
        (store, clock, gate)
    }

    fn gate() -> (Arc<MemoryStore>, Arc<ManualClock>, AdmissionGate) {
        gate_with(false)
    }

    #[tokio::test]
    async fn allowed_increments_counter_by_exactly_one() {
        let (store, clock, gate) = gate();
        let key_id = store.add_key(KEY, true, 100);

        let decision = gate.authorize(KEY, "/api/movies", None).await;

        match decision {
            Decision::Allowed { key_id: id, remaining, .. } => {
                assert_eq!(id, key_id);
                assert_eq!(remaining, 99);
            }
            other => panic!("expected Allowed, got {other:?}"),
        }
        assert_eq!(store.counter(key_id, clock.now().date_naive()), Some(1));
        assert_eq!(store.logs().len(), 1);
        assert_eq!(store.logs()[0].endpoint, "/api/movies");
    }

    #[tokio::test]
    async fn unknown_key_denied_with_no_side_effects() {
        let (store, _clock, gate) = gate();

        let decision = gate.authorize("mk_never_issued", "/api/movies", None).await;

        assert_eq!(decision, Decision::deny(DenyReason::InvalidKey));
        assert!(store.logs().is_empty());
    }

    #[tokio::test]
    async fn revoked_key_denied() {
        let (store, clock, gate) = gate();
        let key_id = store.add_key(KEY, false, 100);

        let decision = gate.authorize(KEY, "/api/movies", None).await;

        assert_eq!(decision, Decision::deny(DenyReason::InvalidKey));
        assert_eq!(store.counter(key_id, clock.now().date_naive()), None);
    }

    #[tokio::test]
    async fn quota_exceeded_is_terminal_and_mutation_free() {
        let (store, clock, gate) = gate();
        let key_id = store.add_key(KEY, true, 100);
        let today = clock.now().date_naive();
        for _ in 0..100 {
            store.increment_daily_usage(key_id, today).await.unwrap();
        }

        let decision = gate.authorize(KEY, "/api/movies", None).await;

        match decision {
            Decision::Denied { reason, status, remaining, reset_at } => {
                assert_eq!(reason, DenyReason::QuotaExceeded);
                assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
                assert_eq!(remaining, Some(0));
                assert_eq!(
                    reset_at,
                    Some(Utc.with_ymd_and_hms(2025, 3, 2, 0, 0, 0).unwrap())
                );
            }
            other => panic!("expected Denied, got {other:?}"),
        }
        // The denial performed only the read
        assert_eq!(store.counter(key_id, today), Some(100));
        assert!(store.logs().is_empty());
    }

    #[tokio::test]
    async fn countdown_from_ninety_nine_to_denial() {
        let (store, _clock, gate) = gate();
        store.add_key(KEY, true, 100);

        for call in 1..=100i64 {
            match gate.authorize(KEY, "/api/movies", None).await {
                Decision::Allowed { remaining, .. } => assert_eq!(remaining, 100 - call),
                other => panic!("call {call}: expected Allowed, got {other:?}"),
            }
        }

        match gate.authorize(KEY, "/api/movies", None).await {
            Decision::Denied { reason, remaining, .. } => {
                assert_eq!(reason, DenyReason::QuotaExceeded);
                assert_eq!(remaining, Some(0));
            }
            other => panic!("expected Denied, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn reset_at_is_next_utc_midnight_regardless_of_count() {
        let (store, _clock, gate) = gate();
        store.add_key(KEY, true, 100);

        let expected = Utc.with_ymd_and_hms(2025, 3, 2, 0, 0, 0).unwrap();
        match gate.authorize(KEY, "/api/movies", None).await {
            Decision::Allowed { reset_at, .. } => assert_eq!(reset_at, expected),
            other => panic!("expected Allowed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn quota_resets_at_utc_midnight_with_a_new_counter_row() {
        let (store, clock, gate) = gate();
        let key_id = store.add_key(KEY, true, 100);
        let day_one = clock.now().date_naive();
        for _ in 0..100 {
            store.increment_daily_usage(key_id, day_one).await.unwrap();
        }
        assert!(matches!(
            gate.authorize(KEY, "/api/movies", None).await,
            Decision::Denied { .. }
        ));

        // Past midnight a fresh row starts; the old one is untouched
        clock.set(Utc.with_ymd_and_hms(2025, 3, 2, 0, 0, 1).unwrap());
        match gate.authorize(KEY, "/api/movies", None).await {
            Decision::Allowed { remaining, .. } => assert_eq!(remaining, 99),
            other => panic!("expected Allowed, got {other:?}"),
        }
        assert_eq!(store.counter(key_id, day_one), Some(100));
        assert_eq!(
            store.counter(key_id, clock.now().date_naive()),
            Some(1)
        );
    }

    #[tokio::test]
    async fn valid_signature_is_accepted() {
        let (store, clock, gate) = gate();
        store.add_key(KEY, true, 100);

        let ts = clock.now_ms().to_string();
        let sig = crate::services::signature::sign(KEY, &ts, "GET", "/api/movies", "");
        let signed = SignedRequest {
            method: "GET",
            path: "/api/movies",
            body: "",
            timestamp: Some(&ts),
            signature: Some(&sig),
        };

        assert!(matches!(
            gate.authorize(KEY, "/api/movies", Some(&signed)).await,
            Decision::Allowed { .. }
        ));
    }

    #[tokio::test]
    async fn forged_signature_never_consumes_quota() {
        let (store, clock, gate) = gate();
        let key_id = store.add_key(KEY, true, 100);

        let ts = clock.now_ms().to_string();
        let signed = SignedRequest {
            method: "GET",
            path: "/api/movies",
            body: "",
            timestamp: Some(&ts),
            signature: Some("0000000000000000"),
        };

        let decision = gate.authorize(KEY, "/api/movies", Some(&signed)).await;
        assert_eq!(decision, Decision::deny(DenyReason::SignatureMismatch));
        assert_eq!(store.counter(key_id, clock.now().date_naive()), None);
        assert!(store.logs().is_empty());
    }

    #[tokio::test]
    async fn replayed_signature_outside_window_is_expired() {
        let (store, clock, gate) = gate();
        store.add_key(KEY, true, 100);

        let ts = (clock.now_ms() - 300_001).to_string();
        let sig = crate::services::signature::sign(KEY, &ts, "GET", "/api/movies", "");
        let signed = SignedRequest {
            method: "GET",
            path: "/api/movies",
            body: "",
            timestamp: Some(&ts),
            signature: Some(&sig),
        };

        assert_eq!(
            gate.authorize(KEY, "/api/movies", Some(&signed)).await,
            Decision::deny(DenyReason::TimestampExpired)
        );
    }

    #[tokio::test]
    async fn signature_without_timestamp_is_missing() {
        let (store, _clock, gate) = gate();
        store.add_key(KEY, true, 100);

        let signed = SignedRequest {
            method: "GET",
            path: "/api/movies",
            body: "",
            timestamp: None,
            signature: Some("deadbeef"),
        };

        assert_eq!(
            gate.authorize(KEY, "/api/movies", Some(&signed)).await,
            Decision::deny(DenyReason::MissingSignature)
        );
    }

    #[tokio::test]
    async fn cleanup_runs_once_per_twenty_four_hours() {
        let (store, clock, gate) = gate();
        let key_id = store.add_key(KEY, true, 100);
        let ancient = clock.now() - Duration::days(120);
        store.push_log(key_id, "/api/movies", ancient);

        // First admitted request triggers cleanup: the ancient row goes
        gate.authorize(KEY, "/api/movies", None).await;
        assert!(store.logs().iter().all(|l| l.timestamp > ancient));

        // Within 24h the marker suppresses deletion
        store.push_log(key_id, "/api/movies", ancient);
        clock.advance(Duration::hours(23));
        gate.authorize(KEY, "/api/movies", None).await;
        assert!(store.logs().iter().any(|l| l.timestamp == ancient));

        // Past the marker interval it runs again
        clock.advance(Duration::hours(2));
        gate.authorize(KEY, "/api/movies", None).await;
        assert!(store.logs().iter().all(|l| l.timestamp > ancient));
    }

    #[tokio::test]
    async fn per_key_limit_honored_when_enforced() {
        let (store, _clock, gate) = gate_with(true);
        store.add_key(KEY, true, 2);

        assert!(matches!(
            gate.authorize(KEY, "/api/movies", None).await,
            Decision::Allowed { remaining: 1, .. }
        ));
        assert!(matches!(
            gate.authorize(KEY, "/api/movies", None).await,
            Decision::Allowed { remaining: 0, .. }
        ));
        assert!(matches!(
            gate.authorize(KEY, "/api/movies", None).await,
            Decision::Denied {
                reason: DenyReason::QuotaExceeded,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn per_key_limit_ignored_by_default() {
        let (store, _clock, gate) = gate();
        store.add_key(KEY, true, 2);

        // Third request sails past the stored limit of 2: the gate compares
        // against the operational constant
        gate.authorize(KEY, "/api/movies", None).await;
        gate.authorize(KEY, "/api/movies", None).await;
        assert!(matches!(
            gate.authorize(KEY, "/api/movies", None).await,
            Decision::Allowed { remaining: 97, .. }
        ));
    }

    #[tokio::test]
    async fn cleanup_failure_does_not_affect_the_decision() {
        let (store, clock, gate) = gate();
        let key_id = store.add_key(KEY, true, 100);
        let ancient = clock.now() - Duration::days(120);
        store.push_log(key_id, "/api/movies", ancient);
        store.fail_cleanup(true);

        // Deletion errors out, but the request it piggybacked on is admitted
        // with its counter and audit row intact
        match gate.authorize(KEY, "/api/movies", None).await {
            Decision::Allowed { remaining, .. } => assert_eq!(remaining, 99),
            other => panic!("expected Allowed, got {other:?}"),
        }
        assert_eq!(store.counter(key_id, clock.now().date_naive()), Some(1));
        assert!(store.logs().iter().any(|l| l.timestamp == ancient));
    }

    #[tokio::test]
    async fn store_failure_is_service_unavailable_not_a_denial() {
        let (store, _clock, gate) = gate();
        store.add_key(KEY, true, 100);
        store.fail_all(true);

        assert_eq!(
            gate.authorize(KEY, "/api/movies", None).await,
            Decision::ServiceUnavailable
        );
    }

    #[test]
    fn next_utc_midnight_is_tomorrow_at_zero_hours() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 15, 30, 0).unwrap();
        assert_eq!(
            next_utc_midnight(now),
            Utc.with_ymd_and_hms(2025, 3, 2, 0, 0, 0).unwrap()
        );

        // One second before midnight still resets at the next midnight
        let late = Utc.with_ymd_and_hms(2025, 3, 1, 23, 59, 59).unwrap();
        assert_eq!(
            next_utc_midnight(late),
            Utc.with_ymd_and_hms(2025, 3, 2, 0, 0, 0).unwrap()
        );
    }
}
