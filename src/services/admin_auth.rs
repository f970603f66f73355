//! Admin authentication: static shared secret or time-bounded session token.
//!
//! Privileged requests are authorized if any of the following holds:
//! the `X-Admin-Key` header equals the configured admin secret, the bearer
//! token equals the secret, or the bearer token matches a non-expired
//! `admin_sessions` row. Sessions are issued on admin login and live exactly
//! 24 hours; expired rows are swept on every successful login rather than on
//! a schedule.

use std::sync::Arc;

use chrono::Duration;
use uuid::Uuid;

use crate::clock::Clock;
use crate::store::{GateStore, StoreError};

/// Session lifetime: issued + 24h, after which the token is invalid the
/// instant the expiry passes.
pub const SESSION_TTL_HOURS: i64 = 24;

pub struct AdminAuth {
    store: Arc<dyn GateStore>,
    clock: Arc<dyn Clock>,
    admin_key: String,
}

impl AdminAuth {
    pub fn new(store: Arc<dyn GateStore>, clock: Arc<dyn Clock>, admin_key: String) -> Self {
        Self {
            store,
            clock,
            admin_key,
        }
    }

    /// Check the credentials carried by a privileged request.
    ///
    /// `x_admin_key` is the raw `X-Admin-Key` header, `bearer` the token from
    /// `Authorization: Bearer <token>`.
    pub async fn is_authorized(
        &self,
        x_admin_key: Option<&str>,
        bearer: Option<&str>,
    ) -> Result<bool, StoreError> {
        if x_admin_key == Some(self.admin_key.as_str()) {
            return Ok(true);
        }

        if let Some(token) = bearer {
            if token == self.admin_key {
                return Ok(true);
            }

            if let Some(expires_at) = self.store.find_admin_session(token).await? {
                if self.clock.now() < expires_at {
                    return Ok(true);
                }
            }
        }

        Ok(false)
    }

    /// Validate the shared secret and issue a session token.
    ///
    /// Returns `None` for a wrong secret. On success, all expired sessions
    /// are swept unconditionally: unlike log cleanup, this is not gated on a
    /// marker, since logins are rare.
    pub async fn login(&self, admin_key: &str) -> Result<Option<String>, StoreError> {
        if admin_key != self.admin_key {
            return Ok(None);
        }

        let token = Uuid::new_v4().to_string();
        let now = self.clock.now();
        let expires_at = now + Duration::hours(SESSION_TTL_HOURS);

        self.store
            .insert_admin_session(&token, &self.admin_key, expires_at)
            .await?;

        let swept = self.store.delete_expired_admin_sessions(now).await?;
        if swept > 0 {
            tracing::debug!(swept, "removed expired admin sessions");
        }

        Ok(Some(token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::memory::MemoryStore;
    use chrono::{TimeZone, Utc};

    const SECRET: &str = "mk_admin_secret";

    fn auth() -> (Arc<MemoryStore>, Arc<ManualClock>, AdminAuth) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::at(
            Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap(),
        ));
        let auth = AdminAuth::new(store.clone(), clock.clone(), SECRET.to_string());
        (store, clock, auth)
    }

    #[tokio::test]
    async fn static_secret_authorizes_via_either_header() {
        let (_store, _clock, auth) = auth();

        assert!(auth.is_authorized(Some(SECRET), None).await.unwrap());
        assert!(auth.is_authorized(None, Some(SECRET)).await.unwrap());
        assert!(!auth.is_authorized(Some("wrong"), None).await.unwrap());
        assert!(!auth.is_authorized(None, None).await.unwrap());
    }

    #[tokio::test]
    async fn wrong_secret_issues_no_session() {
        let (store, _clock, auth) = auth();

        assert_eq!(auth.login("wrong").await.unwrap(), None);
        assert_eq!(store.session_count(), 0);
    }

    #[tokio::test]
    async fn session_valid_until_exactly_twenty_four_hours() {
        let (_store, clock, auth) = auth();

        let token = auth.login(SECRET).await.unwrap().expect("session issued");

        clock.advance(Duration::hours(23) + Duration::minutes(59));
        assert!(auth.is_authorized(None, Some(&token)).await.unwrap());

        clock.advance(Duration::minutes(2)); // now 24h01m after issue
        assert!(!auth.is_authorized(None, Some(&token)).await.unwrap());
    }

    #[tokio::test]
    async fn login_sweeps_expired_sessions() {
        let (store, clock, auth) = auth();

        auth.login(SECRET).await.unwrap();
        assert_eq!(store.session_count(), 1);

        clock.advance(Duration::hours(25));
        auth.login(SECRET).await.unwrap();

        // Only the fresh session survives the sweep
        assert_eq!(store.session_count(), 1);
    }
}
