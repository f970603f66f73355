//! In-memory store used by the gate and admin-auth tests.
//!
//! Mirrors the Postgres backend's semantics closely enough to assert the
//! gate's side effects: one counter row per (key, day), append-only logs,
//! and a failure switch that makes every call error so tests can check the
//! `ServiceUnavailable` path.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::store::{ActiveKey, GateStore, StoreError};

#[derive(Debug, Clone)]
pub struct KeyRow {
    pub id: Uuid,
    pub key: String,
    pub is_active: bool,
    pub daily_limit: i32,
    pub last_cleanup_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct LogRow {
    pub key_id: Uuid,
    pub endpoint: String,
    pub status_code: i32,
    pub timestamp: DateTime<Utc>,
}

#[derive(Default)]
struct Inner {
    keys: Vec<KeyRow>,
    counters: HashMap<(Uuid, NaiveDate), i64>,
    logs: Vec<LogRow>,
    sessions: HashMap<String, DateTime<Utc>>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    failing: AtomicBool,
    failing_cleanup: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an API key row and return its id.
    pub fn add_key(&self, key: &str, is_active: bool, daily_limit: i32) -> Uuid {
        let id = Uuid::new_v4();
        self.inner.lock().unwrap().keys.push(KeyRow {
            id,
            key: key.to_string(),
            is_active,
            daily_limit,
            last_cleanup_at: None,
        });
        id
    }

    /// Make every subsequent store call fail.
    pub fn fail_all(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Make only `delete_usage_logs_before` fail, leaving every other
    /// operation healthy.
    pub fn fail_cleanup(&self, failing: bool) {
        self.failing_cleanup.store(failing, Ordering::SeqCst);
    }

    pub fn counter(&self, key_id: Uuid, date: NaiveDate) -> Option<i64> {
        self.inner.lock().unwrap().counters.get(&(key_id, date)).copied()
    }

    pub fn logs(&self) -> Vec<LogRow> {
        self.inner.lock().unwrap().logs.clone()
    }

    pub fn push_log(&self, key_id: Uuid, endpoint: &str, timestamp: DateTime<Utc>) {
        self.inner.lock().unwrap().logs.push(LogRow {
            key_id,
            endpoint: endpoint.to_string(),
            status_code: 200,
            timestamp,
        });
    }

    pub fn session_count(&self) -> usize {
        self.inner.lock().unwrap().sessions.len()
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolClosed));
        }
        Ok(())
    }
}

#[async_trait]
impl GateStore for MemoryStore {
    async fn find_active_key(&self, key: &str) -> Result<Option<ActiveKey>, StoreError> {
        self.check()?;
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .keys
            .iter()
            .find(|k| k.key == key && k.is_active)
            .map(|k| ActiveKey {
                id: k.id,
                daily_limit: k.daily_limit,
            }))
    }

    async fn daily_usage(&self, key_id: Uuid, date: NaiveDate) -> Result<i64, StoreError> {
        self.check()?;
        let inner = self.inner.lock().unwrap();
        Ok(inner.counters.get(&(key_id, date)).copied().unwrap_or(0))
    }

    async fn increment_daily_usage(
        &self,
        key_id: Uuid,
        date: NaiveDate,
    ) -> Result<i64, StoreError> {
        self.check()?;
        let mut inner = self.inner.lock().unwrap();
        let count = inner.counters.entry((key_id, date)).or_insert(0);
        *count += 1;
        Ok(*count)
    }

    async fn append_usage_log(
        &self,
        key_id: Uuid,
        endpoint: &str,
        status_code: i32,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.check()?;
        self.inner.lock().unwrap().logs.push(LogRow {
            key_id,
            endpoint: endpoint.to_string(),
            status_code,
            timestamp: at,
        });
        Ok(())
    }

    async fn last_cleanup_at(&self, key_id: Uuid) -> Result<Option<DateTime<Utc>>, StoreError> {
        self.check()?;
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .keys
            .iter()
            .find(|k| k.id == key_id)
            .and_then(|k| k.last_cleanup_at))
    }

    async fn delete_usage_logs_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        self.check()?;
        if self.failing_cleanup.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolClosed));
        }
        let mut inner = self.inner.lock().unwrap();
        let before = inner.logs.len();
        inner.logs.retain(|l| l.timestamp >= cutoff);
        Ok((before - inner.logs.len()) as u64)
    }

    async fn record_cleanup(&self, key_id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.check()?;
        let mut inner = self.inner.lock().unwrap();
        if let Some(k) = inner.keys.iter_mut().find(|k| k.id == key_id) {
            k.last_cleanup_at = Some(at);
        }
        Ok(())
    }

    async fn find_admin_session(
        &self,
        token: &str,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        self.check()?;
        let inner = self.inner.lock().unwrap();
        Ok(inner.sessions.get(token).copied())
    }

    async fn insert_admin_session(
        &self,
        token: &str,
        _admin_key: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.check()?;
        self.inner
            .lock()
            .unwrap()
            .sessions
            .insert(token.to_string(), expires_at);
        Ok(())
    }

    async fn delete_expired_admin_sessions(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        self.check()?;
        let mut inner = self.inner.lock().unwrap();
        let before = inner.sessions.len();
        inner.sessions.retain(|_, expires_at| *expires_at > now);
        Ok((before - inner.sessions.len()) as u64)
    }
}
