//! PostgreSQL implementation of the durable-store contract.
//!
//! Every method is a single statement. The counter increment relies on the
//! `(api_key_id, date)` primary key and `ON CONFLICT .. DO UPDATE ..
//! RETURNING` so that exactly one row exists per (key, day) and concurrent
//! increments never lose updates.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::db::DbPool;
use crate::store::{ActiveKey, GateStore, StoreError};

/// Store backend over the shared connection pool.
#[derive(Clone)]
pub struct PgGateStore {
    pool: DbPool,
}

impl PgGateStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GateStore for PgGateStore {
    async fn find_active_key(&self, key: &str) -> Result<Option<ActiveKey>, StoreError> {
        let row = sqlx::query_as::<_, (Uuid, i32)>(
            "SELECT id, daily_limit FROM api_keys WHERE api_key = $1 AND is_active = true",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(id, daily_limit)| ActiveKey { id, daily_limit }))
    }

    async fn daily_usage(&self, key_id: Uuid, date: NaiveDate) -> Result<i64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT request_count FROM daily_usage WHERE api_key_id = $1 AND date = $2",
        )
        .bind(key_id)
        .bind(date)
        .fetch_optional(&self.pool)
        .await?;

        Ok(count.unwrap_or(0))
    }

    async fn increment_daily_usage(
        &self,
        key_id: Uuid,
        date: NaiveDate,
    ) -> Result<i64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO daily_usage (api_key_id, date, request_count)
            VALUES ($1, $2, 1)
            ON CONFLICT (api_key_id, date)
            DO UPDATE SET request_count = daily_usage.request_count + 1
            RETURNING request_count
            "#,
        )
        .bind(key_id)
        .bind(date)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn append_usage_log(
        &self,
        key_id: Uuid,
        endpoint: &str,
        status_code: i32,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO usage_logs (api_key_id, endpoint, status_code, timestamp)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(key_id)
        .bind(endpoint)
        .bind(status_code)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn last_cleanup_at(&self, key_id: Uuid) -> Result<Option<DateTime<Utc>>, StoreError> {
        let at = sqlx::query_scalar::<_, Option<DateTime<Utc>>>(
            "SELECT last_cleanup_at FROM api_keys WHERE id = $1",
        )
        .bind(key_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(at.flatten())
    }

    async fn delete_usage_logs_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let deleted = sqlx::query("DELETE FROM usage_logs WHERE timestamp < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok(deleted)
    }

    async fn record_cleanup(&self, key_id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query("UPDATE api_keys SET last_cleanup_at = $1 WHERE id = $2")
            .bind(at)
            .bind(key_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn find_admin_session(
        &self,
        token: &str,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        let expires_at = sqlx::query_scalar::<_, DateTime<Utc>>(
            "SELECT expires_at FROM admin_sessions WHERE session_token = $1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(expires_at)
    }

    async fn insert_admin_session(
        &self,
        token: &str,
        admin_key: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO admin_sessions (session_token, admin_key, expires_at)
             VALUES ($1, $2, $3)",
        )
        .bind(token)
        .bind(admin_key)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_expired_admin_sessions(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let deleted = sqlx::query("DELETE FROM admin_sessions WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok(deleted)
    }
}
