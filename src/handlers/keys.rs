//! API key issuing, dashboard, and revocation.
//!
//! These routes are public (not behind the admission gate): they are how a
//! caller obtains the key the gate will later check. Keys are handed out
//! verbatim and never shown partially masked, since the same string doubles as
//! the HMAC signing secret.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use rand::{Rng, distr::Alphanumeric};
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{api_key::ApiKeySummary, user::User};
use crate::state::AppState;

/// Daily limit written onto a freshly created key.
const NEW_KEY_DAILY_LIMIT: i32 = 100;
/// Daily limit written when login re-issues a key for an existing user whose
/// previous key was revoked.
const REISSUED_KEY_DAILY_LIMIT: i32 = 1000;

/// Request body for `POST /api/auth/login`.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
}

/// Generate a fresh API key: `mk_` followed by 32 alphanumeric characters.
fn generate_api_key() -> String {
    let suffix: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect();
    format!("mk_{suffix}")
}

/// Email login: find or create the account and return a usable API key.
///
/// # Endpoint
///
/// `POST /api/auth/login` with `{"email": "dev@example.com"}`
///
/// # Behavior
///
/// - New email: account is created along with a key at the standard limit.
/// - Known email with an active key: that key is returned as-is.
/// - Known email whose keys were all revoked: a new key is issued at the
///   elevated re-issue limit.
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let email = body.email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(AppError::InvalidRequest(
            "A valid email address is required".to_string(),
        ));
    }

    let existing = sqlx::query_as::<_, User>(
        "SELECT id, email, created_at FROM users WHERE email = $1",
    )
    .bind(&email)
    .fetch_optional(&state.pool)
    .await?;

    let (user, created) = match existing {
        Some(user) => (user, false),
        None => {
            let user = sqlx::query_as::<_, User>(
                "INSERT INTO users (email) VALUES ($1) RETURNING id, email, created_at",
            )
            .bind(&email)
            .fetch_one(&state.pool)
            .await?;
            tracing::info!(user_id = %user.id, "created user account");
            (user, true)
        }
    };

    let active = sqlx::query_as::<_, ApiKeySummary>(
        "SELECT id, api_key, is_active, created_at
         FROM api_keys
         WHERE user_id = $1 AND is_active = TRUE
         ORDER BY created_at DESC
         LIMIT 1",
    )
    .bind(user.id)
    .fetch_optional(&state.pool)
    .await?;

    let key = match active {
        Some(key) => key,
        None => {
            let limit = if created {
                NEW_KEY_DAILY_LIMIT
            } else {
                REISSUED_KEY_DAILY_LIMIT
            };
            issue_key(&state, user.id, limit).await?
        }
    };

    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((
        status,
        Json(json!({
            "user_id": user.id,
            "email": user.email,
            "api_key": key.api_key,
            "api_key_id": key.id
        })),
    ))
}

/// Per-user dashboard: active keys and usage aggregates.
///
/// # Endpoint
///
/// `GET /api/auth/dashboard/{user_id}`
pub async fn dashboard(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let user = sqlx::query_as::<_, User>(
        "SELECT id, email, created_at FROM users WHERE id = $1",
    )
    .bind(user_id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or(AppError::UserNotFound)?;

    let keys = sqlx::query_as::<_, ApiKeySummary>(
        "SELECT id, api_key, is_active, created_at
         FROM api_keys
         WHERE user_id = $1 AND is_active = TRUE
         ORDER BY created_at DESC",
    )
    .bind(user_id)
    .fetch_all(&state.pool)
    .await?;

    // Aggregates come from the usage log, not the daily counters, so they
    // survive counter resets and cover every key the user has ever held.
    let (total, this_month, today) = sqlx::query_as::<_, (i64, i64, i64)>(
        r#"
        SELECT
            COUNT(*),
            COUNT(*) FILTER (WHERE timestamp >= date_trunc('month', NOW())),
            COUNT(*) FILTER (WHERE timestamp >= date_trunc('day', NOW()))
        FROM usage_logs
        WHERE api_key_id IN (SELECT id FROM api_keys WHERE user_id = $1)
        "#,
    )
    .bind(user_id)
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(json!({
        "user": { "id": user.id, "email": user.email, "created_at": user.created_at },
        "api_keys": keys,
        "usage": {
            "total_requests": total,
            "requests_this_month": this_month,
            "requests_today": today
        }
    })))
}

/// Issue an additional key for an existing user.
///
/// # Endpoint
///
/// `POST /api/auth/api-key/{user_id}`, 201 with the new key.
pub async fn create_key(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let exists: Option<i32> = sqlx::query_scalar("SELECT 1 FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(&state.pool)
        .await?;
    if exists.is_none() {
        return Err(AppError::UserNotFound);
    }

    let key = issue_key(&state, user_id, NEW_KEY_DAILY_LIMIT).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "api_key_id": key.id,
            "api_key": key.api_key,
            "created_at": key.created_at
        })),
    ))
}

/// Revoke a key (soft delete).
///
/// # Endpoint
///
/// `DELETE /api/auth/api-key/{user_id}/{key_id}`, 204 on success.
///
/// The row stays behind so its usage history remains attributable; the
/// admission gate rejects the key on its next use.
pub async fn revoke_key(
    State(state): State<AppState>,
    Path((user_id, key_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, AppError> {
    let result = sqlx::query(
        "UPDATE api_keys SET is_active = FALSE WHERE id = $1 AND user_id = $2",
    )
    .bind(key_id)
    .bind(user_id)
    .execute(&state.pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::ApiKeyNotFound);
    }

    tracing::info!(%key_id, %user_id, "revoked api key");
    Ok(StatusCode::NO_CONTENT)
}

async fn issue_key(
    state: &AppState,
    user_id: Uuid,
    daily_limit: i32,
) -> Result<ApiKeySummary, AppError> {
    let api_key = generate_api_key();
    let key = sqlx::query_as::<_, ApiKeySummary>(
        "INSERT INTO api_keys (user_id, api_key, daily_limit)
         VALUES ($1, $2, $3)
         RETURNING id, api_key, is_active, created_at",
    )
    .bind(user_id)
    .bind(&api_key)
    .bind(daily_limit)
    .fetch_one(&state.pool)
    .await?;

    tracing::info!(key_id = %key.id, %user_id, daily_limit, "issued api key");
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_carry_prefix_and_length() {
        let key = generate_api_key();
        assert!(key.starts_with("mk_"));
        assert_eq!(key.len(), 35);
        assert!(key[3..].chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn generated_keys_are_unique() {
        let a = generate_api_key();
        let b = generate_api_key();
        assert_ne!(a, b);
    }
}
