//! Admin login and privileged endpoints.

use std::time::Duration;

use axum::{Json, extract::State};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::AppError;
use crate::services::admin_auth::SESSION_TTL_HOURS;
use crate::state::AppState;

/// Request body for `POST /api/admin/auth`.
#[derive(Debug, Deserialize)]
pub struct AdminLoginRequest {
    pub admin_key: String,
}

/// Exchange the shared admin secret for a session token.
///
/// # Endpoint
///
/// `POST /api/admin/auth` with `{"admin_key": "..."}`
///
/// A wrong secret is answered after a fixed one-second delay to blunt
/// brute-force attempts against this unauthenticated route.
pub async fn admin_login(
    State(state): State<AppState>,
    Json(body): Json<AdminLoginRequest>,
) -> Result<Json<Value>, AppError> {
    match state.admin_auth.login(&body.admin_key).await? {
        Some(token) => Ok(Json(json!({
            "session_token": token,
            "expires_in_hours": SESSION_TTL_HOURS
        }))),
        None => {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Err(AppError::AdminUnauthorized)
        }
    }
}

/// Operational counters for the whole service.
///
/// # Endpoint
///
/// `GET /admin/stats`, requires admin credentials (middleware-enforced).
pub async fn admin_stats(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(&state.pool)
        .await?;
    let active_keys: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM api_keys WHERE is_active = TRUE")
            .fetch_one(&state.pool)
            .await?;
    let total_keys: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM api_keys")
        .fetch_one(&state.pool)
        .await?;
    let usage_logs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM usage_logs")
        .fetch_one(&state.pool)
        .await?;
    let live_sessions: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM admin_sessions WHERE expires_at > NOW()")
            .fetch_one(&state.pool)
            .await?;
    let movies: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM movies")
        .fetch_one(&state.pool)
        .await?;

    Ok(Json(json!({
        "users": users,
        "api_keys": { "active": active_keys, "total": total_keys },
        "usage_logs": usage_logs,
        "admin_sessions": live_sessions,
        "movies": movies
    })))
}
