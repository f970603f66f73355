//! Admin authentication middleware for privileged routes.
//!
//! Accepts either the static `X-Admin-Key` header or an
//! `Authorization: Bearer` token (the admin secret itself or a live session
//! token). Everything else is a 401.

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};

use crate::error::AppError;
use crate::state::AppState;

pub const ADMIN_KEY_HEADER: &str = "x-admin-key";

pub async fn admin_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let x_admin_key = request
        .headers()
        .get(ADMIN_KEY_HEADER)
        .and_then(|h| h.to_str().ok());

    let bearer = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim);

    if state.admin_auth.is_authorized(x_admin_key, bearer).await? {
        Ok(next.run(request).await)
    } else {
        Err(AppError::AdminUnauthorized)
    }
}
