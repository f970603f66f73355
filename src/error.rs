//! Error types and HTTP error response handling.
//!
//! This module defines all application errors and how they are converted
//! into HTTP responses with appropriate status codes and JSON bodies.
//!
//! Quota and signature rejections are intentionally NOT here: those travel
//! through the admission gate's `Decision` type so that callers can attach
//! rate-limit metadata to them. `AppError` covers everything else.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::store::StoreError;

/// Application-wide error type.
///
/// Each variant maps to a specific HTTP status code and error message.
///
/// # Error Categories
///
/// - **Database Errors**: Any sqlx::Error from handler-level queries
/// - **Store Errors**: Failures inside the durable-store abstraction
/// - **Authentication Errors**: Rejected admin credentials
/// - **Resource Errors**: Requested resources not found
/// - **Validation Errors**: Invalid request data
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Database operation failed (e.g., connection error, query error).
    ///
    /// This wraps any sqlx::Error using the `#[from]` attribute, which
    /// automatically implements `From<sqlx::Error> for AppError`.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The durable store failed during an operation.
    ///
    /// Returns HTTP 500 with a generic message. Backend failures must stay
    /// distinguishable from authorization denials, never collapse into them.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Admin credentials (shared secret or session token) were rejected.
    ///
    /// Returns HTTP 401 Unauthorized.
    #[error("Unauthorized - Admin access required")]
    AdminUnauthorized,

    /// Requested movie does not exist.
    ///
    /// Returns HTTP 404 Not Found.
    #[error("Movie not found")]
    MovieNotFound,

    /// Requested user account does not exist.
    ///
    /// Returns HTTP 404 Not Found.
    #[error("User not found")]
    UserNotFound,

    /// Requested API key record does not exist or belongs to another user.
    ///
    /// Returns HTTP 404 Not Found.
    #[error("API key not found")]
    ApiKeyNotFound,

    /// Request body or parameters are invalid.
    ///
    /// Returns HTTP 400 Bad Request.
    /// The String contains details about what was invalid.
    #[error("Invalid request")]
    InvalidRequest(String),
}

/// Convert AppError into an HTTP response.
///
/// This implementation allows Axum handlers to return `Result<T, AppError>`
/// and have errors automatically converted to proper HTTP responses.
///
/// # Response Format
///
/// All errors return JSON in this format:
/// ```json
/// {
///   "error": {
///     "code": "error_type",
///     "message": "Human-readable error message"
///   }
/// }
/// ```
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Map each error variant to (HTTP status, error code, message)
        let (status, code, message) = match self {
            AppError::AdminUnauthorized => {
                (StatusCode::UNAUTHORIZED, "unauthorized", self.to_string())
            }
            AppError::MovieNotFound => {
                (StatusCode::NOT_FOUND, "movie_not_found", self.to_string())
            }
            AppError::UserNotFound => {
                (StatusCode::NOT_FOUND, "user_not_found", self.to_string())
            }
            AppError::ApiKeyNotFound => {
                (StatusCode::NOT_FOUND, "api_key_not_found", self.to_string())
            }
            AppError::InvalidRequest(ref msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", msg.clone())
            }
            AppError::Database(_) | AppError::Store(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "An internal error occurred".to_string(),
            ),
        };

        // Build JSON response body
        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        // Return the response with status code and JSON body
        (status, body).into_response()
    }
}
