//! Admission-gate middleware for the public movie endpoints.
//!
//! This middleware intercepts every gated request to:
//! 1. Extract the API key from the `X-API-Key` header
//! 2. Run it through the admission gate (validity, optional HMAC, quota)
//! 3. Inject the authenticated key id into the request
//! 4. Stamp `X-Rate-Limit-Remaining` / `X-Rate-Limit-Reset` on the response
//!
//! Denials and backend failures short-circuit here with the status carried by
//! the gate's decision; handlers behind this layer only ever see admitted
//! requests.

use axum::{
    Json,
    body::Body,
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::json;
use uuid::Uuid;

use crate::services::admission::{Decision, DenyReason};
use crate::services::signature::SignedRequest;
use crate::state::AppState;

/// Header carrying the caller's API key.
pub const API_KEY_HEADER: &str = "x-api-key";
/// Optional HMAC signature headers.
pub const SIGNATURE_HEADER: &str = "x-signature";
pub const TIMESTAMP_HEADER: &str = "x-timestamp";
/// Rate-limit metadata exposed on admitted responses and quota denials.
pub const RATE_LIMIT_REMAINING: &str = "x-rate-limit-remaining";
pub const RATE_LIMIT_RESET: &str = "x-rate-limit-reset";

/// Largest body the signature layer will buffer.
const MAX_SIGNED_BODY_BYTES: usize = 1024 * 1024;

/// Authentication context attached to admitted requests.
///
/// Inserted into the request's extension map; handlers can extract it to know
/// which key made the request.
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// ID of the admitted API key
    pub api_key_id: Uuid,
}

/// Admission middleware function.
///
/// Returns a `Response` directly rather than `Result<_, AppError>` because
/// denials carry rate-limit metadata that the plain error envelope cannot.
pub async fn admission_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    // Step 1: the key is required on every gated endpoint
    let Some(api_key) = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::to_owned)
    else {
        return missing_key_response();
    };

    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let timestamp = header_string(&request, TIMESTAMP_HEADER);
    let signature = header_string(&request, SIGNATURE_HEADER);

    // Step 2: the signature covers the raw body, so it must be buffered,
    // but only when the caller actually sent a signature, and only for
    // methods that carry one. The request is rebuilt from the same bytes.
    let (mut request, body) = if signature.is_some() && method != Method::GET {
        let (parts, body) = request.into_parts();
        let bytes = match axum::body::to_bytes(body, MAX_SIGNED_BODY_BYTES).await {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::warn!(error = %err, "failed to buffer signed request body");
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({
                        "error": { "code": "invalid_request", "message": "Unreadable request body" }
                    })),
                )
                    .into_response();
            }
        };
        let text = String::from_utf8_lossy(&bytes).into_owned();
        (Request::from_parts(parts, Body::from(bytes)), text)
    } else {
        (request, String::new())
    };

    let signed = SignedRequest {
        method: method.as_str(),
        path: &path,
        body: &body,
        timestamp: timestamp.as_deref(),
        signature: signature.as_deref(),
    };

    // Step 3: one gate call decides everything
    let decision = state.gate.authorize(&api_key, &path, Some(&signed)).await;

    match decision {
        Decision::Allowed {
            key_id,
            remaining,
            reset_at,
        } => {
            request
                .extensions_mut()
                .insert(AuthContext { api_key_id: key_id });

            let mut response = next.run(request).await;
            set_rate_limit_headers(response.headers_mut(), remaining, reset_at);
            response
        }
        Decision::Denied {
            reason,
            status,
            remaining,
            reset_at,
        } => denied_response(reason, status, remaining, reset_at),
        Decision::ServiceUnavailable => service_unavailable_response(),
    }
}

fn header_string(request: &Request, name: &str) -> Option<String> {
    request
        .headers()
        .get(name)
        .and_then(|h| h.to_str().ok())
        .map(str::to_owned)
}

fn set_rate_limit_headers(headers: &mut HeaderMap, remaining: i64, reset_at: DateTime<Utc>) {
    if let Ok(value) = HeaderValue::from_str(&remaining.to_string()) {
        headers.insert(RATE_LIMIT_REMAINING, value);
    }
    let reset = reset_at.to_rfc3339_opts(SecondsFormat::Secs, true);
    if let Ok(value) = HeaderValue::from_str(&reset) {
        headers.insert(RATE_LIMIT_RESET, value);
    }
}

fn missing_key_response() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({
            "error": {
                "code": "api_key_required",
                "message": "Please provide a valid API key in the X-API-Key header"
            }
        })),
    )
        .into_response()
}

fn denied_response(
    reason: DenyReason,
    status: StatusCode,
    remaining: Option<i64>,
    reset_at: Option<DateTime<Utc>>,
) -> Response {
    let mut body = json!({
        "error": {
            "code": reason.code(),
            "message": reason.message()
        }
    });
    if let (Some(remaining), Some(reset_at)) = (remaining, reset_at) {
        body["requests_remaining"] = json!(remaining);
        body["reset_time"] = json!(reset_at.to_rfc3339_opts(SecondsFormat::Secs, true));
    }

    let mut response = (status, Json(body)).into_response();
    if let (Some(remaining), Some(reset_at)) = (remaining, reset_at) {
        set_rate_limit_headers(response.headers_mut(), remaining, reset_at);
    }
    response
}

fn service_unavailable_response() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "error": {
                "code": "service_unavailable",
                "message": "Authentication service temporarily unavailable. Please try again in a moment"
            }
        })),
    )
        .into_response()
}
