//! Shared application state.

use std::sync::Arc;

use crate::db::DbPool;
use crate::services::admin_auth::AdminAuth;
use crate::services::admission::AdmissionGate;

/// State handed to every handler and middleware via axum's `State` extractor.
///
/// Deliberately thin: the pool and two service objects. No per-request or
/// cross-request caches live here, since the gate's correctness depends on
/// the durable store being the only shared mutable resource.
#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub gate: Arc<AdmissionGate>,
    pub admin_auth: Arc<AdminAuth>,
}
