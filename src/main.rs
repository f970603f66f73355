//! Movie Metadata API - Main Application Entry Point
//!
//! REST API serving a read-only movie catalog behind an admission gate:
//! every catalog request is authenticated by API key, optionally verified
//! against an HMAC request signature, and counted against a per-day quota.
//!
//! # Architecture
//!
//! - **Web Framework**: Axum (async HTTP server)
//! - **Database**: PostgreSQL with sqlx (async queries)
//! - **Authentication**: API keys for the catalog, shared secret + sessions
//!   for admin routes
//! - **Format**: JSON requests/responses
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment variables
//! 2. Create database connection pool
//! 3. Run database migrations
//! 4. Build HTTP router with routes and middleware
//! 5. Start server on configured port

mod clock;
mod config;
mod db;
mod error;
mod handlers;
mod middleware;
mod models;
mod services;
mod state;
mod store;

use std::sync::Arc;

use axum::{
    Router,
    http::HeaderName,
    middleware as axum_middleware,
    routing::{delete, get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::EnvFilter;

use crate::clock::SystemClock;
use crate::services::{admin_auth::AdminAuth, admission::AdmissionGate};
use crate::state::AppState;
use crate::store::postgres::PgGateStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging with tracing subscriber. Reads RUST_LOG environment variable (defaults to "info" level)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    // Load configuration
    let config = config::Config::from_env()?;
    tracing::info!("Configuration loaded");

    // Create database pool
    let pool = db::create_pool(&config.database_url).await?;
    tracing::info!("Database pool created");

    // Run migrations
    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations complete");

    // Wire up the gate and admin auth against the live store and clock
    let store = Arc::new(PgGateStore::new(pool.clone()));
    let clock = Arc::new(SystemClock);
    let state = AppState {
        pool,
        gate: Arc::new(AdmissionGate::new(
            store.clone(),
            clock.clone(),
            config.enforce_per_key_limits,
        )),
        admin_auth: Arc::new(AdminAuth::new(store, clock, config.admin_api_key.clone())),
    };

    // Catalog routes: every request passes through the admission gate
    let gated_routes = Router::new()
        .route("/api/movies", get(handlers::movies::list_movies))
        .route("/api/movies/{id}", get(handlers::movies::get_movie))
        .route("/api/search", get(handlers::movies::search))
        .route("/api/stats", get(handlers::movies::stats))
        .route("/api/genres", get(handlers::movies::genres))
        .route("/api/years", get(handlers::movies::years))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::admission_middleware,
        ));

    // Privileged routes behind the admin middleware
    let admin_routes = Router::new()
        .route("/admin/stats", get(handlers::admin::admin_stats))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::admin::admin_middleware,
        ));

    // Rate-limit headers must be visible to browser callers
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers([
            HeaderName::from_static(middleware::auth::RATE_LIMIT_REMAINING),
            HeaderName::from_static(middleware::auth::RATE_LIMIT_RESET),
        ]);

    let app = Router::new()
        // Public routes (no authentication required)
        .route("/", get(handlers::movies::api_index))
        .route("/health", get(handlers::health::health_check))
        .route("/api/auth/login", post(handlers::keys::login))
        .route(
            "/api/auth/dashboard/{user_id}",
            get(handlers::keys::dashboard),
        )
        .route(
            "/api/auth/api-key/{user_id}",
            post(handlers::keys::create_key),
        )
        .route(
            "/api/auth/api-key/{user_id}/{key_id}",
            delete(handlers::keys::revoke_key),
        )
        .route("/api/admin/auth", post(handlers::admin::admin_login))
        // Merge gated and privileged route groups
        .merge(gated_routes)
        .merge(admin_routes)
        // Add distributed tracing middleware for observability
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        // Share application state with all handlers via State extraction
        .with_state(state);

    // Bind to network address and start server
    let addr = format!("0.0.0.0:{}", config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    // Start serving HTTP requests
    // This blocks forever, handling requests concurrently with tokio
    axum::serve(listener, app).await?;

    Ok(())
}
