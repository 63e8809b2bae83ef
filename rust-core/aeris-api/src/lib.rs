// SPDX-License-Identifier: PMPL-1.0-or-later
//! Aeris HTTP API
//!
//! The HTTP surface of the Aeris platform: auth, the self-serve admin
//! workflow, and the regulator console endpoints. Mutating routes sit
//! behind the double-submit CSRF guard; regulator routes re-check the
//! caller's persisted role on every call.
//!
//! Middleware stack, outermost first: request-id stamping (and the
//! centralized error-envelope formatter), HTTP tracing, CORS, CSRF guard.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::middleware;
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use aeris_audit::AuditStore;
use aeris_store::RegistryStore;
use aeris_workflow::{AdminWorkflow, WorkflowConfig};

pub mod admin;
pub mod auth;
pub mod config;
pub mod cookies;
pub mod csrf;
pub mod error;
pub mod rbac;
pub mod request_id;
pub mod session;

pub use config::ApiConfig;
pub use error::ApiError;
use session::SessionStore;

/// How many times to retry opening the registry when the file is locked.
const OPEN_RETRY_BUDGET: u32 = 5;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub workflow: AdminWorkflow,
    pub sessions: SessionStore,
    pub config: ApiConfig,
    pub start_time: Instant,
}

/// Open the stores and assemble the application state.
pub fn build_state(config: ApiConfig) -> Result<AppState, ApiError> {
    let store = RegistryStore::open_with_retry(
        config.data_dir.join("registry.redb"),
        OPEN_RETRY_BUDGET,
    )
    .map_err(|e| ApiError::Storage(e.to_string()))?;
    let audit = AuditStore::open(config.data_dir.join("audit.redb"))
        .map_err(|e| ApiError::Storage(e.to_string()))?;

    let workflow = AdminWorkflow::new(
        Arc::new(store),
        Arc::new(audit),
        WorkflowConfig {
            bootstrap_enabled: config.allow_first_admin,
            admin_signup_secret: config.admin_signup_secret.clone(),
            ..WorkflowConfig::default()
        },
    );

    Ok(AppState {
        workflow,
        sessions: SessionStore::new(),
        config,
        start_time: Instant::now(),
    })
}

/// Build the router with the full middleware stack.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/csrf", get(csrf::issue_token))
        .route("/auth/has-admin", get(auth::has_admin))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/me", get(auth::me))
        .route("/auth/request-admin", post(auth::request_admin))
        .route("/admin/requests", get(admin::list_requests))
        .route("/admin/requests/{id}/approve", put(admin::approve_request))
        .route("/admin/requests/{id}/reject", put(admin::reject_request))
        .route("/admin/users", get(admin::list_users))
        .route("/admin/users/{id}/role", put(admin::update_user_role))
        .route("/admin/audit-logs", get(admin::audit_logs))
        .fallback(route_not_found)
        .layer(middleware::from_fn(csrf::csrf_guard))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(request_id::request_id_middleware))
        .with_state(state)
}

/// Start serving. Blocks until the listener shuts down.
pub async fn serve(config: ApiConfig) -> Result<(), Box<dyn std::error::Error>> {
    let host = config.host.clone();
    let port = config.port;

    let state = build_state(config)?;
    let app = router(state);

    let listener = TcpListener::bind((host.as_str(), port)).await?;
    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptimeSeconds": state.start_time.elapsed().as_secs(),
    }))
}

async fn route_not_found() -> ApiError {
    ApiError::RouteNotFound
}
