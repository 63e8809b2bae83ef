// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>
//
//! Regulator-only endpoints: request review, user management, audit trail.
//!
//! Every handler re-resolves the caller's role through
//! [`require_regulator`](crate::rbac::require_regulator) before touching
//! anything.

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use aeris_store::Role;

use crate::error::{ApiError, FieldError};
use crate::rbac::{actor_context, require_regulator};
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct UsersQuery {
    /// Substring filter over name and email.
    pub q: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AuditQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct RoleBody {
    #[serde(default)]
    pub role: String,
}

/// `GET /admin/requests`
pub async fn list_requests(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    require_regulator(&state, &headers).await?;
    let requests = state.workflow.list_requests().await?;
    Ok(Json(requests).into_response())
}

/// `PUT /admin/requests/{id}/approve`
pub async fn approve_request(
    State(state): State<AppState>,
    Path(request_id): Path<u64>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let regulator = require_regulator(&state, &headers).await?;
    let actor = actor_context(regulator.id, &headers);

    let view = state.workflow.approve_request(request_id, &actor).await?;
    Ok(Json(view).into_response())
}

/// `PUT /admin/requests/{id}/reject`
pub async fn reject_request(
    State(state): State<AppState>,
    Path(request_id): Path<u64>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let regulator = require_regulator(&state, &headers).await?;
    let actor = actor_context(regulator.id, &headers);

    let view = state.workflow.reject_request(request_id, &actor).await?;
    Ok(Json(view).into_response())
}

/// `GET /admin/users`
pub async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<UsersQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    require_regulator(&state, &headers).await?;
    let users = state.workflow.list_users(query.q).await?;
    Ok(Json(users).into_response())
}

/// `PUT /admin/users/{id}/role`
pub async fn update_user_role(
    State(state): State<AppState>,
    Path(user_id): Path<u64>,
    headers: HeaderMap,
    Json(body): Json<RoleBody>,
) -> Result<Response, ApiError> {
    let regulator = require_regulator(&state, &headers).await?;

    let role: Role = body.role.parse().map_err(|_| {
        ApiError::Validation(vec![FieldError::new(
            "role",
            "role must be \"innovator\" or \"regulator\"",
        )])
    })?;

    let actor = actor_context(regulator.id, &headers);
    let user = state
        .workflow
        .update_user_role(user_id, role, &actor)
        .await?;

    Ok(Json(user.summary()).into_response())
}

/// `GET /admin/audit-logs?limit=N`
pub async fn audit_logs(
    State(state): State<AppState>,
    Query(query): Query<AuditQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    require_regulator(&state, &headers).await?;
    let entries = state.workflow.audit_logs(query.limit.unwrap_or(50)).await?;
    Ok(Json(entries).into_response())
}
