// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>
//
//! Public auth endpoints: registration, login/logout, session introspection
//! and the self-serve admin request.

use axum::extract::State;
use axum::http::header::SET_COOKIE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use aeris_workflow::Registration;

use crate::cookies::{clear_cookie, cookie_value, set_cookie};
use crate::error::{ApiError, FieldError};
use crate::rbac::require_auth;
use crate::session::{SESSION_COOKIE, SESSION_MAX_AGE};
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterBody {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    /// Opt-in to the elevation state machine. Absent or false means the
    /// role is innovator no matter what else the payload carries.
    #[serde(default)]
    pub admin_requested: bool,
    pub admin_key: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginBody {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct RequestAdminBody {
    pub reason: Option<String>,
}

/// `GET /auth/has-admin` — whether any regulator exists; the client uses
/// this to decide whether to demand a signup key.
pub async fn has_admin(State(state): State<AppState>) -> Result<Response, ApiError> {
    let has_admin = state.workflow.has_admin().await?;
    Ok(Json(json!({ "hasAdmin": has_admin })).into_response())
}

/// `POST /auth/register`
pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterBody>,
) -> Result<Response, ApiError> {
    validate_register(&body)?;

    let user = state
        .workflow
        .register(Registration {
            name: body.name,
            email: body.email,
            password: body.password,
            admin_requested: body.admin_requested,
            admin_key: body.admin_key,
        })
        .await?;

    // Registration logs the user straight in.
    let session_id = state.sessions.create(user.id);
    let cookie = set_cookie(
        SESSION_COOKIE,
        &session_id,
        SESSION_MAX_AGE,
        true,
        state.config.cookie_secure,
    );

    Ok((
        StatusCode::CREATED,
        [(SET_COOKIE, cookie)],
        Json(json!({
            "message": "Registration successful",
            "user": user.summary(),
        })),
    )
        .into_response())
}

/// `POST /auth/login`
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginBody>,
) -> Result<Response, ApiError> {
    let mut details = Vec::new();
    if body.email.is_empty() {
        details.push(FieldError::new("email", "email is required"));
    }
    if body.password.is_empty() {
        details.push(FieldError::new("password", "password is required"));
    }
    if !details.is_empty() {
        return Err(ApiError::Validation(details));
    }

    let user = state.workflow.login(&body.email, &body.password).await?;

    let session_id = state.sessions.create(user.id);
    let cookie = set_cookie(
        SESSION_COOKIE,
        &session_id,
        SESSION_MAX_AGE,
        true,
        state.config.cookie_secure,
    );

    Ok((
        [(SET_COOKIE, cookie)],
        Json(json!({
            "message": "Login successful",
            "user": user.summary(),
        })),
    )
        .into_response())
}

/// `POST /auth/logout`
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    require_auth(&state, &headers)?;
    if let Some(session_id) = cookie_value(&headers, SESSION_COOKIE) {
        state.sessions.destroy(&session_id);
    }

    let cookie = clear_cookie(SESSION_COOKIE, true, state.config.cookie_secure);
    Ok((
        [(SET_COOKIE, cookie)],
        Json(json!({ "message": "Logout successful" })),
    )
        .into_response())
}

/// `GET /auth/me`
pub async fn me(State(state): State<AppState>, headers: HeaderMap) -> Result<Response, ApiError> {
    let user_id = require_auth(&state, &headers)?;
    let user = state
        .workflow
        .get_user(user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("user".to_string()))?;

    Ok(Json(user.summary()).into_response())
}

/// `POST /auth/request-admin`
pub async fn request_admin(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Option<Json<RequestAdminBody>>,
) -> Result<Response, ApiError> {
    let user_id = require_auth(&state, &headers)?;
    let reason = body.and_then(|Json(body)| body.reason);

    if let Some(reason) = &reason {
        if reason.len() > 500 {
            return Err(ApiError::Validation(vec![FieldError::new(
                "reason",
                "reason must be at most 500 characters",
            )]));
        }
    }

    state.workflow.submit_request(user_id, reason).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "status": "pending",
            "message": "Admin access request submitted successfully",
        })),
    )
        .into_response())
}

fn validate_register(body: &RegisterBody) -> Result<(), ApiError> {
    let mut details = Vec::new();

    let name = body.name.trim();
    if name.is_empty() {
        details.push(FieldError::new("name", "name is required"));
    } else if name.len() > 100 {
        details.push(FieldError::new("name", "name must be at most 100 characters"));
    }

    if !body.email.contains('@') || body.email.len() > 254 {
        details.push(FieldError::new("email", "a valid email is required"));
    }

    if body.password.len() < 8 {
        details.push(FieldError::new(
            "password",
            "password must be at least 8 characters",
        ));
    }

    if details.is_empty() {
        Ok(())
    } else {
        Err(ApiError::Validation(details))
    }
}
