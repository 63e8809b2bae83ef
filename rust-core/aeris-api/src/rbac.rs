// SPDX-License-Identifier: PMPL-1.0-or-later
//
//! Role gate: session-to-role resolution for regulator-only operations.
//!
//! `require_regulator` always loads the user's *current* persisted role, not
//! anything cached in the session, so a role revoked mid-session takes
//! effect on the next privileged call.

use axum::http::HeaderMap;

use aeris_store::{Role, User};
use aeris_workflow::ActorContext;

use crate::error::ApiError;
use crate::AppState;

/// Resolve the authenticated user id from the session, or fail with
/// `AUTH_REQUIRED`.
pub fn require_auth(state: &AppState, headers: &HeaderMap) -> Result<u64, ApiError> {
    state
        .sessions
        .user_from_headers(headers)
        .ok_or(ApiError::AuthRequired)
}

/// Resolve the authenticated user and check the regulator role against the
/// store. A stale session (user record gone) reads as unauthenticated.
pub async fn require_regulator(state: &AppState, headers: &HeaderMap) -> Result<User, ApiError> {
    let user_id = require_auth(state, headers)?;
    let user = state
        .workflow
        .get_user(user_id)
        .await?
        .ok_or(ApiError::AuthRequired)?;

    if user.role != Role::Regulator {
        return Err(ApiError::Forbidden);
    }
    Ok(user)
}

/// Build the audit actor context from the acting user and request metadata.
pub fn actor_context(user_id: u64, headers: &HeaderMap) -> ActorContext {
    let ip = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .map(|value| value.split(',').next().unwrap_or(value).trim().to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let user_agent = headers
        .get("user-agent")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    ActorContext {
        user_id,
        ip,
        user_agent,
    }
}
