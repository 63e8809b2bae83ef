// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>
//
//! Double-submit-cookie CSRF guard.
//!
//! A per-session random token is issued in a non-HttpOnly cookie; clients
//! echo it back in a header on every mutating request. Validity is
//! structural: header value must equal cookie value. There is no
//! server-side token store, which trades a theoretical same-site-cookie
//! bypass for simplicity; cookies are `SameSite=Lax` and the app is
//! same-origin-cookie-only.

use axum::extract::{Request, State};
use axum::http::{header::SET_COOKIE, HeaderMap, Method};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rand::RngCore;
use serde_json::json;
use tracing::warn;

use crate::cookies::{cookie_value, set_cookie};
use crate::error::ApiError;
use crate::AppState;

/// Cookie the token is issued in. Readable by client script by design.
pub const CSRF_COOKIE: &str = "XSRF-TOKEN";

/// Header names accepted for the echoed token.
const CSRF_HEADERS: [&str; 2] = ["x-csrf-token", "x-xsrf-token"];

/// Cookie lifetime: 24 hours.
const CSRF_COOKIE_MAX_AGE: i64 = 24 * 60 * 60;

/// Generate a fresh token: 32 random bytes (256 bits), hex-encoded.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// `GET /v1/csrf` — issue a token in both the cookie and the body, for
/// clients that prefer body-based propagation.
pub async fn issue_token(State(state): State<AppState>) -> Response {
    let token = generate_token();
    let cookie = set_cookie(
        CSRF_COOKIE,
        &token,
        CSRF_COOKIE_MAX_AGE,
        false,
        state.config.cookie_secure,
    );

    (
        [(SET_COOKIE, cookie)],
        Json(json!({ "csrfToken": token })),
    )
        .into_response()
}

/// Middleware enforcing the double-submit check on state-changing methods.
/// Safe methods (GET/HEAD/OPTIONS) bypass unconditionally.
pub async fn csrf_guard(request: Request, next: Next) -> Response {
    if matches!(*request.method(), Method::GET | Method::HEAD | Method::OPTIONS) {
        return next.run(request).await;
    }

    let method = request.method().clone();
    let path = request.uri().path().to_string();

    match verify(request.headers()) {
        Ok(()) => next.run(request).await,
        Err(err) => {
            // Never log full token material; truncated prefixes only.
            let header_token = header_token(request.headers());
            let cookie_token = cookie_value(request.headers(), CSRF_COOKIE);
            warn!(
                %method,
                %path,
                has_header_token = header_token.is_some(),
                has_cookie_token = cookie_token.is_some(),
                header_prefix = header_token.as_deref().map(token_prefix),
                cookie_prefix = cookie_token.as_deref().map(token_prefix),
                code = err.code(),
                "CSRF check failed"
            );
            err.into_response()
        }
    }
}

/// The structural check: both sides present and equal.
pub fn verify(headers: &HeaderMap) -> Result<(), ApiError> {
    let header_token = header_token(headers);
    let cookie_token = cookie_value(headers, CSRF_COOKIE);

    match (header_token, cookie_token) {
        (Some(header), Some(cookie)) => {
            if header == cookie {
                Ok(())
            } else {
                Err(ApiError::CsrfTokenInvalid)
            }
        }
        _ => Err(ApiError::CsrfTokenMissing),
    }
}

fn header_token(headers: &HeaderMap) -> Option<String> {
    CSRF_HEADERS.iter().find_map(|name| {
        headers
            .get(*name)
            .and_then(|value| value.to_str().ok())
            .map(String::from)
    })
}

fn token_prefix(token: &str) -> &str {
    token.get(..8).unwrap_or(token)
}
