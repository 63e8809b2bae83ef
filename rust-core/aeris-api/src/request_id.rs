// SPDX-License-Identifier: PMPL-1.0-or-later
//
//! Request-id middleware and the centralized error formatter.
//!
//! Every request gets a v4 uuid, exposed as an `x-request-id` response
//! header. Error envelopes (any JSON object body with an `error` key on a
//! 4xx/5xx response) get the id stamped into a `requestId` field here, in
//! one place, so no handler has to thread it through.

use axum::body::{to_bytes, Body};
use axum::extract::Request;
use axum::http::header::{HeaderValue, CONTENT_LENGTH};
use axum::middleware::Next;
use axum::response::Response;
use serde_json::Value;
use uuid::Uuid;

/// The generated id, stored in request extensions for handlers that want
/// to log it.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Cap on buffered error bodies. Error envelopes are small; anything
/// larger passes through untouched.
const MAX_ERROR_BODY: usize = 64 * 1024;

pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let id = Uuid::new_v4().to_string();
    request.extensions_mut().insert(RequestId(id.clone()));

    let mut response = next.run(request).await;

    if let Ok(header) = HeaderValue::from_str(&id) {
        response.headers_mut().insert("x-request-id", header);
    }

    if response.status().is_client_error() || response.status().is_server_error() {
        response = stamp_error_body(response, &id).await;
    }

    response
}

/// Rewrite an error body to include the request id, when it is a JSON
/// envelope. Non-envelope bodies (e.g. framework-generated plain text) are
/// left as-is.
async fn stamp_error_body(response: Response, request_id: &str) -> Response {
    let (mut parts, body) = response.into_parts();

    let bytes = match to_bytes(body, MAX_ERROR_BODY).await {
        Ok(bytes) => bytes,
        Err(_) => {
            // Body too large to buffer: it is dropped, so the original
            // length header must not survive it.
            parts
                .headers
                .insert(CONTENT_LENGTH, HeaderValue::from_static("0"));
            return Response::from_parts(parts, Body::empty());
        }
    };

    let stamped = match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(mut envelope)) if envelope.contains_key("error") => {
            envelope.insert("requestId".to_string(), Value::String(request_id.to_string()));
            serde_json::to_vec(&Value::Object(envelope)).ok()
        }
        _ => None,
    };

    let bytes = match stamped {
        Some(new_body) => new_body,
        None => bytes.to_vec(),
    };

    parts.headers.insert(
        CONTENT_LENGTH,
        HeaderValue::from_str(&bytes.len().to_string())
            .unwrap_or(HeaderValue::from_static("0")),
    );
    Response::from_parts(parts, Body::from(bytes))
}
