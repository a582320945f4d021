//! Response builders shared by every HTTP handler.

use axum::body::Body;
use axum::http::header::{HeaderValue, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::Response;
use serde::Serialize;
use serde_json::json;

use crate::error::Error;

/// Serialize `body` as JSON with the given status.
pub fn json<T: Serialize>(status: StatusCode, body: &T) -> Response {
    match serde_json::to_vec(body) {
        Ok(bytes) => build(status, bytes),
        Err(e) => {
            tracing::error!("❌ failed to serialize response body: {}", e);
            message(StatusCode::INTERNAL_SERVER_ERROR, "failed to serialize response")
        }
    }
}

/// `{"error": <reason>, "message": <text>}`
pub fn message(status: StatusCode, message: &str) -> Response {
    let body = json!({
        "error": status.canonical_reason().unwrap_or("Error"),
        "message": message,
    });
    build(status, body.to_string().into_bytes())
}

/// Report an [`Error`]. Server-side failures are logged here so handlers
/// don't have to.
pub fn error(e: &Error) -> Response {
    let status = e.status_code();
    if status.is_server_error() {
        tracing::error!("❌ request failed: {}", e);
    }
    message(status, &e.to_string())
}

/// Fold a handler result into a response.
pub fn result<T: Serialize>(status: StatusCode, result: crate::Result<T>) -> Response {
    match result {
        Ok(body) => json(status, &body),
        Err(e) => error(&e),
    }
}

fn build(status: StatusCode, bytes: Vec<u8>) -> Response {
    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}
