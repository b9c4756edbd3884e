//! Optional shared-key authentication for the management routes.
//!
//! The key travels in the `X-Api-Key` header. The redirect resolver and file
//! delivery never pass through this layer so their links keep working when
//! opened in a plain browser.

use crate::error::ApiError;
use axum::{
    Json,
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

/// Header carrying the shared key
pub const API_KEY_HEADER: &str = "x-api-key";

/// Reject requests whose `X-Api-Key` does not match `expected`
///
/// ```no_run
/// use axum::{Router, middleware, routing::get};
/// use relay_dl::api::auth::require_api_key;
/// use std::sync::Arc;
///
/// let key: Arc<str> = Arc::from("secret-key-123");
/// let router: Router = Router::new()
///     .route("/api/stats", get(|| async { "ok" }))
///     .route_layer(middleware::from_fn_with_state(key, require_api_key));
/// ```
pub async fn require_api_key(
    State(expected): State<Arc<str>>,
    request: Request,
    next: Next,
) -> Response {
    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok());

    match provided {
        Some(key) if constant_time_eq(key.as_bytes(), expected.as_bytes()) => {
            next.run(request).await
        }
        Some(_) => {
            tracing::debug!(path = %request.uri().path(), "Rejected request with wrong API key");
            unauthorized("Invalid API key")
        }
        None => unauthorized("Missing X-Api-Key header"),
    }
}

/// Compares every byte regardless of where the first mismatch is
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn unauthorized(message: &str) -> Response {
    (StatusCode::UNAUTHORIZED, Json(ApiError::unauthorized(message))).into_response()
}
