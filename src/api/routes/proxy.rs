//! Live pass-through proxy.

use super::ProxyQuery;
use crate::api::{AppState, pages};
use crate::proxy::FORWARDED_REQUEST_HEADERS;
use axum::{
    body::Body,
    extract::{Query, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Response},
};
use std::collections::HashMap;

/// GET /proxy?url= - Stream a remote resource back to the caller
#[utoipa::path(
    get,
    path = "/proxy",
    tag = "proxy",
    params(ProxyQuery),
    responses(
        (status = 200, description = "Upstream response relayed as-is (status and headers copied)"),
        (status = 400, description = "Missing url parameter", content_type = "text/html"),
        (status = 403, description = "Target rejected by the target policy", body = crate::error::ApiError),
        (status = 502, description = "Upstream unreachable", body = crate::error::ApiError)
    )
)]
pub async fn proxy(
    State(state): State<AppState>,
    Query(query): Query<ProxyQuery>,
    headers: HeaderMap,
) -> Response {
    let Some(target) = query.url.filter(|u| !u.trim().is_empty()) else {
        return (StatusCode::BAD_REQUEST, Html(pages::proxy_usage())).into_response();
    };

    let forwarded: HashMap<String, String> = FORWARDED_REQUEST_HEADERS
        .iter()
        .filter_map(|name| {
            let value = headers.get(*name)?.to_str().ok()?;
            Some((name.to_string(), value.to_string()))
        })
        .collect();

    let upstream = match state.manager.proxy().open(&target, &forwarded).await {
        Ok(upstream) => upstream,
        Err(e) => return e.into_response(),
    };

    let mut response = Response::new(Body::from_stream(upstream.body));
    *response.status_mut() = StatusCode::from_u16(upstream.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let response_headers = response.headers_mut();
    for (name, value) in upstream.headers {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_bytes(&value),
        ) {
            response_headers.append(name, value);
        }
    }
    response
}
