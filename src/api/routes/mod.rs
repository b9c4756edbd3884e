//! Route handlers for the REST API
//!
//! Handlers are organized by concern:
//! - [`jobs`] - Job creation, legacy status and stats
//! - [`redirect`] - The smart redirect link
//! - [`proxy`] - Live pass-through proxy
//! - [`system`] - Health, events, OpenAPI

use crate::config::Config;
use crate::types::JobId;
use axum::http::{HeaderMap, header::HOST};
use serde::{Deserialize, Serialize};

mod jobs;
mod proxy;
mod redirect;
mod system;

pub use jobs::*;
pub use proxy::*;
pub use redirect::*;
pub use system::*;

/// Response body of POST /api/request-download
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobResponse {
    /// Always true
    pub success: bool,
    /// Human-readable hint
    pub message: String,
    /// New job ID
    pub job_id: JobId,
    /// Smart redirect link, usable immediately
    pub download_url: String,
    /// Direct file link, valid once completed
    pub direct_url: String,
    /// Stored filename
    pub filename: String,
}

/// Query parameters for GET /proxy
#[derive(Debug, Deserialize, Serialize, utoipa::IntoParams)]
pub struct ProxyQuery {
    /// Absolute URL to fetch
    pub url: Option<String>,
}

/// Origin used to build links returned to clients
///
/// `public_base_url` wins; otherwise the request's `Host` header, then the
/// bind address.
pub(crate) fn base_url(config: &Config, headers: &HeaderMap) -> String {
    if let Some(base) = &config.server.api.public_base_url {
        return base.trim_end_matches('/').to_string();
    }
    match headers.get(HOST).and_then(|h| h.to_str().ok()) {
        Some(host) if !host.is_empty() => format!("http://{}", host),
        _ => format!("http://{}", config.server.api.bind_address),
    }
}
