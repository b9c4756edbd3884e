//! OpenAPI documentation and schema generation
//!
//! Served as JSON at `/openapi.json` and browsable at `/swagger-ui`.

use utoipa::OpenApi;

/// OpenAPI documentation for the relay-dl HTTP API
#[derive(OpenApi)]
#[openapi(
    info(
        title = "relay-dl HTTP API",
        version = "0.1.0",
        description = "Asynchronous fetch-and-relay downloads with smart redirect links, plus a live streaming proxy",
        license(
            name = "MIT OR Apache-2.0"
        )
    ),
    servers(
        (url = "http://localhost:4000", description = "Local development server")
    ),
    paths(
        // Jobs
        crate::api::routes::request_download,
        crate::api::routes::job_status,
        crate::api::routes::get_stats,

        // Redirect
        crate::api::routes::resolve_job,

        // Proxy
        crate::api::routes::proxy,

        // System
        crate::api::routes::health_check,
        crate::api::routes::openapi_spec,
        crate::api::routes::event_stream,
    ),
    components(schemas(
        // Core types from types.rs
        crate::types::JobId,
        crate::types::JobStatus,
        crate::types::JobState,
        crate::types::JobSummary,
        crate::types::JobStatusReport,
        crate::types::ProxyCounters,
        crate::types::JobBreakdown,
        crate::types::StatsSnapshot,
        crate::types::Event,

        // Config types from config.rs
        crate::config::Config,
        crate::config::StorageConfig,
        crate::config::FetchConfig,
        crate::config::RedirectConfig,
        crate::config::ServerIntegrationConfig,
        crate::config::ApiConfig,
        crate::config::RateLimitConfig,
        crate::target_policy::TargetPolicy,

        // Request/response types
        crate::jobs::CreateJobRequest,
        crate::api::routes::CreateJobResponse,

        // Error types from error.rs
        crate::error::ApiError,
        crate::error::ErrorDetail,
    )),
    tags(
        (name = "jobs", description = "Download jobs - Create, poll status, read stats"),
        (name = "redirect", description = "Smart redirect links handed to end users"),
        (name = "proxy", description = "Live pass-through proxy"),
        (name = "system", description = "System endpoints - Health checks, OpenAPI spec, events"),
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// Adds the `X-Api-Key` scheme to the spec
struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = &mut openapi.components {
            components.add_security_scheme(
                "api_key",
                utoipa::openapi::security::SecurityScheme::ApiKey(
                    utoipa::openapi::security::ApiKey::Header(
                        utoipa::openapi::security::ApiKeyValue::new("X-Api-Key"),
                    ),
                ),
            );
        }
    }
}
