//! HTTP API server module
//!
//! Exposes job creation, the smart redirect link, legacy status polling, file
//! delivery, the live proxy and stats over one axum router.

use crate::{Config, JobManager, Result};
use axum::{
    Router,
    http::HeaderValue,
    middleware,
    routing::{get, post},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod auth;
pub mod error_response;
pub mod openapi;
pub mod pages;
pub mod rate_limit;
pub mod routes;
pub mod state;

pub use openapi::ApiDoc;
pub use state::AppState;

/// Create the API router with all route definitions
///
/// # Routes
///
/// ## Public (never behind the API key)
/// - `GET /dl/:job_id` - Smart redirect link
/// - `GET /downloads/<filename>` - Completed files (no directory listing)
/// - `GET /health` - Health check
///
/// ## Management (behind the API key when one is configured)
/// - `POST /api/request-download` - Register a job
/// - `GET /api/status/:job_id` - Legacy status polling
/// - `GET /api/stats` - Uptime, proxy counters, job breakdown
/// - `GET /proxy?url=` - Live pass-through proxy
/// - `GET /events` - Server-sent events stream
/// - `GET /openapi.json` - OpenAPI specification
/// - `GET /swagger-ui` - Interactive documentation (if enabled)
pub fn create_router(manager: Arc<JobManager>, config: Arc<Config>) -> Router {
    let state = AppState::new(manager, config.clone());

    let public = Router::new()
        .route("/dl/:job_id", get(routes::resolve_job))
        .route("/health", get(routes::health_check))
        .nest_service("/downloads", ServeDir::new(&config.storage.download_dir));

    let management = Router::new()
        .route("/api/request-download", post(routes::request_download))
        .route("/api/status/:job_id", get(routes::job_status))
        .route("/api/stats", get(routes::get_stats))
        .route("/proxy", get(routes::proxy))
        .route("/events", get(routes::event_stream))
        .route("/openapi.json", get(routes::openapi_spec));

    // Swagger UI serves its own copy of the spec, so its URL must not clash with /openapi.json
    let management = if config.server.api.swagger_ui {
        management.merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
    } else {
        management
    };

    // route_layer only wraps the routes registered so far, leaving `public` untouched
    let management = match &config.server.api.api_key {
        Some(key) => management.route_layer(middleware::from_fn_with_state(
            Arc::<str>::from(key.as_str()),
            auth::require_api_key,
        )),
        None => management,
    };

    let router = public.merge(management).with_state(state);

    // Last layer applied runs first: Trace → CORS → Rate limit → handler
    let router = if config.server.api.rate_limit.enabled {
        let limiter = Arc::new(rate_limit::RateLimiter::new(
            config.server.api.rate_limit.clone(),
        ));
        router.layer(middleware::from_fn_with_state(
            limiter,
            rate_limit::rate_limit_middleware,
        ))
    } else {
        router
    };

    let router = if config.server.api.cors_enabled {
        router.layer(build_cors_layer(&config.server.api.cors_origins))
    } else {
        router
    };

    router.layer(TraceLayer::new_for_http())
}

/// Build a CORS layer based on configured origins (`"*"` allows any)
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        layer.allow_origin(Any)
    } else {
        let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
        layer.allow_origin(AllowOrigin::list(allowed))
    }
}

/// Start the API server on the configured bind address.
///
/// Runs until the listener fails or the task is dropped.
///
/// # Example
///
/// ```no_run
/// use relay_dl::{Config, JobManager};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Arc::new(Config::default());
/// let manager = Arc::new(JobManager::new((*config).clone()).await?);
///
/// relay_dl::api::start_api_server(manager, config).await?;
/// # Ok(())
/// # }
/// ```
pub async fn start_api_server(manager: Arc<JobManager>, config: Arc<Config>) -> Result<()> {
    let listener = TcpListener::bind(config.server.api.bind_address)
        .await
        .map_err(crate::error::Error::Io)?;
    serve(listener, manager, config, std::future::pending()).await
}

/// Serve on an already bound listener until `shutdown` resolves
pub async fn serve(
    listener: TcpListener,
    manager: Arc<JobManager>,
    config: Arc<Config>,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let address = listener.local_addr().map_err(crate::error::Error::Io)?;
    let app = create_router(manager, config);

    tracing::info!(address = %address, "API server listening");

    // ConnectInfo feeds the per-client rate limiter
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
    .map_err(|e| crate::error::Error::ApiServerError(e.to_string()))?;

    tracing::info!("API server stopped");
    Ok(())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
