//! Job handlers: creation, legacy status polling and stats.

use super::{CreateJobResponse, base_url};
use crate::api::AppState;
use crate::error::Error;
use crate::jobs::CreateJobRequest;
use crate::types::{JobStatusReport, StatsSnapshot};
use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};

/// POST /api/request-download - Register a download job
#[utoipa::path(
    post,
    path = "/api/request-download",
    tag = "jobs",
    request_body = CreateJobRequest,
    responses(
        (status = 202, description = "Job registered; fetch runs in the background", body = CreateJobResponse),
        (status = 400, description = "Missing link or filename, or malformed JSON", body = crate::error::ApiError),
        (status = 403, description = "Link rejected by the target policy", body = crate::error::ApiError),
        (status = 503, description = "Shutting down", body = crate::error::ApiError)
    )
)]
pub async fn request_download(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<CreateJobRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return Error::Validation(rejection.body_text()).into_response(),
    };

    let base = base_url(&state.config, &headers);
    match state.manager.create_job(request, &base).await {
        Ok(ticket) => (
            StatusCode::ACCEPTED,
            Json(CreateJobResponse {
                success: true,
                message: "Request accepted. Open downloadUrl to get the file.".to_string(),
                job_id: ticket.job_id,
                download_url: ticket.redirect_url,
                direct_url: ticket.direct_url,
                filename: ticket.filename,
            }),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /api/status/:job_id - Legacy status polling
#[utoipa::path(
    get,
    path = "/api/status/{job_id}",
    tag = "jobs",
    params(
        ("job_id" = String, Path, description = "Job ID")
    ),
    responses(
        (status = 200, description = "Current job status", body = JobStatusReport),
        (status = 404, description = "Unknown or expired job", body = crate::error::ApiError)
    )
)]
pub async fn job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<JobStatusReport>, Error> {
    state.manager.job_status(&job_id).await.map(Json)
}

/// GET /api/stats - Uptime, proxy counters and job breakdown
#[utoipa::path(
    get,
    path = "/api/stats",
    tag = "jobs",
    responses(
        (status = 200, description = "Stats snapshot", body = StatsSnapshot),
        (status = 500, description = "Internal server error", body = crate::error::ApiError)
    )
)]
pub async fn get_stats(State(state): State<AppState>) -> Result<Json<StatsSnapshot>, Error> {
    state.manager.stats().await.map(Json)
}
