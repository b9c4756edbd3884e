//! The smart redirect link.

use crate::api::{AppState, pages};
use crate::types::Resolution;
use axum::{
    extract::{Path, State},
    http::{StatusCode, header::LOCATION},
    response::{Html, IntoResponse, Response},
};

/// GET /dl/:job_id - Resolve a job into a redirect or a page
///
/// Read-only: polling never changes the job.
#[utoipa::path(
    get,
    path = "/dl/{job_id}",
    tag = "redirect",
    params(
        ("job_id" = String, Path, description = "Job ID from the creation response")
    ),
    responses(
        (status = 302, description = "Completed; Location points at the stored file"),
        (status = 200, description = "Still pending or downloading; self-refreshing wait page", content_type = "text/html"),
        (status = 404, description = "Unknown or expired job", content_type = "text/html"),
        (status = 500, description = "Job failed", content_type = "text/html")
    )
)]
pub async fn resolve_job(State(state): State<AppState>, Path(job_id): Path<String>) -> Response {
    let resolution = match state.manager.resolve(&job_id).await {
        Ok(resolution) => resolution,
        Err(e) => return e.into_response(),
    };

    match resolution {
        Resolution::NotFound => (StatusCode::NOT_FOUND, Html(pages::not_found())).into_response(),
        Resolution::Waiting { status, progress } => {
            let refresh = state.config.redirect.refresh_seconds;
            (
                StatusCode::OK,
                [("refresh", refresh.to_string())],
                Html(pages::waiting(status, progress, refresh)),
            )
                .into_response()
        }
        Resolution::Redirect { final_url } => {
            (StatusCode::FOUND, [(LOCATION, final_url)]).into_response()
        }
        Resolution::Failed { error } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Html(pages::failed(&error)),
        )
            .into_response(),
    }
}
