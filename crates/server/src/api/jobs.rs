//! Bulk-download job API handlers.

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

use platewatch_core::{DownloadOutcome, Job, JobError, JobState};

use crate::state::AppState;

// ============================================================================
// Response Types
// ============================================================================

/// Job snapshot returned by the status endpoint
#[derive(Debug, Serialize)]
pub struct JobResponse {
    pub id: String,
    pub license_plate: String,
    pub state: JobState,
    pub outcomes: Vec<DownloadOutcome>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Job> for JobResponse {
    fn from(job: Job) -> Self {
        Self {
            id: job.id,
            license_plate: job.query.license_plate,
            state: job.state,
            outcomes: job.outcomes,
            created_at: job.created_at.to_rfc3339(),
            updated_at: job.updated_at.to_rfc3339(),
        }
    }
}

/// Error response
#[derive(Debug, Serialize)]
pub struct JobErrorResponse {
    pub error: String,
}

fn job_error_response(error: JobError) -> Response {
    let status = match &error {
        JobError::NotFound(_) => StatusCode::NOT_FOUND,
        JobError::InvalidState { .. } => StatusCode::CONFLICT,
        JobError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(JobErrorResponse {
            error: error.to_string(),
        }),
    )
        .into_response()
}

// ============================================================================
// Handlers
// ============================================================================

/// Get a job snapshot by id
pub async fn job_status(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Response {
    match state.jobs().get_status(&job_id) {
        Ok(job) => Json(JobResponse::from(job)).into_response(),
        Err(e) => job_error_response(e),
    }
}

/// Cancel a QUEUED or RUNNING job (DELETE endpoint)
pub async fn cancel_job(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Response {
    match state.jobs().cancel(&job_id).await {
        Ok(job) => Json(JobResponse::from(job)).into_response(),
        Err(e) => job_error_response(e),
    }
}

/// Stream the ticket-image archive of a finished job.
///
/// 404 unless the job exists, reached a terminal success-bearing state and
/// produced an archive.
pub async fn download_pdfs(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Response {
    let job = match state.jobs().get_status(&job_id) {
        Ok(job) => job,
        Err(e) => return job_error_response(e),
    };

    if !job.state.is_success_bearing() {
        return (
            StatusCode::NOT_FOUND,
            Json(JobErrorResponse {
                error: format!(
                    "job {} has no downloadable archive (state: {})",
                    job_id,
                    job.state.state_type()
                ),
            }),
        )
            .into_response();
    }

    let archive_path = match job.state.archive_path() {
        Some(path) => path.to_string(),
        None => {
            return (
                StatusCode::NOT_FOUND,
                Json(JobErrorResponse {
                    error: format!("job {} produced no archive", job_id),
                }),
            )
                .into_response();
        }
    };

    let bytes = match tokio::fs::read(&archive_path).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(job_id = %job_id, path = %archive_path, error = %e, "Archive missing on disk");
            return (
                StatusCode::NOT_FOUND,
                Json(JobErrorResponse {
                    error: format!("archive for job {} is no longer available", job_id),
                }),
            )
                .into_response();
        }
    };

    let filename = format!(
        "tickets_{}_{}.zip",
        job.query.license_plate, job.query.state
    );

    (
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename={}", filename),
            ),
        ],
        bytes,
    )
        .into_response()
}
