//! Violation search and report API handlers.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

use platewatch_core::{render_report, EnhancedResult, LookupError, Query, Violation};

use crate::metrics::{JOBS_CREATED_TOTAL, LOOKUPS_TOTAL};
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for violation lookups
#[derive(Debug, Deserialize)]
pub struct ViolationSearchBody {
    /// License plate number
    pub license_plate: String,
    /// State abbreviation (e.g. NY, NJ, CT)
    pub state: String,
}

/// The inner result envelope
#[derive(Debug, Serialize)]
pub struct SearchResultPayload {
    pub success: bool,
    pub data: Vec<Violation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Quality metadata attached to search responses
#[derive(Debug, Serialize)]
pub struct EnhancedData {
    pub data_sources: Vec<String>,
    pub processing_time: f64,
    pub completeness: f64,
    pub downloaded_pdfs: u32,
}

/// Response for the enhanced search endpoint
#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub result: SearchResultPayload,
    pub enhanced_data: EnhancedData,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf_download_url: Option<String>,
}

impl SearchResponse {
    fn from_result(result: &EnhancedResult, job_id: Option<String>) -> Self {
        let pdf_download_url = job_id
            .as_ref()
            .map(|id| format!("/api/download-pdfs/{}", id));
        Self {
            result: SearchResultPayload {
                success: true,
                data: result.violations.clone(),
                error_message: None,
            },
            enhanced_data: EnhancedData {
                data_sources: result.metadata.data_sources.clone(),
                processing_time: result.metadata.processing_time_secs,
                completeness: result.metadata.completeness,
                downloaded_pdfs: result.metadata.downloaded_images,
            },
            job_id,
            pdf_download_url,
        }
    }

    fn from_error(error: &LookupError) -> Self {
        Self {
            result: SearchResultPayload {
                success: false,
                data: Vec::new(),
                error_message: Some(error.to_string()),
            },
            enhanced_data: EnhancedData {
                data_sources: Vec::new(),
                processing_time: 0.0,
                completeness: 0.0,
                downloaded_pdfs: 0,
            },
            job_id: None,
            pdf_download_url: None,
        }
    }
}

/// Map pipeline errors to HTTP status codes. Terminal errors always leave
/// the boundary as a structured payload, never a raw transport fault.
pub fn error_status(error: &LookupError) -> StatusCode {
    match error {
        LookupError::ValidationError(_) => StatusCode::UNPROCESSABLE_ENTITY,
        LookupError::NotFound(_) => StatusCode::NOT_FOUND,
        LookupError::SiteUnavailable(_)
        | LookupError::CaptchaUnsolvable(_)
        | LookupError::ParseError(_) => StatusCode::BAD_GATEWAY,
        LookupError::Browser(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Enhanced violation search: reconciled result plus a bulk ticket-image
/// download job.
pub async fn search_violations_enhanced(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ViolationSearchBody>,
) -> Response {
    let query = match Query::new(&body.license_plate, &body.state) {
        Ok(query) => query,
        Err(e) => {
            LOOKUPS_TOTAL.with_label_values(&["invalid"]).inc();
            return (error_status(&e), Json(SearchResponse::from_error(&e))).into_response();
        }
    };

    let result = match state.pipeline().search(&query).await {
        Ok(result) => {
            LOOKUPS_TOTAL.with_label_values(&["success"]).inc();
            result
        }
        Err(e) => {
            LOOKUPS_TOTAL.with_label_values(&["error"]).inc();
            return (error_status(&e), Json(SearchResponse::from_error(&e))).into_response();
        }
    };

    // Kick off (or attach to) the bulk ticket-image job. The search result
    // is still valuable when job creation fails, so that path degrades.
    let job_id = match state.jobs().create(query).await {
        Ok(job) => {
            JOBS_CREATED_TOTAL.with_label_values(&["search"]).inc();
            Some(job.id)
        }
        Err(e) => {
            warn!(error = %e, "Could not create bulk-download job");
            None
        }
    };

    Json(SearchResponse::from_result(&result, job_id)).into_response()
}

/// Render the violation report for a query as a downloadable document.
pub async fn generate_pdf_enhanced(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ViolationSearchBody>,
) -> Response {
    let query = match Query::new(&body.license_plate, &body.state) {
        Ok(query) => query,
        Err(e) => {
            return (error_status(&e), Json(SearchResponse::from_error(&e))).into_response();
        }
    };

    let result = match state.pipeline().search(&query).await {
        Ok(result) => result,
        Err(e) => {
            return (error_status(&e), Json(SearchResponse::from_error(&e))).into_response();
        }
    };

    // Attach ticket images from the latest finished job, when one exists.
    let job = state
        .jobs()
        .latest_for_query(&query)
        .unwrap_or_default()
        .filter(|job| job.state.is_success_bearing());

    let generated_at = Utc::now();
    let bytes = render_report(&result, job.as_ref(), generated_at);

    let filename = format!(
        "violations_{}_{}_{}.pdf",
        query.license_plate,
        query.state,
        generated_at.format("%Y%m%d_%H%M%S")
    );

    (
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename={}", filename),
            ),
        ],
        bytes,
    )
        .into_response()
}
