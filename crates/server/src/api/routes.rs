use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::{handlers, jobs, violations};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        // Health and config
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        // Lookup and reports
        .route(
            "/search-violations-enhanced",
            post(violations::search_violations_enhanced),
        )
        .route(
            "/generate-pdf-enhanced",
            post(violations::generate_pdf_enhanced),
        )
        // Bulk-download jobs
        .route("/job-status/{job_id}", get(jobs::job_status))
        .route("/jobs/{job_id}", delete(jobs::cancel_job))
        .route("/download-pdfs/{job_id}", get(jobs::download_pdfs))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .route("/metrics", get(handlers::get_metrics))
        .layer(middleware::from_fn(super::middleware::metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
