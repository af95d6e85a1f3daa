//! Common test utilities for API testing with mocks.
//!
//! Provides a test fixture that assembles the router in-process with mock
//! pipeline components, so endpoints can be exercised without a browser,
//! a solving service or network access.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use platewatch_core::{
    load_config_from_str,
    testing::{MockImageFetcher, MockSource},
    Config, ImageFetcher, JobManager, LookupPipeline, Reconciler, ResultCache, SqliteJobStore,
    SqliteResultCache, ViolationSource,
};
use platewatch_server::{api::create_router, state::AppState};

/// Re-export fixtures for test convenience
pub use platewatch_core::testing::fixtures;

/// Test fixture for API testing with mock dependencies.
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Mock portal scraper - configure scraped violations
    pub portal: Arc<MockSource>,
    /// Mock open-data client - configure reference records
    pub reference: Arc<MockSource>,
    /// Mock image fetcher - register ticket images
    pub fetcher: Arc<MockImageFetcher>,
    /// Temporary directory for downloads
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

/// Raw response for binary endpoints
#[derive(Debug)]
pub struct RawResponse {
    pub status: StatusCode,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl TestFixture {
    /// Create a new test fixture with default mocks.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");

        let mut config: Config = load_config_from_str("").expect("default config");
        config.jobs.download_dir = temp_dir.path().join("downloads");
        config.jobs.retry_backoff_ms = 1;

        let portal = Arc::new(MockSource::portal());
        let reference = Arc::new(MockSource::open_data());
        let fetcher = Arc::new(MockImageFetcher::new());

        let cache = Arc::new(
            SqliteResultCache::in_memory(Duration::from_secs(config.cache.ttl_secs))
                .expect("cache"),
        );
        let job_store = Arc::new(SqliteJobStore::in_memory().expect("job store"));

        let pipeline = Arc::new(LookupPipeline::new(
            Arc::clone(&portal) as Arc<dyn ViolationSource>,
            Arc::clone(&reference) as Arc<dyn ViolationSource>,
            Reconciler::new(config.reconcile.clone()),
            cache as Arc<dyn ResultCache>,
        ));

        let jobs = Arc::new(JobManager::new(
            job_store,
            Arc::clone(&pipeline),
            Arc::clone(&fetcher) as Arc<dyn ImageFetcher>,
            config.jobs.clone(),
        ));

        let state = Arc::new(AppState::new(config, pipeline, jobs));
        let router = create_router(state);

        Self {
            router,
            portal,
            reference,
            fetcher,
            temp_dir,
        }
    }

    /// Issue a GET request expecting a JSON body.
    pub async fn get(&self, path: &str) -> TestResponse {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    /// Issue a POST request with a JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    /// Issue a DELETE request.
    pub async fn delete(&self, path: &str) -> TestResponse {
        let request = Request::builder()
            .method("DELETE")
            .uri(path)
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    /// Issue a GET request and keep the raw body bytes.
    pub async fn get_raw(&self, path: &str) -> RawResponse {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .unwrap();
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("request failed");

        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes()
            .to_vec();

        RawResponse {
            status,
            content_type,
            bytes,
        }
    }

    /// Issue a POST request and keep the raw body bytes.
    pub async fn post_raw(&self, path: &str, body: Value) -> RawResponse {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("request failed");

        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes()
            .to_vec();

        RawResponse {
            status,
            content_type,
            bytes,
        }
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("request failed");

        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes();

        let body: Value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body }
    }

    /// Poll the status endpoint until the job reaches a terminal state.
    pub async fn wait_terminal(&self, job_id: &str) -> Value {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let response = self.get(&format!("/api/job-status/{}", job_id)).await;
            assert_eq!(response.status, StatusCode::OK, "job must exist");
            let state_type = response.body["state"]["type"].as_str().unwrap().to_string();
            if matches!(state_type.as_str(), "COMPLETED" | "PARTIAL" | "FAILED") {
                return response.body;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "job {} stuck in {}",
                job_id,
                state_type
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}
