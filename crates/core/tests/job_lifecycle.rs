//! Job lifecycle integration tests.
//!
//! These tests drive the job manager end to end with mock sources and
//! fetchers: creation, idempotent dedup, terminal states, per-item retry,
//! cancellation and session-pool release.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use platewatch_core::{
    browser::{PoolableSession, SessionPool},
    config::{JobsConfig, PoolConfig, PortalConfig, ReconcileConfig},
    testing::{fixtures, MockImageFetcher, MockSource},
    ErrorKind, JobError, JobManager, JobState, LookupError, LookupPipeline, Query, Reconciler,
    ResultCache, SqliteJobStore, SqliteResultCache, ViolationSource,
};

/// Test helper wiring a manager to fully mocked dependencies.
struct TestHarness {
    portal: Arc<MockSource>,
    reference: Arc<MockSource>,
    fetcher: Arc<MockImageFetcher>,
    cache: Arc<SqliteResultCache>,
    pipeline: Arc<LookupPipeline>,
    manager: JobManager,
    _temp_dir: TempDir,
}

impl TestHarness {
    fn new() -> Self {
        let portal = Arc::new(MockSource::portal());
        Self::build(Arc::clone(&portal) as Arc<dyn ViolationSource>, portal)
    }

    /// Harness with a caller-supplied portal source; the MockSource field is
    /// wired but unused in that mode.
    fn with_portal_source(portal_source: Arc<dyn ViolationSource>) -> Self {
        Self::build(portal_source, Arc::new(MockSource::portal()))
    }

    fn build(portal_source: Arc<dyn ViolationSource>, portal: Arc<MockSource>) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");

        let reference = Arc::new(MockSource::open_data());
        let fetcher = Arc::new(MockImageFetcher::new());
        let cache =
            Arc::new(SqliteResultCache::in_memory(Duration::from_secs(60)).expect("cache"));
        let store = Arc::new(SqliteJobStore::in_memory().expect("job store"));

        let pipeline = Arc::new(LookupPipeline::new(
            portal_source,
            Arc::clone(&reference) as Arc<dyn ViolationSource>,
            Reconciler::new(ReconcileConfig::default()),
            Arc::clone(&cache) as Arc<dyn ResultCache>,
        ));

        let jobs_config = JobsConfig {
            download_dir: temp_dir.path().join("downloads"),
            max_download_attempts: 3,
            download_concurrency: 4,
            retry_backoff_ms: 1,
            job_timeout_secs: 30,
        };

        let manager = JobManager::new(
            store,
            Arc::clone(&pipeline),
            Arc::clone(&fetcher) as Arc<dyn platewatch_core::ImageFetcher>,
            jobs_config,
        );

        Self {
            portal,
            reference,
            fetcher,
            cache,
            pipeline,
            manager,
            _temp_dir: temp_dir,
        }
    }

    /// Poll until the job reaches a terminal state.
    async fn wait_terminal(&self, job_id: &str) -> JobState {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let job = self.manager.get_status(job_id).expect("job exists");
            if job.state.is_terminal() {
                return job.state;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "job {} did not reach a terminal state, stuck in {}",
                job_id,
                job.state.state_type()
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

#[tokio::test]
async fn test_empty_query_completes_with_zero_downloads() {
    let harness = TestHarness::new();
    let query = fixtures::query("ABC1234");

    let job = harness.manager.create(query.clone()).await.unwrap();
    let state = harness.wait_terminal(&job.id).await;

    match state {
        JobState::Completed {
            downloaded,
            archive_path,
            ..
        } => {
            assert_eq!(downloaded, 0);
            assert!(archive_path.is_none());
        }
        other => panic!("expected COMPLETED, got {:?}", other),
    }

    let job = harness.manager.get_status(&job.id).unwrap();
    assert!(job.outcomes.is_empty());

    // The search result itself is cached and empty.
    let cached = harness.cache.get(&query).unwrap().unwrap();
    assert!(cached.violations.is_empty());
    assert_eq!(cached.metadata.downloaded_images, 0);
}

#[tokio::test]
async fn test_job_downloads_images_and_archives() {
    let harness = TestHarness::new();
    let url = "https://img.example/8001234567.pdf";

    harness
        .portal
        .set_violations(vec![fixtures::with_image("8001234567", 65.0, url)])
        .await;
    harness.fetcher.insert(url, b"pdf bytes".to_vec()).await;

    let query = fixtures::query("XYZ9999");
    let job = harness.manager.create(query.clone()).await.unwrap();
    let state = harness.wait_terminal(&job.id).await;

    match &state {
        JobState::Completed {
            downloaded,
            archive_path,
            ..
        } => {
            assert_eq!(*downloaded, 1);
            let path = archive_path.as_ref().expect("archive written");
            assert!(std::path::Path::new(path).exists());
        }
        other => panic!("expected COMPLETED, got {:?}", other),
    }

    let job = harness.manager.get_status(&job.id).unwrap();
    assert_eq!(job.outcomes.len(), 1);
    assert!(job.outcomes[0].success);
    assert_eq!(job.outcomes[0].summons_number, "8001234567");

    // Cached result now reports the image count.
    let cached = harness.cache.get(&query).unwrap().unwrap();
    assert_eq!(cached.metadata.downloaded_images, 1);
}

#[tokio::test]
async fn test_partial_when_one_download_exhausts_retries() {
    let harness = TestHarness::new();
    let good = "https://img.example/good.pdf";
    let bad = "https://img.example/bad.pdf";

    harness
        .portal
        .set_violations(vec![
            fixtures::with_image("8001111111", 65.0, good),
            fixtures::with_image("8002222222", 35.0, bad),
        ])
        .await;
    harness.fetcher.insert(good, b"image".to_vec()).await;
    // `bad` is never registered, so every fetch fails.

    let job = harness
        .manager
        .create(fixtures::query("XYZ9999"))
        .await
        .unwrap();
    let state = harness.wait_terminal(&job.id).await;

    match state {
        JobState::Partial {
            downloaded, failed, ..
        } => {
            assert_eq!(downloaded, 1);
            assert_eq!(failed, 1);
        }
        other => panic!("expected PARTIAL, got {:?}", other),
    }

    // The broken link was retried to exhaustion, not once.
    assert_eq!(harness.fetcher.fetch_count(bad).await, 3);

    let job = harness.manager.get_status(&job.id).unwrap();
    let bad_outcome = job
        .outcomes
        .iter()
        .find(|o| o.summons_number == "8002222222")
        .unwrap();
    assert!(!bad_outcome.success);
    assert_eq!(bad_outcome.attempts, 3);
    assert!(bad_outcome.error.is_some());
}

#[tokio::test]
async fn test_transient_download_failures_are_retried_to_success() {
    let harness = TestHarness::new();
    let url = "https://img.example/flaky.pdf";

    harness
        .portal
        .set_violations(vec![fixtures::with_image("8001234567", 65.0, url)])
        .await;
    harness.fetcher.insert(url, b"image".to_vec()).await;
    harness.fetcher.fail_times(url, 2).await;

    let job = harness
        .manager
        .create(fixtures::query("XYZ9999"))
        .await
        .unwrap();
    let state = harness.wait_terminal(&job.id).await;

    assert!(matches!(state, JobState::Completed { downloaded: 1, .. }));
    assert_eq!(harness.fetcher.fetch_count(url).await, 3);

    let job = harness.manager.get_status(&job.id).unwrap();
    assert_eq!(job.outcomes[0].attempts, 3);
}

#[tokio::test]
async fn test_duplicate_create_returns_same_job() {
    let harness = TestHarness::new();
    // Keep the job in flight long enough to observe the dedup.
    harness.portal.set_delay(Duration::from_millis(300)).await;

    let query = fixtures::query("ABC1234");
    let first = harness.manager.create(query.clone()).await.unwrap();
    let second = harness.manager.create(query.clone()).await.unwrap();
    assert_eq!(first.id, second.id);

    // A different query gets its own job.
    let other = harness
        .manager
        .create(fixtures::query("XYZ9999"))
        .await
        .unwrap();
    assert_ne!(first.id, other.id);

    harness.wait_terminal(&first.id).await;

    // Once terminal, the same query starts a fresh job.
    let fresh = harness.manager.create(query).await.unwrap();
    assert_ne!(fresh.id, first.id);
    harness.wait_terminal(&other.id).await;
    harness.wait_terminal(&fresh.id).await;
}

#[tokio::test]
async fn test_captcha_failure_ends_failed_and_stays_failed() {
    let harness = TestHarness::new();
    harness
        .portal
        .set_error(LookupError::CaptchaUnsolvable(
            "exhausted 2 attempts".to_string(),
        ))
        .await;

    let job = harness
        .manager
        .create(fixtures::query("ABC1234"))
        .await
        .unwrap();
    let state = harness.wait_terminal(&job.id).await;

    match state {
        JobState::Failed { kind, .. } => assert_eq!(kind, ErrorKind::CaptchaUnsolvable),
        other => panic!("expected FAILED, got {:?}", other),
    }

    // A failed job never returns to QUEUED or RUNNING.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let job = harness.manager.get_status(&job.id).unwrap();
    assert_eq!(job.state.state_type(), "FAILED");
}

#[tokio::test]
async fn test_search_failure_marks_job_failed_with_kind() {
    let harness = TestHarness::new();
    harness
        .portal
        .set_error(LookupError::ParseError("layout changed".to_string()))
        .await;

    let job = harness
        .manager
        .create(fixtures::query("ABC1234"))
        .await
        .unwrap();
    let state = harness.wait_terminal(&job.id).await;

    match state {
        JobState::Failed { kind, error, .. } => {
            assert_eq!(kind, ErrorKind::ParseError);
            assert!(error.contains("layout changed"));
        }
        other => panic!("expected FAILED, got {:?}", other),
    }
}

#[tokio::test]
async fn test_get_status_unknown_job() {
    let harness = TestHarness::new();
    let result = harness.manager.get_status("no-such-job");
    assert!(matches!(result, Err(JobError::NotFound(_))));
}

#[tokio::test]
async fn test_cancel_terminal_job_is_rejected() {
    let harness = TestHarness::new();
    let job = harness
        .manager
        .create(fixtures::query("ABC1234"))
        .await
        .unwrap();
    harness.wait_terminal(&job.id).await;

    let result = harness.manager.cancel(&job.id).await;
    assert!(matches!(result, Err(JobError::InvalidState { .. })));
}

#[tokio::test]
async fn test_two_source_results_tag_origins() {
    let harness = TestHarness::new();
    harness
        .portal
        .set_violations(vec![fixtures::outstanding("8001234567", 65.0)])
        .await;
    harness
        .reference
        .set_violations(vec![fixtures::paid("8001234999")])
        .await;

    let result = harness
        .pipeline
        .search(&fixtures::query("XYZ9999"))
        .await
        .unwrap();

    assert_eq!(result.violations.len(), 2);
    let scraped = result
        .violations
        .iter()
        .find(|v| v.summons_number == "8001234567")
        .unwrap();
    let api = result
        .violations
        .iter()
        .find(|v| v.summons_number == "8001234999")
        .unwrap();

    assert_eq!(scraped.origin, platewatch_core::Origin::Scraped);
    assert_eq!(scraped.amount_due, Some(65.0));
    assert_eq!(scraped.status, platewatch_core::ViolationStatus::Outstanding);
    assert_eq!(api.origin, platewatch_core::Origin::Api);
    assert_eq!(api.amount_due, Some(0.0));
    assert_eq!(api.status, platewatch_core::ViolationStatus::Paid);
    assert_eq!(result.metadata.data_sources, vec!["portal", "open_data"]);
}

#[tokio::test]
async fn test_reference_failure_degrades_to_portal_only() {
    let harness = TestHarness::new();
    harness
        .portal
        .set_violations(vec![fixtures::outstanding("8001234567", 65.0)])
        .await;
    harness
        .reference
        .set_error(LookupError::SiteUnavailable("api down".to_string()))
        .await;

    let result = harness
        .pipeline
        .search(&fixtures::query("XYZ9999"))
        .await
        .unwrap();

    assert_eq!(result.violations.len(), 1);
    assert_eq!(result.metadata.data_sources, vec!["portal"]);
}

#[tokio::test]
async fn test_second_search_is_served_from_cache() {
    let harness = TestHarness::new();
    harness
        .portal
        .set_violations(vec![fixtures::outstanding("8001234567", 65.0)])
        .await;

    let query = fixtures::query("XYZ9999");
    harness.pipeline.search(&query).await.unwrap();
    harness.pipeline.search(&query).await.unwrap();

    // The portal was only scraped once; the second search hit the cache.
    assert_eq!(harness.portal.fetch_count().await, 1);
}

// ============================================================================
// Cancellation and session release
// ============================================================================

struct FakeSession;

#[async_trait]
impl PoolableSession for FakeSession {
    async fn create(_portal: &PortalConfig) -> Result<Self, LookupError> {
        Ok(FakeSession)
    }

    async fn healthy(&self, _budget: Duration) -> bool {
        true
    }
}

/// A portal source that holds a pooled session until it is aborted.
struct HoldingPortal {
    pool: Arc<SessionPool<FakeSession>>,
}

#[async_trait]
impl ViolationSource for HoldingPortal {
    fn name(&self) -> &'static str {
        "portal"
    }

    async fn fetch(&self, _query: &Query) -> Result<Vec<platewatch_core::Violation>, LookupError> {
        let _handle = self.pool.acquire().await?;
        // Hold the session until the job task is aborted.
        tokio::time::sleep(Duration::from_secs(300)).await;
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn test_cancel_running_job_releases_session() {
    let pool = Arc::new(SessionPool::<FakeSession>::new(
        PoolConfig {
            max_sessions: 1,
            acquire_timeout_secs: 5,
            health_check_timeout_secs: 1,
        },
        PortalConfig::default(),
    ));

    let harness = TestHarness::with_portal_source(Arc::new(HoldingPortal {
        pool: Arc::clone(&pool),
    }));

    let job = harness
        .manager
        .create(fixtures::query("ABC1234"))
        .await
        .unwrap();

    // Wait for the job to claim the only session.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while pool.available() != 0 {
        assert!(tokio::time::Instant::now() < deadline, "job never claimed a session");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let cancelled = harness.manager.cancel(&job.id).await.unwrap();
    match cancelled.state {
        JobState::Failed { kind, .. } => assert_eq!(kind, ErrorKind::Cancelled),
        other => panic!("expected FAILED(cancelled), got {:?}", other),
    }

    // Aborting the task drops the session handle, so availability recovers
    // promptly.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
    while pool.available() != 1 {
        assert!(
            tokio::time::Instant::now() < deadline,
            "cancel did not release the session"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    // The job stays failed.
    let job = harness.manager.get_status(&job.id).unwrap();
    assert_eq!(job.state.state_type(), "FAILED");
}
