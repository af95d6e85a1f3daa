//! Job manager: lifecycle owner for bulk ticket-image downloads.
//!
//! Each job runs as an independent task so submission never blocks the
//! caller, who polls status. The manager is the single writer of job state;
//! handlers read snapshots through it. Cancellation aborts the job task,
//! which drops its session handle and frees the pool slot immediately.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::JobsConfig;
use crate::error::ErrorKind;
use crate::pipeline::LookupPipeline;
use crate::violation::Query;

use super::archive::write_archive;
use super::fetcher::ImageFetcher;
use super::store::{JobError, JobStore};
use super::types::{DownloadOutcome, Job, JobState};

/// Owns job lifecycle: creation, execution, cancellation, status reads.
pub struct JobManager {
    store: Arc<dyn JobStore>,
    pipeline: Arc<LookupPipeline>,
    fetcher: Arc<dyn ImageFetcher>,
    config: JobsConfig,
    /// Join handles of in-flight job tasks, for cancellation.
    active: Arc<Mutex<HashMap<String, JoinHandle<()>>>>,
    /// Serializes find-active/create so duplicate submissions of the same
    /// query cannot race into two jobs.
    create_lock: Mutex<()>,
}

impl JobManager {
    pub fn new(
        store: Arc<dyn JobStore>,
        pipeline: Arc<LookupPipeline>,
        fetcher: Arc<dyn ImageFetcher>,
        config: JobsConfig,
    ) -> Self {
        Self {
            store,
            pipeline,
            fetcher,
            config,
            active: Arc::new(Mutex::new(HashMap::new())),
            create_lock: Mutex::new(()),
        }
    }

    /// Fail-closed any jobs a previous process left in flight, so callers
    /// always observe a terminal state. Called once at startup.
    pub fn recover_interrupted(&self) -> Result<usize, JobError> {
        let recovered = self.store.mark_interrupted()?;
        if recovered > 0 {
            warn!(count = recovered, "Marked interrupted jobs as failed");
        }
        Ok(recovered)
    }

    /// Create a bulk-download job for the query, or return the job already
    /// in flight for an identical query (idempotent create).
    pub async fn create(&self, query: Query) -> Result<Job, JobError> {
        let _guard = self.create_lock.lock().await;

        if let Some(existing) = self.store.find_active(&query)? {
            debug!(job_id = %existing.id, query = %query, "Reusing in-flight job");
            return Ok(existing);
        }

        let job = self.store.create(&query)?;
        info!(job_id = %job.id, query = %query, "Job created");
        self.spawn_job(job.clone()).await;
        Ok(job)
    }

    /// Snapshot of a job's current state.
    pub fn get_status(&self, job_id: &str) -> Result<Job, JobError> {
        self.store
            .get(job_id)?
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))
    }

    /// Cancel a QUEUED or RUNNING job: the task is aborted (releasing its
    /// session promptly) and the job transitions to FAILED(cancelled).
    pub async fn cancel(&self, job_id: &str) -> Result<Job, JobError> {
        if let Some(handle) = self.active.lock().await.remove(job_id) {
            handle.abort();
            debug!(job_id, "Job task aborted");
        }

        let job = self.store.update_state(
            job_id,
            JobState::Failed {
                failed_at: Utc::now(),
                kind: ErrorKind::Cancelled,
                error: "cancelled by caller".to_string(),
            },
        )?;

        info!(job_id, "Job cancelled");
        Ok(job)
    }

    /// Number of jobs currently QUEUED or RUNNING.
    pub fn active_count(&self) -> Result<i64, JobError> {
        self.store.count_active()
    }

    /// Most recent job for this query in any state, if one exists.
    pub fn latest_for_query(&self, query: &Query) -> Result<Option<Job>, JobError> {
        self.store.find_latest(query)
    }

    /// Abort all in-flight job tasks (shutdown path). Jobs are left RUNNING
    /// in the store and fail closed on the next startup.
    pub async fn shutdown(&self) {
        let mut active = self.active.lock().await;
        for (job_id, handle) in active.drain() {
            debug!(job_id = %job_id, "Aborting job task on shutdown");
            handle.abort();
        }
    }

    async fn spawn_job(&self, job: Job) {
        let store = Arc::clone(&self.store);
        let pipeline = Arc::clone(&self.pipeline);
        let fetcher = Arc::clone(&self.fetcher);
        let config = self.config.clone();
        let active = Arc::clone(&self.active);
        let job_id = job.id.clone();
        let budget = Duration::from_secs(config.job_timeout_secs);

        // The map lock is held across spawn+insert, so the task's own
        // removal (which also takes the lock) cannot run before the insert.
        let mut active_map = self.active.lock().await;
        let handle = tokio::spawn({
            let job_id = job_id.clone();
            async move {
                let run = Self::run_job(&store, &pipeline, &fetcher, &config, &job);
                match tokio::time::timeout(budget, run).await {
                    Ok(()) => {}
                    Err(_) => {
                        error!(job_id = %job.id, "Job exceeded its duration budget");
                        let _ = store.update_state(
                            &job.id,
                            JobState::Failed {
                                failed_at: Utc::now(),
                                kind: ErrorKind::SiteUnavailable,
                                error: format!("job timed out after {}s", config.job_timeout_secs),
                            },
                        );
                    }
                }
                active.lock().await.remove(&job_id);
            }
        });
        active_map.insert(job_id, handle);
    }

    /// The body of one job task.
    async fn run_job(
        store: &Arc<dyn JobStore>,
        pipeline: &Arc<LookupPipeline>,
        fetcher: &Arc<dyn ImageFetcher>,
        config: &JobsConfig,
        job: &Job,
    ) {
        let started_at = Utc::now();
        if let Err(e) = store.update_state(
            &job.id,
            JobState::Running {
                started_at,
                total_images: 0,
                downloaded: 0,
            },
        ) {
            // Most likely cancelled between creation and scheduling.
            warn!(job_id = %job.id, error = %e, "Could not mark job running");
            return;
        }

        // The search hits the result cache when the synchronous request
        // already ran it, so this does not add scraping load.
        let result = match pipeline.search(&job.query).await {
            Ok(result) => result,
            Err(e) => {
                error!(job_id = %job.id, error = %e, "Job search failed");
                let _ = store.update_state(
                    &job.id,
                    JobState::Failed {
                        failed_at: Utc::now(),
                        kind: e.kind(),
                        error: e.to_string(),
                    },
                );
                return;
            }
        };

        let targets: Vec<(String, String)> = result
            .violations
            .iter()
            .filter_map(|v| {
                v.ticket_image_url
                    .as_ref()
                    .map(|url| (v.summons_number.clone(), url.clone()))
            })
            .collect();

        let _ = store.update_state(
            &job.id,
            JobState::Running {
                started_at,
                total_images: targets.len() as u32,
                downloaded: 0,
            },
        );

        // Per-violation downloads are independently retried units; one
        // broken link must not fail the whole job.
        let results: Vec<(DownloadOutcome, Option<Vec<u8>>)> = stream::iter(targets)
            .map(|(summons, url)| {
                let fetcher = Arc::clone(fetcher);
                let config = config.clone();
                async move { Self::download_one(&*fetcher, &config, summons, &url).await }
            })
            .buffer_unordered(config.download_concurrency)
            .collect()
            .await;

        let mut outcomes = Vec::with_capacity(results.len());
        let mut images = Vec::new();
        for (outcome, bytes) in results {
            if let Some(bytes) = bytes {
                images.push((outcome.summons_number.clone(), bytes));
            }
            outcomes.push(outcome);
        }
        // Deterministic outcome order regardless of download completion.
        outcomes.sort_by(|a, b| a.summons_number.cmp(&b.summons_number));

        if let Err(e) = store.set_outcomes(&job.id, &outcomes) {
            warn!(job_id = %job.id, error = %e, "Could not record download outcomes");
        }

        let downloaded = outcomes.iter().filter(|o| o.success).count() as u32;
        let failed = outcomes.len() as u32 - downloaded;

        let archive_path = if images.is_empty() {
            None
        } else {
            images.sort_by(|a, b| a.0.cmp(&b.0));
            let path = config.download_dir.join(format!("{}.zip", job.id));
            match write_archive(&path, &images) {
                Ok(()) => Some(path.to_string_lossy().to_string()),
                Err(e) => {
                    error!(job_id = %job.id, error = %e, "Could not write ticket archive");
                    None
                }
            }
        };

        let final_state = if failed == 0 {
            JobState::Completed {
                completed_at: Utc::now(),
                downloaded,
                archive_path,
            }
        } else {
            JobState::Partial {
                completed_at: Utc::now(),
                downloaded,
                failed,
                archive_path,
            }
        };

        pipeline.record_downloaded_images(&job.query, downloaded);

        match store.update_state(&job.id, final_state) {
            Ok(job) => {
                info!(
                    job_id = %job.id,
                    state = job.state.state_type(),
                    downloaded,
                    failed,
                    "Job finished"
                );
            }
            Err(e) => warn!(job_id = %job.id, error = %e, "Could not record final job state"),
        }
    }

    /// Download one ticket image with bounded attempts and backoff.
    async fn download_one(
        fetcher: &dyn ImageFetcher,
        config: &JobsConfig,
        summons_number: String,
        url: &str,
    ) -> (DownloadOutcome, Option<Vec<u8>>) {
        let mut last_error = String::new();

        for attempt in 1..=config.max_download_attempts {
            match fetcher.fetch(url).await {
                Ok(bytes) => {
                    debug!(summons = %summons_number, bytes = bytes.len(), attempt, "Image downloaded");
                    return (
                        DownloadOutcome::succeeded(&summons_number, bytes.len() as u64, attempt),
                        Some(bytes),
                    );
                }
                Err(e) => {
                    warn!(summons = %summons_number, attempt, error = %e, "Image download failed");
                    last_error = e.to_string();
                    if !e.is_transient() {
                        return (
                            DownloadOutcome::failed(&summons_number, last_error, attempt),
                            None,
                        );
                    }
                    if attempt < config.max_download_attempts {
                        let delay = Duration::from_millis(
                            config.retry_backoff_ms.saturating_mul(1 << (attempt - 1).min(16)),
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        (
            DownloadOutcome::failed(&summons_number, last_error, config.max_download_attempts),
            None,
        )
    }
}
