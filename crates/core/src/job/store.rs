//! Job storage trait.

use thiserror::Error;

use crate::violation::Query;

use super::{DownloadOutcome, Job, JobState};

/// Error type for job store operations.
#[derive(Debug, Error)]
pub enum JobError {
    /// Job not found.
    #[error("Job not found: {0}")]
    NotFound(String),

    /// Cannot perform operation due to current state.
    #[error("Cannot {operation} job {job_id}: current state is {current_state}")]
    InvalidState {
        job_id: String,
        current_state: String,
        operation: String,
    },

    /// Database error.
    #[error("Database error: {0}")]
    Database(String),
}

/// Trait for job storage backends.
///
/// The job manager is the single writer-of-record: handlers read snapshots
/// through it, never mutate rows themselves.
pub trait JobStore: Send + Sync {
    /// Create a new QUEUED job for the query.
    fn create(&self, query: &Query) -> Result<Job, JobError>;

    /// Get a job by id.
    fn get(&self, id: &str) -> Result<Option<Job>, JobError>;

    /// Update a job's state. Rejects transitions out of terminal states.
    fn update_state(&self, id: &str, new_state: JobState) -> Result<Job, JobError>;

    /// Replace the per-violation download outcomes.
    fn set_outcomes(&self, id: &str, outcomes: &[DownloadOutcome]) -> Result<(), JobError>;

    /// Find the most recent QUEUED or RUNNING job for this query, if any.
    /// Backs the idempotent-create contract.
    fn find_active(&self, query: &Query) -> Result<Option<Job>, JobError>;

    /// Find the most recent job for this query in any state. Used to attach
    /// already-downloaded ticket images to reports.
    fn find_latest(&self, query: &Query) -> Result<Option<Job>, JobError>;

    /// Number of QUEUED or RUNNING jobs.
    fn count_active(&self) -> Result<i64, JobError>;

    /// Fail-closed every job left QUEUED or RUNNING by a previous process.
    /// Returns the number of jobs transitioned.
    fn mark_interrupted(&self) -> Result<usize, JobError>;
}
