//! Job record and state machine types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;
use crate::violation::Query;

/// Current state of a bulk-download job.
///
/// State machine flow:
/// ```text
/// Queued -> Running -> Completed   (every ticket image fetched)
///                   -> Partial     (some downloads exhausted retries)
///                   -> Failed      (search failed, cancelled, timed out)
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    /// Created, waiting for a session.
    Queued,

    /// A session is claimed and the lookup/downloads are in flight.
    Running {
        started_at: DateTime<Utc>,
        /// Number of ticket images the job will attempt.
        total_images: u32,
        /// Images fetched so far.
        downloaded: u32,
    },

    /// Every violation's ticket image was fetched (terminal).
    Completed {
        completed_at: DateTime<Utc>,
        downloaded: u32,
        /// Archive of the fetched images, when any were produced.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        archive_path: Option<String>,
    },

    /// Some image downloads exhausted their retries while others succeeded
    /// (terminal). Per-item outcomes carry the detail.
    Partial {
        completed_at: DateTime<Utc>,
        downloaded: u32,
        failed: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        archive_path: Option<String>,
    },

    /// The underlying search failed, or the job was cancelled or timed out
    /// (terminal).
    Failed {
        failed_at: DateTime<Utc>,
        kind: ErrorKind,
        error: String,
    },
}

impl JobState {
    /// Returns true if this is a terminal state (no further transitions).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed { .. } | JobState::Partial { .. } | JobState::Failed { .. }
        )
    }

    /// Returns true while the job still holds or may claim a session.
    pub fn is_active(&self) -> bool {
        matches!(self, JobState::Queued | JobState::Running { .. })
    }

    /// Returns true for terminal states that produced downloadable images.
    pub fn is_success_bearing(&self) -> bool {
        match self {
            JobState::Completed { .. } => true,
            JobState::Partial { downloaded, .. } => *downloaded > 0,
            _ => false,
        }
    }

    /// Path of the image archive, when one was produced.
    pub fn archive_path(&self) -> Option<&str> {
        match self {
            JobState::Completed { archive_path, .. } | JobState::Partial { archive_path, .. } => {
                archive_path.as_deref()
            }
            _ => None,
        }
    }

    /// Returns the state type as a string (for filtering and metrics).
    pub fn state_type(&self) -> &'static str {
        match self {
            JobState::Queued => "QUEUED",
            JobState::Running { .. } => "RUNNING",
            JobState::Completed { .. } => "COMPLETED",
            JobState::Partial { .. } => "PARTIAL",
            JobState::Failed { .. } => "FAILED",
        }
    }
}

/// Outcome of one ticket-image download attempt series.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DownloadOutcome {
    /// Violation the image belongs to.
    pub summons_number: String,
    pub success: bool,
    /// Size of the fetched image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes: Option<u64>,
    /// Last error when all attempts failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Attempts consumed.
    pub attempts: u32,
}

impl DownloadOutcome {
    pub fn succeeded(summons_number: impl Into<String>, bytes: u64, attempts: u32) -> Self {
        Self {
            summons_number: summons_number.into(),
            success: true,
            bytes: Some(bytes),
            error: None,
            attempts,
        }
    }

    pub fn failed(summons_number: impl Into<String>, error: impl Into<String>, attempts: u32) -> Self {
        Self {
            summons_number: summons_number.into(),
            success: false,
            bytes: None,
            error: Some(error.into()),
            attempts,
        }
    }
}

/// A persisted bulk-download job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    /// Unique identifier (UUID).
    pub id: String,

    /// The query this job fulfills.
    pub query: Query,

    /// Current state.
    pub state: JobState,

    /// Per-violation download outcomes, filled as the job runs.
    #[serde(default)]
    pub outcomes: Vec<DownloadOutcome>,

    /// When the job was created.
    pub created_at: DateTime<Utc>,

    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Number of successfully downloaded images recorded so far.
    pub fn downloaded_count(&self) -> u32 {
        self.outcomes.iter().filter(|o| o.success).count() as u32
    }
}
