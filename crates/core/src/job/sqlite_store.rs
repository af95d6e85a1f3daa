//! SQLite-backed job store implementation.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use crate::error::ErrorKind;
use crate::violation::Query;

use super::{DownloadOutcome, Job, JobError, JobState, JobStore};

const JOB_COLUMNS: &str = "id, plate, state_code, state, outcomes, created_at, updated_at";

/// SQLite-backed job store.
pub struct SqliteJobStore {
    conn: Mutex<Connection>,
}

impl SqliteJobStore {
    /// Create a new SQLite job store, creating the database file and tables
    /// if needed.
    pub fn new(path: &Path) -> Result<Self, JobError> {
        let conn = Connection::open(path).map_err(|e| JobError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory job store (useful for testing).
    pub fn in_memory() -> Result<Self, JobError> {
        let conn = Connection::open_in_memory().map_err(|e| JobError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), JobError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id TEXT PRIMARY KEY,
                plate TEXT NOT NULL,
                state_code TEXT NOT NULL,
                state TEXT NOT NULL,
                outcomes TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_jobs_query ON jobs(plate, state_code);
            CREATE INDEX IF NOT EXISTS idx_jobs_updated_at ON jobs(updated_at);
            "#,
        )
        .map_err(|e| JobError::Database(e.to_string()))?;
        Ok(())
    }

    fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<Job> {
        let id: String = row.get(0)?;
        let plate: String = row.get(1)?;
        let state_code: String = row.get(2)?;
        let state_json: String = row.get(3)?;
        let outcomes_json: String = row.get(4)?;
        let created_at_str: String = row.get(5)?;
        let updated_at_str: String = row.get(6)?;

        let created_at = DateTime::parse_from_rfc3339(&created_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        let updated_at = DateTime::parse_from_rfc3339(&updated_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        let state: JobState = serde_json::from_str(&state_json).unwrap_or(JobState::Queued);
        let outcomes: Vec<DownloadOutcome> =
            serde_json::from_str(&outcomes_json).unwrap_or_default();

        Ok(Job {
            id,
            query: Query {
                license_plate: plate,
                state: state_code,
            },
            state,
            outcomes,
            created_at,
            updated_at,
        })
    }

    fn get_locked(conn: &Connection, id: &str) -> Result<Option<Job>, JobError> {
        let result = conn.query_row(
            &format!("SELECT {} FROM jobs WHERE id = ?", JOB_COLUMNS),
            params![id],
            Self::row_to_job,
        );

        match result {
            Ok(job) => Ok(Some(job)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(JobError::Database(e.to_string())),
        }
    }
}

impl JobStore for SqliteJobStore {
    fn create(&self, query: &Query) -> Result<Job, JobError> {
        let conn = self.conn.lock().unwrap();

        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        let state = JobState::Queued;

        let state_json =
            serde_json::to_string(&state).map_err(|e| JobError::Database(e.to_string()))?;

        conn.execute(
            "INSERT INTO jobs (id, plate, state_code, state, outcomes, created_at, updated_at) VALUES (?, ?, ?, ?, '[]', ?, ?)",
            params![
                id,
                query.license_plate,
                query.state,
                state_json,
                now.to_rfc3339(),
                now.to_rfc3339(),
            ],
        )
        .map_err(|e| JobError::Database(e.to_string()))?;

        Ok(Job {
            id,
            query: query.clone(),
            state,
            outcomes: Vec::new(),
            created_at: now,
            updated_at: now,
        })
    }

    fn get(&self, id: &str) -> Result<Option<Job>, JobError> {
        let conn = self.conn.lock().unwrap();
        Self::get_locked(&conn, id)
    }

    fn update_state(&self, id: &str, new_state: JobState) -> Result<Job, JobError> {
        let conn = self.conn.lock().unwrap();

        let current =
            Self::get_locked(&conn, id)?.ok_or_else(|| JobError::NotFound(id.to_string()))?;

        if current.state.is_terminal() {
            return Err(JobError::InvalidState {
                job_id: id.to_string(),
                current_state: current.state.state_type().to_string(),
                operation: format!("transition to {}", new_state.state_type()),
            });
        }

        let state_json =
            serde_json::to_string(&new_state).map_err(|e| JobError::Database(e.to_string()))?;
        let now = Utc::now();

        conn.execute(
            "UPDATE jobs SET state = ?, updated_at = ? WHERE id = ?",
            params![state_json, now.to_rfc3339(), id],
        )
        .map_err(|e| JobError::Database(e.to_string()))?;

        Ok(Job {
            state: new_state,
            updated_at: now,
            ..current
        })
    }

    fn set_outcomes(&self, id: &str, outcomes: &[DownloadOutcome]) -> Result<(), JobError> {
        let conn = self.conn.lock().unwrap();

        let outcomes_json =
            serde_json::to_string(outcomes).map_err(|e| JobError::Database(e.to_string()))?;

        let updated = conn
            .execute(
                "UPDATE jobs SET outcomes = ?, updated_at = ? WHERE id = ?",
                params![outcomes_json, Utc::now().to_rfc3339(), id],
            )
            .map_err(|e| JobError::Database(e.to_string()))?;

        if updated == 0 {
            return Err(JobError::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn find_active(&self, query: &Query) -> Result<Option<Job>, JobError> {
        let conn = self.conn.lock().unwrap();

        let result = conn.query_row(
            &format!(
                "SELECT {} FROM jobs WHERE plate = ? AND state_code = ? \
                 AND json_extract(state, '$.type') IN ('QUEUED', 'RUNNING') \
                 ORDER BY created_at DESC LIMIT 1",
                JOB_COLUMNS
            ),
            params![query.license_plate, query.state],
            Self::row_to_job,
        );

        match result {
            Ok(job) => Ok(Some(job)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(JobError::Database(e.to_string())),
        }
    }

    fn find_latest(&self, query: &Query) -> Result<Option<Job>, JobError> {
        let conn = self.conn.lock().unwrap();

        let result = conn.query_row(
            &format!(
                "SELECT {} FROM jobs WHERE plate = ? AND state_code = ? \
                 ORDER BY created_at DESC LIMIT 1",
                JOB_COLUMNS
            ),
            params![query.license_plate, query.state],
            Self::row_to_job,
        );

        match result {
            Ok(job) => Ok(Some(job)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(JobError::Database(e.to_string())),
        }
    }

    fn count_active(&self) -> Result<i64, JobError> {
        let conn = self.conn.lock().unwrap();

        conn.query_row(
            "SELECT COUNT(*) FROM jobs WHERE json_extract(state, '$.type') IN ('QUEUED', 'RUNNING')",
            [],
            |row| row.get(0),
        )
        .map_err(|e| JobError::Database(e.to_string()))
    }

    fn mark_interrupted(&self) -> Result<usize, JobError> {
        let conn = self.conn.lock().unwrap();

        let state = JobState::Failed {
            failed_at: Utc::now(),
            kind: ErrorKind::Interrupted,
            error: "process restarted while job was in flight".to_string(),
        };
        let state_json =
            serde_json::to_string(&state).map_err(|e| JobError::Database(e.to_string()))?;

        let updated = conn
            .execute(
                "UPDATE jobs SET state = ?, updated_at = ? \
                 WHERE json_extract(state, '$.type') IN ('QUEUED', 'RUNNING')",
                params![state_json, Utc::now().to_rfc3339()],
            )
            .map_err(|e| JobError::Database(e.to_string()))?;

        Ok(updated)
    }
}
