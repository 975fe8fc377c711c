//! Job Record Store contract.
//!
//! All mutation goes through [`JobStore::compare_and_update`], an atomic
//! conditional update keyed on the expected prior status. There is no
//! unconditional write in the contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use super::record::{JobId, JobRecord, JobUpdate, NewJob};
use super::status::JobStatus;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Failed to encode or decode stored JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Stored record '{job_id}' is malformed: {reason}")]
    Corrupt { job_id: String, reason: String },

    #[error("Field '{field}' of job '{job_id}' is immutable once written")]
    ImmutableField { job_id: String, field: &'static str },

    #[error("Store lock poisoned")]
    LockPoisoned,

    #[error("Store task failed: {0}")]
    Task(String),
}

/// Listing filter for operator views and the sweeper.
#[derive(Debug, Clone)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    /// Only records whose `updated_at` is strictly older than this.
    pub updated_before: Option<DateTime<Utc>>,
    pub limit: usize,
}

impl Default for JobFilter {
    fn default() -> Self {
        Self {
            status: None,
            updated_before: None,
            limit: 100,
        }
    }
}

impl JobFilter {
    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn updated_before(mut self, cutoff: DateTime<Utc>) -> Self {
        self.updated_before = Some(cutoff);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn get(&self, job_id: &JobId) -> Result<Option<JobRecord>, StoreError>;

    /// Create a PENDING record unless one exists. Returns the stored record
    /// and whether this call created it.
    async fn create_if_absent(
        &self,
        job_id: &JobId,
        job: &NewJob,
    ) -> Result<(JobRecord, bool), StoreError>;

    /// Apply `update` only if the record's status still equals `expected`
    /// (and `update.if_updated_at`, when set, still matches). Returns the
    /// updated record, or `None` when the precondition did not hold or the
    /// record does not exist.
    async fn compare_and_update(
        &self,
        job_id: &JobId,
        expected: JobStatus,
        update: &JobUpdate,
    ) -> Result<Option<JobRecord>, StoreError>;

    async fn list(&self, filter: &JobFilter) -> Result<Vec<JobRecord>, StoreError>;
}
