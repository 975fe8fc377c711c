//! SQLite-backed [`JobStore`].

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Timelike, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::pipeline::record::{
    AttemptChange, JobId, JobRecord, JobUpdate, MeetingSummary, NewJob, SourceRef,
};
use crate::pipeline::status::{JobStatus, Stage};
use crate::pipeline::store::{JobFilter, JobStore, StoreError};

const COLS: &str = "job_id, status, source_ref, content_type, transcript, summary, \
    transcribe_attempts, summarize_attempts, failed_stage, last_error, created_at, updated_at";

/// A raw row from the `jobs` table.
#[derive(Debug, Clone)]
struct JobRow {
    job_id: String,
    status: String,
    source_ref: String,
    content_type: Option<String>,
    transcript: Option<String>,
    summary: Option<String>,
    transcribe_attempts: u32,
    summarize_attempts: u32,
    failed_stage: Option<String>,
    last_error: Option<String>,
    created_at: String,
    updated_at: String,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            job_id: row.get(0)?,
            status: row.get(1)?,
            source_ref: row.get(2)?,
            content_type: row.get(3)?,
            transcript: row.get(4)?,
            summary: row.get(5)?,
            transcribe_attempts: row.get(6)?,
            summarize_attempts: row.get(7)?,
            failed_stage: row.get(8)?,
            last_error: row.get(9)?,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
        })
    }

    fn into_record(self) -> Result<JobRecord, StoreError> {
        let corrupt = |reason: String| StoreError::Corrupt {
            job_id: self.job_id.clone(),
            reason,
        };

        let status = self.status.parse::<JobStatus>().map_err(corrupt)?;
        let source_ref = SourceRef::parse(&self.source_ref)
            .ok_or_else(|| corrupt(format!("invalid source_ref '{}'", self.source_ref)))?;
        let failed_stage = self
            .failed_stage
            .as_deref()
            .map(str::parse::<Stage>)
            .transpose()
            .map_err(corrupt)?;
        let summary: Option<MeetingSummary> = self
            .summary
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;
        let created_at = parse_timestamp(&self.created_at).map_err(corrupt)?;
        let updated_at = parse_timestamp(&self.updated_at).map_err(corrupt)?;

        Ok(JobRecord {
            job_id: JobId::new(self.job_id),
            status,
            source_ref,
            content_type: self.content_type,
            transcript: self.transcript,
            summary,
            transcribe_attempts: self.transcribe_attempts,
            summarize_attempts: self.summarize_attempts,
            failed_stage,
            last_error: self.last_error,
            created_at,
            updated_at,
        })
    }
}

/// Fixed-width UTC timestamps so lexical order in SQL matches time order.
fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Current time truncated to the stored precision.
fn now_micros() -> DateTime<Utc> {
    let now = Utc::now();
    now.with_nanosecond(now.nanosecond() / 1_000 * 1_000)
        .unwrap_or(now)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| format!("invalid timestamp '{}': {}", value, e))
}

fn select_by_id(conn: &Connection, job_id: &str) -> Result<Option<JobRecord>, StoreError> {
    let row = conn
        .query_row(
            &format!("SELECT {COLS} FROM jobs WHERE job_id = ?1"),
            params![job_id],
            JobRow::from_row,
        )
        .optional()?;
    row.map(JobRow::into_record).transpose()
}

/// Thread-safe store handle. Cloning is cheap; all access is serialized
/// through the inner `Mutex`, and each write runs in an IMMEDIATE
/// transaction so other processes on the same file serialize too.
#[derive(Clone)]
pub struct SqliteJobStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteJobStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = super::open(path)?;
        tracing::info!("Job store opened at {}", path.display());
        Ok(Self::from_connection(conn))
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::from_connection(super::open_in_memory()?))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    async fn with_conn<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|_| StoreError::LockPoisoned)?;
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

fn attempts_mut(record: &mut JobRecord, stage: Stage) -> &mut u32 {
    match stage {
        Stage::Transcribe => &mut record.transcribe_attempts,
        Stage::Summarize => &mut record.summarize_attempts,
    }
}

/// Compute the record that results from applying `update` to `current`.
fn apply_update(current: &JobRecord, update: &JobUpdate) -> Result<JobRecord, StoreError> {
    let mut next = current.clone();

    next.status = update.status;
    next.transcript = update.transcript.apply(current.transcript.clone());
    next.summary = update.summary.apply(current.summary.clone());
    next.failed_stage = update.failed_stage.apply(current.failed_stage);
    next.last_error = update.last_error.apply(current.last_error.clone());

    if let (Some(old), Some(new)) = (&current.transcript, &next.transcript) {
        if old != new {
            return Err(StoreError::ImmutableField {
                job_id: current.job_id.to_string(),
                field: "transcript",
            });
        }
    }
    if let (Some(old), Some(new)) = (&current.summary, &next.summary) {
        if old != new {
            return Err(StoreError::ImmutableField {
                job_id: current.job_id.to_string(),
                field: "summary",
            });
        }
    }

    for change in &update.attempts {
        match *change {
            AttemptChange::Increment(stage) => *attempts_mut(&mut next, stage) += 1,
            AttemptChange::Reset(stage) => *attempts_mut(&mut next, stage) = 0,
        }
    }

    // Strictly increasing: `updated_at` doubles as the record's version.
    next.updated_at = now_micros().max(current.updated_at + chrono::Duration::microseconds(1));
    Ok(next)
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn get(&self, job_id: &JobId) -> Result<Option<JobRecord>, StoreError> {
        let id = job_id.to_string();
        self.with_conn(move |conn| select_by_id(conn, &id)).await
    }

    async fn create_if_absent(
        &self,
        job_id: &JobId,
        job: &NewJob,
    ) -> Result<(JobRecord, bool), StoreError> {
        let id = job_id.to_string();
        let job = job.clone();
        self.with_conn(move |conn| {
            let now = format_timestamp(now_micros());
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO jobs (job_id, status, source_ref, content_type, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                params![
                    id,
                    JobStatus::Pending.as_str(),
                    job.source_ref.to_string(),
                    job.content_type,
                    now,
                ],
            )?;
            let record = select_by_id(conn, &id)?.ok_or_else(|| StoreError::Corrupt {
                job_id: id.clone(),
                reason: "record missing right after insert".to_string(),
            })?;
            Ok((record, inserted == 1))
        })
        .await
    }

    async fn compare_and_update(
        &self,
        job_id: &JobId,
        expected: JobStatus,
        update: &JobUpdate,
    ) -> Result<Option<JobRecord>, StoreError> {
        let id = job_id.to_string();
        let update = update.clone();
        self.with_conn(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let Some(current) = select_by_id(&tx, &id)? else {
                return Ok(None);
            };
            if current.status != expected {
                return Ok(None);
            }
            if let Some(guard) = update.if_updated_at {
                if current.updated_at != guard {
                    return Ok(None);
                }
            }

            let next = apply_update(&current, &update)?;
            let summary = next.summary.as_ref().map(serde_json::to_string).transpose()?;

            tx.execute(
                "UPDATE jobs SET status = ?2, transcript = ?3, summary = ?4,
                 transcribe_attempts = ?5, summarize_attempts = ?6, failed_stage = ?7,
                 last_error = ?8, updated_at = ?9
                 WHERE job_id = ?1 AND status = ?10",
                params![
                    id,
                    next.status.as_str(),
                    next.transcript,
                    summary,
                    next.transcribe_attempts,
                    next.summarize_attempts,
                    next.failed_stage.map(|s| s.as_str()),
                    next.last_error,
                    format_timestamp(next.updated_at),
                    expected.as_str(),
                ],
            )?;
            tx.commit()?;

            Ok(Some(next))
        })
        .await
    }

    async fn list(&self, filter: &JobFilter) -> Result<Vec<JobRecord>, StoreError> {
        let filter = filter.clone();
        self.with_conn(move |conn| {
            let mut sql = format!("SELECT {COLS} FROM jobs WHERE 1=1");
            let mut values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

            if let Some(status) = filter.status {
                sql.push_str(" AND status = ?");
                values.push(Box::new(status.as_str()));
            }
            if let Some(cutoff) = filter.updated_before {
                sql.push_str(" AND updated_at < ?");
                values.push(Box::new(format_timestamp(cutoff)));
            }

            sql.push_str(" ORDER BY updated_at DESC LIMIT ?");
            values.push(Box::new(filter.limit as i64));

            let param_refs: Vec<&dyn rusqlite::ToSql> = values.iter().map(|p| p.as_ref()).collect();
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(param_refs.as_slice(), JobRow::from_row)?
                .collect::<Result<Vec<_>, _>>()?;

            rows.into_iter().map(JobRow::into_record).collect()
        })
        .await
    }
}
