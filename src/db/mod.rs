//! SQLite persistence for job records.
//!
//! Raw SQL with rusqlite, no ORM. Each process opens its own connection;
//! WAL mode plus a busy timeout lets independent invocations share the file
//! while `BEGIN IMMEDIATE` transactions serialize the compare-and-swap.

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;

pub mod jobs;

pub use jobs::SqliteJobStore;

const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

pub fn open(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }

    let conn = Connection::open(path).context("Failed to open database connection")?;
    conn.busy_timeout(BUSY_TIMEOUT)
        .context("Failed to set busy timeout")?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")
        .context("Failed to enable WAL journal")?;

    migrate(&conn)?;

    Ok(conn)
}

pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
    migrate(&conn)?;
    Ok(conn)
}

pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS jobs (
            job_id TEXT PRIMARY KEY,
            status TEXT NOT NULL DEFAULT 'PENDING',
            source_ref TEXT NOT NULL,
            content_type TEXT,
            transcript TEXT,
            summary TEXT,
            transcribe_attempts INTEGER NOT NULL DEFAULT 0,
            summarize_attempts INTEGER NOT NULL DEFAULT 0,
            failed_stage TEXT,
            last_error TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )
    .context("Failed to create jobs table")?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_jobs_status_updated_at ON jobs(status, updated_at)",
        [],
    )
    .context("Failed to create jobs status index")?;

    Ok(())
}
