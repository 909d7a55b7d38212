//! Database layer for notebook-jobs
//!
//! Handles SQLite persistence for job records and download requests.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`] — Database lifecycle, schema migrations
//! - [`jobs`] — Job records, guarded status transitions, job files
//! - [`downloads`] — Download request CRUD
//!
//! Every method runs as its own short-lived statement (or transaction) on the
//! pool; nothing holds a connection across calls.

use crate::types::{DownloadRecord, Job, JobFile, Status, from_millis};
use crate::{Error, Result};
use sqlx::{FromRow, sqlite::SqlitePool};

mod downloads;
mod jobs;
mod migrations;

/// Job record from database
#[derive(Debug, Clone, FromRow)]
pub struct JobRow {
    /// Opaque unique identifier
    pub job_id: String,
    /// Display name
    pub name: String,
    /// Status code (see [`Status::from_i32`])
    pub status: i32,
    /// Parameters as a JSON object
    pub parameters: Option<String>,
    /// Output formats as a JSON array
    pub output_formats: String,
    /// Failure message
    pub status_message: Option<String>,
    /// Creation time, UTC milliseconds
    pub create_time: i64,
    /// Start time, UTC milliseconds
    pub start_time: Option<i64>,
    /// End time, UTC milliseconds
    pub end_time: Option<i64>,
}

impl JobRow {
    /// Combine the row with its files into a [`Job`] snapshot
    pub fn into_job(self, job_files: Vec<JobFile>) -> Result<Job> {
        let parameters = self
            .parameters
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(Error::Serialization)?;
        let output_formats = serde_json::from_str(&self.output_formats)?;

        Ok(Job {
            job_id: self.job_id,
            name: self.name,
            status: Status::from_i32(self.status),
            status_message: self.status_message,
            parameters,
            output_formats,
            job_files,
            create_time: from_millis(self.create_time),
            start_time: self.start_time.map(from_millis),
            end_time: self.end_time.map(from_millis),
        })
    }
}

/// Job file record from database
#[derive(Debug, Clone, FromRow)]
pub struct JobFileRow {
    /// Label shown to users
    pub display_name: String,
    /// Format identifier
    pub file_format: String,
    /// Path relative to the root directory
    pub file_path: String,
}

impl From<JobFileRow> for JobFile {
    fn from(row: JobFileRow) -> Self {
        JobFile {
            display_name: row.display_name,
            file_format: row.file_format,
            file_path: row.file_path,
        }
    }
}

/// Download record from database
#[derive(Debug, Clone, FromRow)]
pub struct DownloadRow {
    /// Generated UUID
    pub download_id: String,
    /// Job whose artifacts are requested
    pub job_id: String,
    /// Request time, UTC milliseconds
    pub download_initiated_time: i64,
    /// Re-fetch already downloaded artifacts
    pub redownload: bool,
}

impl From<DownloadRow> for DownloadRecord {
    fn from(row: DownloadRow) -> Self {
        DownloadRecord {
            download_id: row.download_id,
            job_id: row.job_id,
            download_initiated_time: from_millis(row.download_initiated_time),
            redownload: row.redownload,
        }
    }
}

/// Database handle for notebook-jobs
pub struct Database {
    pool: SqlitePool,
}
