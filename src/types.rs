//! Core types for notebook-jobs

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Job parameters: name to value, injected into the notebook before execution
pub type Parameters = Map<String, Value>;

/// Job lifecycle status
///
/// Status only moves forward: `Created -> InProgress -> (Completed | Failed)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    /// Record exists, execution not started
    Created,
    /// Execution is running
    InProgress,
    /// Execution finished (terminal)
    Completed,
    /// Execution failed (terminal)
    Failed,
}

impl Status {
    /// Convert integer status code to Status enum
    ///
    /// Unknown codes map to `Failed` so a corrupt row is never picked up again.
    pub fn from_i32(status: i32) -> Self {
        match status {
            0 => Status::Created,
            1 => Status::InProgress,
            2 => Status::Completed,
            _ => Status::Failed,
        }
    }

    /// Convert Status enum to integer code for database storage
    pub fn to_i32(&self) -> i32 {
        match self {
            Status::Created => 0,
            Status::InProgress => 1,
            Status::Completed => 2,
            Status::Failed => 3,
        }
    }

    /// Whether no further transition can occur
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Completed | Status::Failed)
    }

    /// Canonical upper-case name
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Created => "CREATED",
            Status::InProgress => "IN_PROGRESS",
            Status::Completed => "COMPLETED",
            Status::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A file produced by a job, relative to the server root
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFile {
    /// Label shown to users (e.g. "HTML", "File")
    pub display_name: String,
    /// Format identifier (e.g. "html", "File")
    pub file_format: String,
    /// Path relative to the root directory; unique within a job
    pub file_path: String,
}

impl JobFile {
    /// A plain side-effect or staged file with no output format of its own
    pub fn plain(file_path: impl Into<String>) -> Self {
        Self {
            display_name: "File".to_string(),
            file_format: "File".to_string(),
            file_path: file_path.into(),
        }
    }

    /// A rendered output for `format`
    pub fn for_format(format: &str, file_path: impl Into<String>) -> Self {
        Self {
            display_name: format.to_uppercase(),
            file_format: format.to_string(),
            file_path: file_path.into(),
        }
    }
}

/// Job to be inserted into the database by the scheduler
#[derive(Clone, Debug, Default)]
pub struct NewJob {
    /// Opaque unique identifier chosen by the caller
    pub job_id: String,
    /// Display name
    pub name: String,
    /// Parameters to inject before execution
    pub parameters: Option<Parameters>,
    /// Requested output formats, in order
    pub output_formats: Vec<String>,
    /// Files known at creation time
    pub job_files: Vec<JobFile>,
}

/// Snapshot of a persisted job record
///
/// An execution manager loads one of these at the start of `process()` and
/// passes it through the phases; it is never cached beyond that call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Opaque unique identifier
    pub job_id: String,
    /// Display name
    pub name: String,
    /// Lifecycle status
    pub status: Status,
    /// Failure message, set when the job fails
    pub status_message: Option<String>,
    /// Parameters to inject before execution
    pub parameters: Option<Parameters>,
    /// Requested output formats, in order
    pub output_formats: Vec<String>,
    /// Registered output files, unique by `file_path`
    pub job_files: Vec<JobFile>,
    /// When the record was created
    pub create_time: DateTime<Utc>,
    /// When execution started
    pub start_time: Option<DateTime<Utc>>,
    /// When execution completed
    pub end_time: Option<DateTime<Utc>>,
}

impl Job {
    /// Append `file` unless a file with the same path is already registered
    ///
    /// Returns true if the file was added.
    pub fn add_job_file(&mut self, file: JobFile) -> bool {
        if self.job_files.iter().any(|f| f.file_path == file.file_path) {
            return false;
        }
        self.job_files.push(file);
        true
    }
}

/// A persisted request to transfer a job's staged artifacts
///
/// Immutable once created; only ever deleted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRecord {
    /// Generated UUID
    pub download_id: String,
    /// Job whose artifacts are requested
    pub job_id: String,
    /// When the request was made
    pub download_initiated_time: DateTime<Utc>,
    /// Whether already-downloaded artifacts should be fetched again
    pub redownload: bool,
}

/// Job creation features a backend may or may not honor
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobFeature {
    /// Custom job names
    JobName,
    /// Selectable output formats
    OutputFormats,
    /// Recurring job definitions
    JobDefinition,
    /// Idempotency tokens on creation
    IdempotencyToken,
    /// Tags
    Tags,
    /// Email notifications
    EmailNotifications,
    /// Execution timeouts
    TimeoutSeconds,
    /// Retry after a timeout
    RetryOnTimeout,
    /// Retry limit
    MaxRetries,
    /// Minimum interval between retries
    MinRetryIntervalMillis,
    /// Templated output filenames
    OutputFilenameTemplate,
    /// Stopping a running job
    StopJob,
    /// Deleting a job
    DeleteJob,
}

impl JobFeature {
    /// Every feature, in declaration order
    pub const ALL: [JobFeature; 13] = [
        JobFeature::JobName,
        JobFeature::OutputFormats,
        JobFeature::JobDefinition,
        JobFeature::IdempotencyToken,
        JobFeature::Tags,
        JobFeature::EmailNotifications,
        JobFeature::TimeoutSeconds,
        JobFeature::RetryOnTimeout,
        JobFeature::MaxRetries,
        JobFeature::MinRetryIntervalMillis,
        JobFeature::OutputFilenameTemplate,
        JobFeature::StopJob,
        JobFeature::DeleteJob,
    ];
}

/// Capability map of an execution backend
///
/// Declarative only: nothing in the lifecycle enforces these flags.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportedFeatures {
    /// Custom job names
    pub job_name: bool,
    /// Selectable output formats
    pub output_formats: bool,
    /// Recurring job definitions
    pub job_definition: bool,
    /// Idempotency tokens on creation
    pub idempotency_token: bool,
    /// Tags
    pub tags: bool,
    /// Email notifications
    pub email_notifications: bool,
    /// Execution timeouts
    pub timeout_seconds: bool,
    /// Retry after a timeout
    pub retry_on_timeout: bool,
    /// Retry limit
    pub max_retries: bool,
    /// Minimum interval between retries
    pub min_retry_interval_millis: bool,
    /// Templated output filenames
    pub output_filename_template: bool,
    /// Stopping a running job
    pub stop_job: bool,
    /// Deleting a job
    pub delete_job: bool,
}

impl SupportedFeatures {
    /// Whether `feature` is honored
    pub fn supports(&self, feature: JobFeature) -> bool {
        match feature {
            JobFeature::JobName => self.job_name,
            JobFeature::OutputFormats => self.output_formats,
            JobFeature::JobDefinition => self.job_definition,
            JobFeature::IdempotencyToken => self.idempotency_token,
            JobFeature::Tags => self.tags,
            JobFeature::EmailNotifications => self.email_notifications,
            JobFeature::TimeoutSeconds => self.timeout_seconds,
            JobFeature::RetryOnTimeout => self.retry_on_timeout,
            JobFeature::MaxRetries => self.max_retries,
            JobFeature::MinRetryIntervalMillis => self.min_retry_interval_millis,
            JobFeature::OutputFilenameTemplate => self.output_filename_template,
            JobFeature::StopJob => self.stop_job,
            JobFeature::DeleteJob => self.delete_job,
        }
    }

    /// Every feature paired with its flag
    pub fn iter(&self) -> impl Iterator<Item = (JobFeature, bool)> + '_ {
        JobFeature::ALL.into_iter().map(|f| (f, self.supports(f)))
    }
}

/// Current time in UTC, truncated to the millisecond precision the store keeps
pub fn utc_now() -> DateTime<Utc> {
    from_millis(Utc::now().timestamp_millis())
}

/// Convert stored UTC milliseconds back into a timestamp
pub(crate) fn from_millis(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or_else(Utc::now)
}
