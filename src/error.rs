//! Error types for notebook-jobs
//!
//! This module provides the error handling for the library:
//! - A crate-wide [`Error`] with contextual variants (database, engine, export, staging)
//! - [`DatabaseError`] for persistence failures, tagged by the failing operation
//! - [`CellExecutionError`], the distinguishable error raised when a notebook cell fails

use std::path::PathBuf;
use thiserror::Error;

use crate::types::Status;

/// Result type alias for notebook-jobs operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for notebook-jobs
///
/// `Display` output of this type is what lands in a job's `status_message`
/// when execution fails, so variants keep their messages short and readable.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "database_path")
        key: Option<String>,
    },

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// A notebook cell raised an error while executing
    #[error(transparent)]
    CellExecution(#[from] CellExecutionError),

    /// The execution engine could not run the notebook at all
    #[error("execution engine error: {0}")]
    Engine(String),

    /// Rendering a notebook to an output format failed
    #[error("failed to export notebook to {format}: {reason}")]
    Export {
        /// Requested output format
        format: String,
        /// Why the export failed
        reason: String,
    },

    /// The notebook document is malformed or lacks required metadata
    #[error("invalid notebook: {0}")]
    InvalidNotebook(String),

    /// No staging path was supplied for a logical name
    #[error("no staging path for '{0}'")]
    MissingStagingPath(String),

    /// A path could not be used as requested
    #[error("invalid path {path}: {reason}")]
    InvalidPath {
        /// The offending path
        path: PathBuf,
        /// Why the path was rejected
        reason: String,
    },

    /// Job record not found
    #[error("job not found: {0}")]
    JobNotFound(String),

    /// A status update would move a job backwards or out of a terminal state
    #[error("job {job_id} cannot move from {from} to {to}")]
    InvalidTransition {
        /// The job whose update was rejected
        job_id: String,
        /// Status currently persisted
        from: Status,
        /// Status the update attempted to set
        to: Status,
    },

    /// The download queue has no consumer left
    #[error("download queue is closed")]
    QueueClosed,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Operation not supported (missing binary, unknown format, etc.)
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Record not found
    #[error("record not found: {0}")]
    NotFound(String),

    /// Constraint violation (e.g., duplicate key)
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),
}

/// A cell raised an error during notebook execution
///
/// Carries the exception name and value reported by the kernel, mirroring the
/// `error` output the cell recorded in the executed notebook.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("An error occurred while executing cell {cell_index}: {ename}: {evalue}")]
pub struct CellExecutionError {
    /// Zero-based index of the failing cell
    pub cell_index: usize,
    /// Exception class name (e.g. "ZeroDivisionError")
    pub ename: String,
    /// Exception message
    pub evalue: String,
}

impl Error {
    /// Whether this error came from a failing notebook cell rather than from
    /// the surrounding machinery
    pub fn is_cell_execution(&self) -> bool {
        matches!(self, Error::CellExecution(_))
    }
}
