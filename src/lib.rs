//! # notebook-jobs
//!
//! Lifecycle tracking for long-running notebook jobs and the download
//! requests that move their outputs out of the staging area.
//!
//! ## Design Philosophy
//!
//! - **Persisted state is the truth** - managers hold no state beyond a single run
//! - **Fixed lifecycle** - every job moves `CREATED -> IN_PROGRESS -> COMPLETED | FAILED`
//! - **Pluggable collaborators** - execution engine, exporters and download transfer are traits
//! - **Library-first** - no CLI or UI; the hosting server owns scheduling and the API
//!
//! ## Quick Start
//!
//! ```no_run
//! use notebook_jobs::{Config, JobServices, StagingPaths};
//! use notebook_jobs::execution::ExecutionLifecycle;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let (services, _downloads) = JobServices::new(config).await?;
//!
//!     let staging: StagingPaths = [
//!         ("input", "/srv/staging/j1/report.ipynb"),
//!         ("html", "/srv/staging/j1/report.html"),
//!     ]
//!     .into_iter()
//!     .collect();
//!
//!     let manager = services.execution_manager("j1", staging, "/srv/jobs/j1".into());
//!     let status = manager.process().await?;
//!     println!("j1 finished as {}", status);
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Flattened tar.gz archives
pub mod archive;
/// Configuration types
pub mod config;
/// Database persistence layer
pub mod db;
/// Download requests, queue and worker
pub mod downloads;
/// Notebook execution engines
pub mod engine;
/// Error types
pub mod error;
/// Job execution lifecycle and managers
pub mod execution;
/// Notebook export renderers
pub mod export;
/// Notebook document model
pub mod notebook;
/// Parameter injection
pub mod parameterize;
/// Process-start wiring
pub mod services;
/// Staging paths and file promotion
pub mod staging;
/// Core types
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use db::Database;
pub use downloads::{
    DownloadHandler, DownloadManager, DownloadQueue, DownloadReceiver, DownloadRecordManager,
    DownloadWorker, download_queue,
};
pub use engine::{ExecutionRequest, NbclientEngine, NotebookEngine};
pub use error::{CellExecutionError, DatabaseError, Error, Result};
pub use execution::{
    ArchivingExecutionManager, DefaultExecutionManager, ExecutionContext, ExecutionLifecycle,
    ExecutionManager,
};
pub use export::{Exporter, NbconvertExporter, NotebookExporter};
pub use notebook::Notebook;
pub use services::JobServices;
pub use staging::StagingPaths;
pub use types::{
    DownloadRecord, Job, JobFeature, JobFile, NewJob, Parameters, Status, SupportedFeatures,
};

/// Run the download worker until a termination signal arrives.
///
/// Spawns a [`DownloadWorker`] over `downloads`, waits for a signal, then
/// stops the worker. Requests still queued stay persisted and are replayed on
/// the next start.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use notebook_jobs::{Config, DownloadHandler, DownloadRecord, JobServices, run_with_shutdown};
/// use std::sync::Arc;
///
/// struct CopyOut;
///
/// #[async_trait::async_trait]
/// impl DownloadHandler for CopyOut {
///     async fn download(&self, _record: &DownloadRecord) -> notebook_jobs::Result<()> {
///         Ok(())
///     }
///
///     fn name(&self) -> &'static str {
///         "copy-out"
///     }
/// }
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let (services, downloads) = JobServices::new(Config::default()).await?;
///     run_with_shutdown(&services, downloads, Arc::new(CopyOut)).await;
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(
    services: &JobServices,
    downloads: DownloadReceiver,
    handler: std::sync::Arc<dyn DownloadHandler>,
) {
    let worker = services.spawn_download_worker(downloads, handler);
    wait_for_signal().await;

    worker.abort();
    if let Err(e) = worker.await
        && !e.is_cancelled()
    {
        tracing::error!(error = %e, "download worker ended abnormally");
    }
    tracing::info!("shutdown complete");
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
