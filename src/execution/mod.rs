//! Job execution lifecycle
//!
//! An [`ExecutionManager`] decides *what* runs for a job; the lifecycle in
//! [`ExecutionLifecycle`] decides *how its state is tracked*:
//!
//! ```text
//! CREATED --before_start--> IN_PROGRESS --execute ok--> on_complete --> COMPLETED
//!                                       \--execute err--> on_failure --> FAILED
//! ```
//!
//! The lifecycle is blanket-implemented for every manager and cannot be
//! overridden, so a job driven through [`ExecutionLifecycle::process`] always
//! reaches exactly one terminal status, whatever `execute` does (including
//! panicking).
//!
//! Variants:
//! - [`DefaultExecutionManager`] - executes one notebook and exports the requested formats
//! - [`ArchivingExecutionManager`] - additionally bundles every staged file into a tar.gz

mod archiving;
mod default;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use archiving::{ArchivingExecutionManager, SIDE_EFFECTS_DIR};
pub use default::DefaultExecutionManager;

use crate::db::Database;
use crate::error::{Error, Result};
use crate::staging::StagingPaths;
use crate::types::{Job, Status, SupportedFeatures};
use async_trait::async_trait;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Everything a manager needs to know about the one job it drives
#[derive(Clone)]
pub struct ExecutionContext {
    /// Job to execute
    pub job_id: String,
    /// Server root; registered file paths are relative to it
    pub root_dir: PathBuf,
    /// Where staged files are promoted to
    pub output_dir: PathBuf,
    /// Logical name -> staging location
    pub staging_paths: StagingPaths,
    /// Job record store
    pub db: Arc<Database>,
}

/// Trait for execution backends
///
/// Implementors provide `execute`; the lifecycle around it comes from
/// [`ExecutionLifecycle`].
///
/// # Examples
///
/// ```no_run
/// use notebook_jobs::execution::{
///     DefaultExecutionManager, ExecutionContext, ExecutionLifecycle, ExecutionManager,
/// };
/// use notebook_jobs::{NbclientEngine, NbconvertExporter};
/// use std::sync::Arc;
///
/// # async fn run(context: ExecutionContext) -> notebook_jobs::Result<()> {
/// if !DefaultExecutionManager::validate(context.staging_paths.input()?) {
///     return Ok(());
/// }
/// let engine = Arc::new(NbclientEngine::from_path().expect("python not found"));
/// let exporter = Arc::new(NbconvertExporter::from_path().expect("jupyter not found"));
/// let manager = DefaultExecutionManager::new(context, engine, exporter);
///
/// let status = manager.process().await?;
/// println!("job finished as {}", status);
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait ExecutionManager: Send + Sync {
    /// The job this manager drives
    fn context(&self) -> &ExecutionContext;

    /// Perform the unit of work
    ///
    /// `job` is the snapshot loaded by `before_start`; implementations may
    /// update it (e.g. registered files) as they go. Any error is recorded as
    /// the job's failure.
    async fn execute(&self, job: &mut Job) -> Result<()>;

    /// Job creation features this backend honors
    fn supported_features() -> SupportedFeatures
    where
        Self: Sized;

    /// Pre-flight check of an input artifact
    ///
    /// Rejection is reported as `false`, never as an error, and mutates nothing.
    fn validate(_input_path: &Path) -> bool
    where
        Self: Sized,
    {
        true
    }
}

/// The fixed state machine driving an [`ExecutionManager`]
#[async_trait]
pub trait ExecutionLifecycle {
    /// Run the job to a terminal status
    ///
    /// Calls `before_start`, then `execute`, then exactly one of `on_complete`
    /// or `on_failure`. Failures of `execute` never escape: they become the
    /// returned `Status::Failed`. Only persistence failures are returned as
    /// errors.
    async fn process(&self) -> Result<Status>;

    /// Load the job snapshot and move it to `IN_PROGRESS`
    async fn before_start(&self) -> Result<Job>;

    /// Record the failure on the job and log its full detail
    async fn on_failure(&self, job: &mut Job, error: &Error) -> Result<()>;

    /// Mark the job `COMPLETED`
    async fn on_complete(&self, job: &mut Job) -> Result<()>;
}

#[async_trait]
impl<M> ExecutionLifecycle for M
where
    M: ExecutionManager + ?Sized,
{
    async fn process(&self) -> Result<Status> {
        let mut job = self.before_start().await?;

        let outcome = match AssertUnwindSafe(self.execute(&mut job))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => Err(Error::Other(format!(
                "execution panicked: {}",
                panic_message(panic.as_ref())
            ))),
        };

        match outcome {
            Ok(()) => {
                self.on_complete(&mut job).await?;
                Ok(Status::Completed)
            }
            Err(e) => {
                self.on_failure(&mut job, &e).await?;
                Ok(Status::Failed)
            }
        }
    }

    async fn before_start(&self) -> Result<Job> {
        let context = self.context();
        let mut job = context
            .db
            .get_job(&context.job_id)
            .await?
            .ok_or_else(|| Error::JobNotFound(context.job_id.clone()))?;

        let started = context.db.mark_job_started(&job.job_id).await?;
        job.status = Status::InProgress;
        job.start_time = Some(started);

        tracing::info!(job_id = %job.job_id, "job started");
        Ok(job)
    }

    async fn on_failure(&self, job: &mut Job, error: &Error) -> Result<()> {
        // Full detail goes to the operator log only; the record gets the message
        tracing::error!(
            job_id = %job.job_id,
            error = ?error,
            "job execution failed"
        );

        let message = error.to_string();
        self.context()
            .db
            .mark_job_failed(&job.job_id, &message)
            .await?;
        job.status = Status::Failed;
        job.status_message = Some(message);
        Ok(())
    }

    async fn on_complete(&self, job: &mut Job) -> Result<()> {
        let ended = self.context().db.mark_job_completed(&job.job_id).await?;
        job.status = Status::Completed;
        job.end_time = Some(ended);

        tracing::info!(job_id = %job.job_id, "job completed");
        Ok(())
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic payload"
    }
}

/// Capabilities shared by the notebook managers in this crate
pub(crate) fn notebook_features() -> SupportedFeatures {
    SupportedFeatures {
        job_name: true,
        output_formats: true,
        job_definition: false,
        idempotency_token: false,
        tags: false,
        email_notifications: false,
        timeout_seconds: false,
        retry_on_timeout: false,
        max_retries: false,
        min_retry_interval_millis: false,
        output_filename_template: false,
        stop_job: true,
        delete_job: true,
    }
}
