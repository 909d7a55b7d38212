//! Execution that bundles every staged file into one archive.

use crate::archive::write_flat_archive;
use crate::engine::NotebookEngine;
use crate::error::{Error, Result};
use crate::export::Exporter;
use crate::staging::{ARCHIVE, INPUT};
use crate::types::{Job, SupportedFeatures};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tokio::task::spawn_blocking;
use tracing::{info, warn};

use super::{DefaultExecutionManager, ExecutionContext, ExecutionManager, notebook_features};

/// Subdirectory of the staging directory the kernel runs in
pub const SIDE_EFFECTS_DIR: &str = "files";

/// Executes the notebook and archives all of its outputs and side-effect files
///
/// Differs from [`DefaultExecutionManager`] in that:
/// - the kernel runs in an isolated [`SIDE_EFFECTS_DIR`] subdirectory of the staging directory
/// - a failing cell does not fail the job; whatever ran is still exported and archived
/// - every staged file is flattened into the `"tar.gz"` staging path, after which the
///   side-effect subdirectory is removed
///
/// Staged files are not copied to the output directory; the archive is the output.
pub struct ArchivingExecutionManager {
    inner: DefaultExecutionManager,
}

impl ArchivingExecutionManager {
    /// Create a manager for the job described by `context`
    pub fn new(
        context: ExecutionContext,
        engine: Arc<dyn NotebookEngine>,
        exporter: Arc<dyn Exporter>,
    ) -> Self {
        Self {
            inner: DefaultExecutionManager::new(context, engine, exporter),
        }
    }

    /// Whether executed notebooks keep interactive widget state (default: true)
    pub fn with_widget_state(mut self, store_widget_state: bool) -> Self {
        self.inner = self.inner.with_widget_state(store_widget_state);
        self
    }
}

#[async_trait]
impl ExecutionManager for ArchivingExecutionManager {
    fn context(&self) -> &ExecutionContext {
        &self.inner.context
    }

    async fn execute(&self, job: &mut Job) -> Result<()> {
        let inner = &self.inner;
        let mut notebook = inner.load_notebook(job).await?;
        let staging_dir = inner.context.staging_paths.staging_dir()?.to_path_buf();
        let run_dir = staging_dir.join(SIDE_EFFECTS_DIR);
        let request = inner.request_for(&notebook, run_dir.clone())?;

        tokio::fs::create_dir_all(&run_dir).await?;

        info!(
            job_id = %job.job_id,
            engine = inner.engine.name(),
            kernel = %request.kernel_name,
            ?run_dir,
            "executing notebook for archive"
        );
        let executed = match inner.engine.execute(&mut notebook, &request).await {
            // Partial results still get archived
            Err(Error::CellExecution(e)) => {
                warn!(job_id = %job.job_id, error = %e, "cell failed, archiving partial results");
                Ok(())
            }
            other => other,
        };

        let formats: Vec<&str> = job
            .output_formats
            .iter()
            .map(String::as_str)
            .filter(|format| *format != INPUT && *format != ARCHIVE)
            .collect();
        inner.export_formats(&notebook, formats).await?;

        let archive_path = inner.context.staging_paths.get(ARCHIVE)?.to_path_buf();
        let source_dir = staging_dir.clone();
        let archived = spawn_blocking(move || write_flat_archive(&source_dir, &archive_path))
            .await
            .map_err(|e| Error::Other(format!("archive task panicked: {}", e)))??;
        info!(job_id = %job.job_id, files = archived, "archived staging directory");

        tokio::fs::remove_dir_all(&run_dir).await?;

        executed
    }

    fn supported_features() -> SupportedFeatures {
        notebook_features()
    }

    fn validate(input_path: &Path) -> bool {
        DefaultExecutionManager::validate(input_path)
    }
}
