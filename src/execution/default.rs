//! Single-notebook execution with per-format export.

use crate::engine::{ExecutionRequest, NotebookEngine};
use crate::error::{Error, Result};
use crate::export::Exporter;
use crate::notebook::Notebook;
use crate::parameterize::add_parameters;
use crate::staging::copy_directory;
use crate::types::{Job, JobFile, SupportedFeatures};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::spawn_blocking;
use tracing::{debug, info, warn};

use super::{ExecutionContext, ExecutionManager, notebook_features};

/// Executes the staged input notebook and exports every requested format
///
/// Export happens whether or not execution succeeded; a cell failure is
/// re-raised afterwards so the job is recorded as failed, with its partial
/// outputs already written.
pub struct DefaultExecutionManager {
    pub(super) context: ExecutionContext,
    pub(super) engine: Arc<dyn NotebookEngine>,
    pub(super) exporter: Arc<dyn Exporter>,
    pub(super) store_widget_state: bool,
}

impl DefaultExecutionManager {
    /// Create a manager for the job described by `context`
    pub fn new(
        context: ExecutionContext,
        engine: Arc<dyn NotebookEngine>,
        exporter: Arc<dyn Exporter>,
    ) -> Self {
        Self {
            context,
            engine,
            exporter,
            store_widget_state: true,
        }
    }

    /// Whether executed notebooks keep interactive widget state (default: true)
    pub fn with_widget_state(mut self, store_widget_state: bool) -> Self {
        self.store_widget_state = store_widget_state;
        self
    }

    /// Read the staged input and inject the job's parameters, if any
    pub(super) async fn load_notebook(&self, job: &Job) -> Result<Notebook> {
        let notebook = Notebook::read(self.context.staging_paths.input()?).await?;

        match &job.parameters {
            Some(parameters) if !parameters.is_empty() => {
                debug!(job_id = %job.job_id, count = parameters.len(), "injecting parameters");
                Ok(add_parameters(&notebook, parameters))
            }
            _ => Ok(notebook),
        }
    }

    /// Build the engine request for `notebook`, running in `working_dir`
    pub(super) fn request_for(
        &self,
        notebook: &Notebook,
        working_dir: PathBuf,
    ) -> Result<ExecutionRequest> {
        let kernel_name = notebook.kernel_name().ok_or_else(|| {
            Error::InvalidNotebook("notebook metadata has no kernelspec name".to_string())
        })?;

        Ok(ExecutionRequest {
            kernel_name: kernel_name.to_string(),
            working_dir,
            store_widget_state: self.store_widget_state,
        })
    }

    /// Render `notebook` to each format and write it to that format's staging path
    pub(super) async fn export_formats<'a>(
        &self,
        notebook: &Notebook,
        formats: impl IntoIterator<Item = &'a str>,
    ) -> Result<()> {
        for format in formats {
            let path = self.context.staging_paths.get(format)?;
            let rendered = self.exporter.export(notebook, format).await?;
            tokio::fs::write(path, rendered).await?;
            debug!(job_id = %self.context.job_id, format, ?path, "exported notebook");
        }
        Ok(())
    }

    /// Copy the staging tree into the output directory and register the copies
    ///
    /// A copy of a requested format's staging file is registered under that
    /// format; anything else is registered as a plain file. Registration is
    /// idempotent by path, so calling this again adds nothing new.
    ///
    /// Returns the number of newly registered files.
    pub async fn copy_staged_files_to_output(&self, job: &mut Job) -> Result<usize> {
        let staging_dir = self.context.staging_paths.staging_dir()?.to_path_buf();
        let output_dir = self.context.output_dir.clone();
        let root_dir = self.context.root_dir.clone();

        let copied = spawn_blocking(move || copy_directory(&staging_dir, &output_dir, &root_dir))
            .await
            .map_err(|e| Error::Other(format!("staging copy task panicked: {}", e)))??;

        let mut added = 0;
        for file in copied {
            let format = self
                .context
                .staging_paths
                .format_for(&file.source, &job.output_formats);
            let job_file = match format {
                Some(format) => JobFile::for_format(format, file.relative_path),
                None => JobFile::plain(file.relative_path),
            };

            self.context.db.add_job_file(&job.job_id, &job_file).await?;
            if job.add_job_file(job_file) {
                added += 1;
            }
        }

        info!(job_id = %job.job_id, added, "registered staged files");
        Ok(added)
    }
}

#[async_trait]
impl ExecutionManager for DefaultExecutionManager {
    fn context(&self) -> &ExecutionContext {
        &self.context
    }

    async fn execute(&self, job: &mut Job) -> Result<()> {
        let mut notebook = self.load_notebook(job).await?;
        let staging_dir = self.context.staging_paths.staging_dir()?.to_path_buf();
        let request = self.request_for(&notebook, staging_dir)?;

        info!(
            job_id = %job.job_id,
            engine = self.engine.name(),
            kernel = %request.kernel_name,
            "executing notebook"
        );
        let executed = self.engine.execute(&mut notebook, &request).await;
        if let Err(e) = &executed {
            warn!(job_id = %job.job_id, error = %e, "notebook execution failed, exporting partial results");
        }

        // Outputs are written whether or not execution succeeded
        self.export_formats(&notebook, job.output_formats.iter().map(String::as_str))
            .await?;
        executed?;

        self.copy_staged_files_to_output(job).await?;
        Ok(())
    }

    fn supported_features() -> SupportedFeatures {
        notebook_features()
    }

    fn validate(input_path: &Path) -> bool {
        let bytes = match std::fs::read(input_path) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(?input_path, error = %e, "cannot read notebook for validation");
                return false;
            }
        };

        match Notebook::from_slice(&bytes) {
            Ok(notebook) => notebook.kernel_name().is_some(),
            Err(e) => {
                warn!(?input_path, error = %e, "cannot parse notebook for validation");
                false
            }
        }
    }
}
