//! Process-start wiring: database, download queue replay, and execution managers.

use crate::config::Config;
use crate::db::Database;
use crate::downloads::{
    DownloadHandler, DownloadManager, DownloadReceiver, DownloadRecordManager, DownloadWorker,
    download_queue,
};
use crate::engine::{NbclientEngine, NotebookEngine};
use crate::error::{Error, Result};
use crate::execution::{
    ArchivingExecutionManager, DefaultExecutionManager, ExecutionContext, ExecutionManager,
};
use crate::export::{Exporter, NbconvertExporter};
use crate::staging::StagingPaths;
use crate::types::SupportedFeatures;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Shared services for a running process
///
/// Created once at startup. Construction replays every persisted download
/// request into the queue, so the returned receiver should be handed to a
/// [`DownloadWorker`] (see [`JobServices::spawn_download_worker`]).
#[derive(Clone)]
pub struct JobServices {
    config: Arc<Config>,
    db: Arc<Database>,
    downloads: DownloadManager,
    engine: Arc<dyn NotebookEngine>,
    exporter: Arc<dyn Exporter>,
}

impl JobServices {
    /// Start services using nbclient for execution and `jupyter nbconvert` for export
    ///
    /// Fails with [`Error::Config`] if the jupyter executable or the Python
    /// interpreter cannot be located.
    pub async fn new(config: Config) -> Result<(Self, DownloadReceiver)> {
        let jupyter = config.jupyter_binary().ok_or_else(|| Error::Config {
            message: "jupyter executable not found; set jupyter_path or enable search_path"
                .to_string(),
            key: Some("jupyter_path".to_string()),
        })?;
        let python = config.python_binary().ok_or_else(|| Error::Config {
            message: "python interpreter not found; set python_path or enable search_path"
                .to_string(),
            key: Some("python_path".to_string()),
        })?;

        Self::with_collaborators(
            config,
            Arc::new(NbclientEngine::new(python)),
            Arc::new(NbconvertExporter::new(jupyter)),
        )
        .await
    }

    /// Start services with explicit execution and export backends
    pub async fn with_collaborators(
        config: Config,
        engine: Arc<dyn NotebookEngine>,
        exporter: Arc<dyn Exporter>,
    ) -> Result<(Self, DownloadReceiver)> {
        config.validate()?;

        let db = Arc::new(Database::new(&config.persistence.database_path).await?);
        let (queue, rx) = download_queue();
        let downloads = DownloadManager::new(DownloadRecordManager::new(db.clone()), queue);

        let replayed = downloads.populate_queue().await?;
        tracing::info!(
            database = ?config.persistence.database_path,
            engine = engine.name(),
            exporter = exporter.name(),
            archive_outputs = config.execution.archive_outputs,
            replayed,
            "job services started"
        );

        Ok((
            Self {
                config: Arc::new(config),
                db,
                downloads,
                engine,
                exporter,
            },
            rx,
        ))
    }

    /// Job and download record store
    pub fn db(&self) -> &Arc<Database> {
        &self.db
    }

    /// Download request manager
    pub fn downloads(&self) -> &DownloadManager {
        &self.downloads
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Build the configured execution manager for one job
    ///
    /// `archive_outputs` selects [`ArchivingExecutionManager`]; otherwise
    /// [`DefaultExecutionManager`].
    pub fn execution_manager(
        &self,
        job_id: &str,
        staging_paths: StagingPaths,
        output_dir: PathBuf,
    ) -> Box<dyn ExecutionManager> {
        let context = ExecutionContext {
            job_id: job_id.to_string(),
            root_dir: self.config.execution.root_dir.clone(),
            output_dir,
            staging_paths,
            db: self.db.clone(),
        };
        let store_widget_state = self.config.execution.store_widget_state;

        if self.config.execution.archive_outputs {
            Box::new(
                ArchivingExecutionManager::new(context, self.engine.clone(), self.exporter.clone())
                    .with_widget_state(store_widget_state),
            )
        } else {
            Box::new(
                DefaultExecutionManager::new(context, self.engine.clone(), self.exporter.clone())
                    .with_widget_state(store_widget_state),
            )
        }
    }

    /// Pre-flight check of an input notebook with the configured manager
    pub fn validate_input(&self, input_path: &Path) -> bool {
        if self.config.execution.archive_outputs {
            ArchivingExecutionManager::validate(input_path)
        } else {
            DefaultExecutionManager::validate(input_path)
        }
    }

    /// Features of the configured manager
    pub fn supported_features(&self) -> SupportedFeatures {
        if self.config.execution.archive_outputs {
            ArchivingExecutionManager::supported_features()
        } else {
            DefaultExecutionManager::supported_features()
        }
    }

    /// Start consuming the download queue
    pub fn spawn_download_worker(
        &self,
        rx: DownloadReceiver,
        handler: Arc<dyn DownloadHandler>,
    ) -> tokio::task::JoinHandle<()> {
        DownloadWorker::new(self.downloads.records().clone(), handler).spawn(rx)
    }
}
