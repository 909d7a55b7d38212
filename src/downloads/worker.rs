//! Queue consumer that performs download requests

use super::{DownloadReceiver, DownloadRecordManager};
use crate::error::Result;
use crate::types::DownloadRecord;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Performs the physical transfer of a job's staged artifacts
#[async_trait]
pub trait DownloadHandler: Send + Sync {
    /// Transfer the artifacts named by `record`
    async fn download(&self, record: &DownloadRecord) -> Result<()>;

    /// Name of this handler (for logging)
    fn name(&self) -> &'static str;
}

/// Drains the download queue one record at a time
///
/// Delivery is at-least-once (records are replayed on startup), so a record
/// that is no longer persisted has already been handled or was cancelled and
/// is skipped. A record is deleted only after a successful transfer; a failed
/// one stays persisted and is retried by the next replay.
pub struct DownloadWorker {
    records: DownloadRecordManager,
    handler: Arc<dyn DownloadHandler>,
}

impl DownloadWorker {
    /// Create a worker over `records` that delegates transfers to `handler`
    pub fn new(records: DownloadRecordManager, handler: Arc<dyn DownloadHandler>) -> Self {
        Self { records, handler }
    }

    /// Consume `rx` until every queue producer is dropped
    pub async fn run(self, mut rx: DownloadReceiver) {
        info!(handler = self.handler.name(), "download worker started");

        while let Some(record) = rx.recv().await {
            if let Err(e) = self.process(&record).await {
                error!(
                    download_id = %record.download_id,
                    job_id = %record.job_id,
                    error = %e,
                    "download failed, record kept for retry"
                );
            }
        }

        info!("download queue closed, worker stopping");
    }

    /// Run the worker on the tokio runtime
    pub fn spawn(self, rx: DownloadReceiver) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run(rx))
    }

    /// Handle one dequeued record
    ///
    /// Returns false if the record was skipped because it is no longer stored.
    /// A transfer error is returned as is and leaves the record in place.
    pub async fn process(&self, record: &DownloadRecord) -> Result<bool> {
        if self.records.get(&record.download_id).await?.is_none() {
            debug!(download_id = %record.download_id, "download no longer persisted, skipping");
            return Ok(false);
        }

        self.handler.download(record).await?;

        self.records.delete_download(&record.download_id).await?;
        info!(
            download_id = %record.download_id,
            job_id = %record.job_id,
            redownload = record.redownload,
            "download finished"
        );
        Ok(true)
    }
}
