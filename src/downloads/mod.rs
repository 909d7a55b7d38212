//! Download requests
//!
//! A request is persisted first and only then enqueued, so a crash between
//! the two leaves a record that [`DownloadManager::populate_queue`] replays on
//! the next start. Delivery is therefore at-least-once and consumers must
//! tolerate duplicates; [`DownloadWorker`] does so by skipping records that
//! are no longer stored.

mod queue;
mod records;
mod worker;


pub use queue::{DownloadQueue, DownloadReceiver, download_queue};
pub use records::DownloadRecordManager;
pub use worker::{DownloadHandler, DownloadWorker};

use crate::error::Result;
use crate::types::{DownloadRecord, utc_now};
use tracing::info;
use uuid::Uuid;

/// Creates, deletes and replays download requests
#[derive(Clone)]
pub struct DownloadManager {
    records: DownloadRecordManager,
    queue: DownloadQueue,
}

impl DownloadManager {
    /// Create a manager that persists through `records` and feeds `queue`
    pub fn new(records: DownloadRecordManager, queue: DownloadQueue) -> Self {
        Self { records, queue }
    }

    /// The underlying record store
    pub fn records(&self) -> &DownloadRecordManager {
        &self.records
    }

    /// Request a transfer of `job_id`'s staged artifacts
    ///
    /// The record is persisted before it is enqueued. If enqueueing fails the
    /// record stays persisted and is picked up by the next replay.
    pub async fn download_from_staging(
        &self,
        job_id: &str,
        redownload: bool,
    ) -> Result<DownloadRecord> {
        let record = DownloadRecord {
            download_id: Uuid::new_v4().to_string(),
            job_id: job_id.to_string(),
            download_initiated_time: utc_now(),
            redownload,
        };

        self.records.put(&record).await?;
        self.queue.enqueue(record.clone())?;

        info!(
            download_id = %record.download_id,
            job_id = %record.job_id,
            redownload,
            "download requested"
        );
        Ok(record)
    }

    /// Delete one request
    ///
    /// An already-enqueued copy is left in the queue; the worker skips it.
    pub async fn delete_download(&self, download_id: &str) -> Result<bool> {
        self.records.delete_download(download_id).await
    }

    /// Delete every request for `job_id`
    pub async fn delete_job_downloads(&self, job_id: &str) -> Result<u64> {
        self.records.delete_job_downloads(job_id).await
    }

    /// Re-enqueue every persisted request, oldest first
    ///
    /// Called once at startup. Returns the number of records enqueued.
    pub async fn populate_queue(&self) -> Result<usize> {
        let records = self.records.get_downloads().await?;
        let count = records.len();

        for record in records {
            self.queue.enqueue(record)?;
        }

        info!(count, "replayed persisted downloads into queue");
        Ok(count)
    }
}
