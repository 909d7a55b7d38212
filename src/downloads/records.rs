//! Download record store

use crate::db::Database;
use crate::error::Result;
use crate::types::DownloadRecord;
use std::sync::Arc;

/// CRUD over persisted download requests
///
/// Every call is its own short-lived statement; nothing is held between calls.
#[derive(Clone)]
pub struct DownloadRecordManager {
    db: Arc<Database>,
}

impl DownloadRecordManager {
    /// Wrap a database handle
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Persist a new record
    pub async fn put(&self, record: &DownloadRecord) -> Result<()> {
        self.db.insert_download(record).await
    }

    /// Look up a record by id
    pub async fn get(&self, download_id: &str) -> Result<Option<DownloadRecord>> {
        self.db.get_download(download_id).await
    }

    /// All records, oldest request first
    pub async fn get_downloads(&self) -> Result<Vec<DownloadRecord>> {
        self.db.list_downloads().await
    }

    /// Remove one record; returns whether it existed
    pub async fn delete_download(&self, download_id: &str) -> Result<bool> {
        self.db.delete_download(download_id).await
    }

    /// Remove every record for `job_id`; returns how many were removed
    pub async fn delete_job_downloads(&self, job_id: &str) -> Result<u64> {
        self.db.delete_job_downloads(job_id).await
    }
}
