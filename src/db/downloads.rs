//! Download request CRUD operations.

use crate::error::DatabaseError;
use crate::types::DownloadRecord;
use crate::{Error, Result};

use super::{Database, DownloadRow};

impl Database {
    /// Insert a new download record
    pub async fn insert_download(&self, download: &DownloadRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO downloads (download_id, job_id, download_initiated_time, redownload)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&download.download_id)
        .bind(&download.job_id)
        .bind(download.download_initiated_time.timestamp_millis())
        .bind(download.redownload)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                Error::Database(DatabaseError::ConstraintViolation(format!(
                    "download {} already exists",
                    download.download_id
                )))
            }
            e => Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to insert download: {}",
                e
            ))),
        })?;

        Ok(())
    }

    /// Get a download by ID
    pub async fn get_download(&self, download_id: &str) -> Result<Option<DownloadRecord>> {
        let row = sqlx::query_as::<_, DownloadRow>(
            r#"
            SELECT download_id, job_id, download_initiated_time, redownload
            FROM downloads
            WHERE download_id = ?
            "#,
        )
        .bind(download_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get download: {}",
                e
            )))
        })?;

        Ok(row.map(DownloadRecord::from))
    }

    /// List all downloads, oldest request first
    ///
    /// Requests made within the same millisecond keep their insertion order.
    pub async fn list_downloads(&self) -> Result<Vec<DownloadRecord>> {
        let rows = sqlx::query_as::<_, DownloadRow>(
            r#"
            SELECT download_id, job_id, download_initiated_time, redownload
            FROM downloads
            ORDER BY download_initiated_time ASC, rowid ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list downloads: {}",
                e
            )))
        })?;

        Ok(rows.into_iter().map(DownloadRecord::from).collect())
    }

    /// Delete a download
    ///
    /// Returns true if a record was removed.
    pub async fn delete_download(&self, download_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM downloads WHERE download_id = ?")
            .bind(download_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to delete download: {}",
                    e
                )))
            })?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete every download requested for a job
    ///
    /// Returns the number of records removed.
    pub async fn delete_job_downloads(&self, job_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM downloads WHERE job_id = ?")
            .bind(job_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to delete job downloads: {}",
                    e
                )))
            })?;

        Ok(result.rows_affected())
    }
}
