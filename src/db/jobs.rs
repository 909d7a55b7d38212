//! Job record persistence and guarded status transitions.

use crate::error::DatabaseError;
use crate::types::{Job, JobFile, NewJob, Status, utc_now};
use crate::{Error, Result};
use chrono::{DateTime, Utc};

use super::{Database, JobFileRow, JobRow};

impl Database {
    /// Insert a new job record in `CREATED` state together with its initial files
    pub async fn insert_job(&self, job: &NewJob) -> Result<()> {
        let parameters = job
            .parameters
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let output_formats = serde_json::to_string(&job.output_formats)?;
        let now = utc_now().timestamp_millis();

        let mut tx = self.pool.begin().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to begin job insert transaction: {}",
                e
            )))
        })?;

        sqlx::query(
            r#"
            INSERT INTO jobs (job_id, name, status, parameters, output_formats, create_time)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&job.job_id)
        .bind(&job.name)
        .bind(Status::Created.to_i32())
        .bind(parameters)
        .bind(output_formats)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                Error::Database(DatabaseError::ConstraintViolation(format!(
                    "job {} already exists",
                    job.job_id
                )))
            }
            e => Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to insert job: {}",
                e
            ))),
        })?;

        for file in &job.job_files {
            sqlx::query(
                r#"
                INSERT OR IGNORE INTO job_files (job_id, display_name, file_format, file_path)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(&job.job_id)
            .bind(&file.display_name)
            .bind(&file.file_format)
            .bind(&file.file_path)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to insert job file: {}",
                    e
                )))
            })?;
        }

        tx.commit().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to commit job insert: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Get a job snapshot, including its registered files
    pub async fn get_job(&self, job_id: &str) -> Result<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT
                job_id, name, status, parameters, output_formats,
                status_message, create_time, start_time, end_time
            FROM jobs
            WHERE job_id = ?
            "#,
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get job: {}",
                e
            )))
        })?;

        let Some(row) = row else {
            return Ok(None);
        };

        let files = self.list_job_files(job_id).await?;
        row.into_job(files).map(Some)
    }

    /// List a job's files in registration order
    pub async fn list_job_files(&self, job_id: &str) -> Result<Vec<JobFile>> {
        let rows = sqlx::query_as::<_, JobFileRow>(
            r#"
            SELECT display_name, file_format, file_path
            FROM job_files
            WHERE job_id = ?
            ORDER BY id ASC
            "#,
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list job files: {}",
                e
            )))
        })?;

        Ok(rows.into_iter().map(JobFile::from).collect())
    }

    /// Register a file on a job unless one with the same path exists
    ///
    /// Returns true if a row was inserted.
    pub async fn add_job_file(&self, job_id: &str, file: &JobFile) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO job_files (job_id, display_name, file_format, file_path)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(job_id)
        .bind(&file.display_name)
        .bind(&file.file_format)
        .bind(&file.file_path)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to add job file: {}",
                e
            )))
        })?;

        Ok(result.rows_affected() > 0)
    }

    /// Move a job from `CREATED` to `IN_PROGRESS`, stamping its start time
    ///
    /// Returns the stored start time.
    pub async fn mark_job_started(&self, job_id: &str) -> Result<DateTime<Utc>> {
        let started = utc_now();
        let now = started.timestamp_millis();
        let result = sqlx::query(
            "UPDATE jobs SET status = ?, start_time = ? WHERE job_id = ? AND status = ?",
        )
        .bind(Status::InProgress.to_i32())
        .bind(now)
        .bind(job_id)
        .bind(Status::Created.to_i32())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to mark job started: {}",
                e
            )))
        })?;

        self.check_transition(job_id, result.rows_affected(), Status::InProgress)
            .await?;
        Ok(started)
    }

    /// Move a job from `IN_PROGRESS` to `COMPLETED`, stamping its end time
    ///
    /// Returns the stored end time.
    pub async fn mark_job_completed(&self, job_id: &str) -> Result<DateTime<Utc>> {
        let ended = utc_now();
        let now = ended.timestamp_millis();
        let result = sqlx::query(
            "UPDATE jobs SET status = ?, end_time = ? WHERE job_id = ? AND status = ?",
        )
        .bind(Status::Completed.to_i32())
        .bind(now)
        .bind(job_id)
        .bind(Status::InProgress.to_i32())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to mark job completed: {}",
                e
            )))
        })?;

        self.check_transition(job_id, result.rows_affected(), Status::Completed)
            .await?;
        Ok(ended)
    }

    /// Move a job from `IN_PROGRESS` to `FAILED` with a message
    pub async fn mark_job_failed(&self, job_id: &str, message: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE jobs SET status = ?, status_message = ? WHERE job_id = ? AND status = ?",
        )
        .bind(Status::Failed.to_i32())
        .bind(message)
        .bind(job_id)
        .bind(Status::InProgress.to_i32())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to mark job failed: {}",
                e
            )))
        })?;

        self.check_transition(job_id, result.rows_affected(), Status::Failed)
            .await
    }

    /// Explain a guarded update that matched no row
    async fn check_transition(&self, job_id: &str, rows_affected: u64, to: Status) -> Result<()> {
        if rows_affected > 0 {
            return Ok(());
        }

        let current: Option<i32> = sqlx::query_scalar("SELECT status FROM jobs WHERE job_id = ?")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to read job status: {}",
                    e
                )))
            })?;

        match current {
            None => Err(Error::JobNotFound(job_id.to_string())),
            Some(code) => Err(Error::InvalidTransition {
                job_id: job_id.to_string(),
                from: Status::from_i32(code),
                to,
            }),
        }
    }
}
