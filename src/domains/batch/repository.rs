use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::errors::{DbError, DbResult};

use super::types::{DocumentFailure, ExportJob, JobStatus};

/// Creates the export job table if it does not exist yet.
pub async fn init_export_schema(pool: &SqlitePool) -> DbResult<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS export_jobs (
            id TEXT PRIMARY KEY NOT NULL,
            format TEXT NOT NULL,
            document_ids TEXT NOT NULL,
            status TEXT NOT NULL,
            progress INTEGER,
            archive_path TEXT,
            error_message TEXT,
            failures TEXT NOT NULL DEFAULT '[]',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;
    Ok(())
}

fn status_to_str(status: JobStatus) -> &'static str {
    status.as_str()
}

fn str_to_status(s: &str) -> DbResult<JobStatus> {
    match s {
        "CREATED" => Ok(JobStatus::Created),
        "DOWNLOADING" => Ok(JobStatus::Downloading),
        "PROGRESS" => Ok(JobStatus::Progress),
        "DOWNLOADED" => Ok(JobStatus::Downloaded),
        "ERROR" => Ok(JobStatus::Error),
        other => Err(DbError::Other(format!("unknown job status '{}'", other))),
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ExportJobRow {
    id: String,
    format: String,
    document_ids: String,
    status: String,
    progress: Option<i64>,
    archive_path: Option<String>,
    error_message: Option<String>,
    failures: String,
    created_at: String,
    updated_at: String,
}

impl ExportJobRow {
    fn into_entity(self) -> DbResult<ExportJob> {
        let parse_ts = |s: &str| -> DbResult<DateTime<Utc>> {
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| DbError::Other(format!("bad timestamp '{}': {}", s, e)))
        };
        Ok(ExportJob {
            id: Uuid::parse_str(&self.id)
                .map_err(|e| DbError::Other(format!("bad job id '{}': {}", self.id, e)))?,
            format: self.format,
            document_ids: serde_json::from_str(&self.document_ids)
                .map_err(|e| DbError::Other(format!("bad document_ids json: {}", e)))?,
            status: str_to_status(&self.status)?,
            progress: self.progress.map(|p| p as u8),
            archive_path: self.archive_path,
            error_message: self.error_message,
            failures: serde_json::from_str(&self.failures)
                .map_err(|e| DbError::Other(format!("bad failures json: {}", e)))?,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
        })
    }
}

#[async_trait]
pub trait ExportJobRepository: Send + Sync {
    async fn create(&self, job: &ExportJob) -> DbResult<()>;
    async fn find_by_id(&self, id: Uuid) -> DbResult<ExportJob>;
    async fn update_status(
        &self,
        id: Uuid,
        status: JobStatus,
        progress: Option<u8>,
    ) -> DbResult<()>;
    async fn mark_downloaded(
        &self,
        id: Uuid,
        archive_path: &str,
        failures: &[DocumentFailure],
    ) -> DbResult<()>;
    async fn mark_error(&self, id: Uuid, message: &str, failures: &[DocumentFailure])
        -> DbResult<()>;
}

pub struct SqliteExportJobRepository {
    pool: SqlitePool,
}

impl SqliteExportJobRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ExportJobRepository for SqliteExportJobRepository {
    async fn create(&self, job: &ExportJob) -> DbResult<()> {
        let document_ids = serde_json::to_string(&job.document_ids)
            .map_err(|e| DbError::Other(format!("serialize document_ids: {}", e)))?;
        let failures = serde_json::to_string(&job.failures)
            .map_err(|e| DbError::Other(format!("serialize failures: {}", e)))?;

        sqlx::query(
            "INSERT INTO export_jobs
             (id, format, document_ids, status, progress, archive_path, error_message, failures, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(job.id.to_string())
        .bind(&job.format)
        .bind(document_ids)
        .bind(status_to_str(job.status))
        .bind(job.progress.map(|p| p as i64))
        .bind(&job.archive_path)
        .bind(&job.error_message)
        .bind(failures)
        .bind(job.created_at.to_rfc3339())
        .bind(job.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> DbResult<ExportJob> {
        let row = sqlx::query_as::<_, ExportJobRow>("SELECT * FROM export_jobs WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::NotFound("export_jobs".to_string(), id.to_string()))?;
        row.into_entity()
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: JobStatus,
        progress: Option<u8>,
    ) -> DbResult<()> {
        sqlx::query(
            "UPDATE export_jobs SET status = ?, progress = ?, updated_at = ? WHERE id = ?",
        )
        .bind(status_to_str(status))
        .bind(progress.map(|p| p as i64))
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_downloaded(
        &self,
        id: Uuid,
        archive_path: &str,
        failures: &[DocumentFailure],
    ) -> DbResult<()> {
        let failures = serde_json::to_string(failures)
            .map_err(|e| DbError::Other(format!("serialize failures: {}", e)))?;
        sqlx::query(
            "UPDATE export_jobs
             SET status = ?, progress = 100, archive_path = ?, failures = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(status_to_str(JobStatus::Downloaded))
        .bind(archive_path)
        .bind(failures)
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_error(
        &self,
        id: Uuid,
        message: &str,
        failures: &[DocumentFailure],
    ) -> DbResult<()> {
        let failures = serde_json::to_string(failures)
            .map_err(|e| DbError::Other(format!("serialize failures: {}", e)))?;
        sqlx::query(
            "UPDATE export_jobs
             SET status = ?, archive_path = NULL, error_message = ?, failures = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(status_to_str(JobStatus::Error))
        .bind(message)
        .bind(failures)
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
