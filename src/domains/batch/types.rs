use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domains::template::types::{Template, ValueBinding};
use crate::errors::DomainResult;

/// Lifecycle of an export job. A job moves forward only:
/// Created -> Downloading -> Progress (repeated) -> Downloaded or Error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    Created,
    Downloading,
    Progress,
    Downloaded,
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Created => "CREATED",
            JobStatus::Downloading => "DOWNLOADING",
            JobStatus::Progress => "PROGRESS",
            JobStatus::Downloaded => "DOWNLOADED",
            JobStatus::Error => "ERROR",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Downloaded | JobStatus::Error)
    }

    /// Position in the forward lifecycle, for monotonicity checks.
    pub fn rank(&self) -> u8 {
        match self {
            JobStatus::Created => 0,
            JobStatus::Downloading => 1,
            JobStatus::Progress => 2,
            JobStatus::Downloaded => 3,
            JobStatus::Error => 3,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A document the job could not render. Recorded on the job instead of
/// failing the whole batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentFailure {
    pub document_id: Uuid,
    pub reason: String,
}

/// Persistent record of a batch export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportJob {
    pub id: Uuid,
    pub format: String,
    pub document_ids: Vec<Uuid>,
    pub status: JobStatus,
    /// Last published progress percent, in decile steps.
    pub progress: Option<u8>,
    pub archive_path: Option<String>,
    pub error_message: Option<String>,
    pub failures: Vec<DocumentFailure>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ExportJob {
    pub fn new(format: &str, document_ids: Vec<Uuid>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            format: format.to_string(),
            document_ids,
            status: JobStatus::Created,
            progress: None,
            archive_path: None,
            error_message: None,
            failures: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn snapshot(&self) -> JobStatusSnapshot {
        JobStatusSnapshot {
            job_id: self.id,
            format: self.format.clone(),
            status: self.status,
            progress: self.progress,
            document_ids: self.document_ids.clone(),
            created_at: self.created_at,
        }
    }
}

/// What subscribers of a job see on every state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatusSnapshot {
    pub job_id: Uuid,
    pub format: String,
    pub status: JobStatus,
    pub progress: Option<u8>,
    pub document_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// A document resolved for rendering: its display name, the template it is
/// built from and the values bound to that template's fields.
#[derive(Debug, Clone)]
pub struct ResolvedDocument {
    pub name: String,
    pub template: Template,
    pub bindings: Vec<ValueBinding>,
}

/// Lookup seam between the batch pipeline and whatever stores documents.
#[async_trait]
pub trait DocumentResolver: Send + Sync {
    async fn resolve(&self, document_id: Uuid) -> DomainResult<ResolvedDocument>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(JobStatus::Downloaded.is_terminal());
        assert!(JobStatus::Error.is_terminal());
        assert!(!JobStatus::Progress.is_terminal());
    }

    #[test]
    fn lifecycle_ranks_are_monotonic() {
        assert!(JobStatus::Created.rank() < JobStatus::Downloading.rank());
        assert!(JobStatus::Downloading.rank() < JobStatus::Progress.rank());
        assert!(JobStatus::Progress.rank() < JobStatus::Downloaded.rank());
    }

    #[test]
    fn new_job_starts_created() {
        let job = ExportJob::new("pdf", vec![Uuid::new_v4()]);
        assert_eq!(job.status, JobStatus::Created);
        assert!(job.archive_path.is_none());
        assert!(job.failures.is_empty());
    }
}
