use std::sync::Arc;

use log::info;
use uuid::Uuid;

use crate::domains::core::file_storage::FileStorageService;
use crate::domains::notify::{JobSubscription, NotificationHub};
use crate::domains::render::RenderService;
use crate::errors::{DbError, DomainError, DomainResult};

use super::repository::ExportJobRepository;
use super::types::{DocumentResolver, ExportJob, JobStatus};
use super::worker::{ExportWorker, WorkerConfig};

/// Entry point for batch exports. Submission persists a job record and hands
/// it to a background worker; callers follow up by polling `job` or by
/// subscribing to the job's notification channel.
pub struct ExportService {
    repository: Arc<dyn ExportJobRepository>,
    resolver: Arc<dyn DocumentResolver>,
    storage: Arc<dyn FileStorageService>,
    render: Arc<RenderService>,
    hub: Arc<NotificationHub>,
    worker_config: WorkerConfig,
}

impl ExportService {
    pub fn new(
        repository: Arc<dyn ExportJobRepository>,
        resolver: Arc<dyn DocumentResolver>,
        storage: Arc<dyn FileStorageService>,
        render: Arc<RenderService>,
        hub: Arc<NotificationHub>,
    ) -> Self {
        Self {
            repository,
            resolver,
            storage,
            render,
            hub,
            worker_config: WorkerConfig::default(),
        }
    }

    pub fn with_worker_config(mut self, config: WorkerConfig) -> Self {
        self.worker_config = config;
        self
    }

    /// Creates a job for `document_ids` and starts rendering in the
    /// background. Returns the job id immediately.
    pub async fn submit(&self, document_ids: Vec<Uuid>, format: &str) -> DomainResult<Uuid> {
        let job = ExportJob::new(format, document_ids);
        self.repository.create(&job).await?;
        info!(
            "Submitted export job {}: {} documents to {}",
            job.id,
            job.document_ids.len(),
            job.format
        );

        let worker = ExportWorker::new(
            self.repository.clone(),
            self.resolver.clone(),
            self.storage.clone(),
            self.render.clone(),
            self.hub.clone(),
            self.worker_config.clone(),
        );
        let job_id = job.id;
        tokio::spawn(async move { worker.run(job_id).await });
        Ok(job_id)
    }

    pub async fn job(&self, job_id: Uuid) -> DomainResult<ExportJob> {
        self.repository.find_by_id(job_id).await.map_err(|e| match e {
            DbError::NotFound(_, _) => {
                DomainError::EntityNotFound("export job".to_string(), job_id)
            }
            other => other.into(),
        })
    }

    pub fn subscribe(&self, job_id: Uuid) -> JobSubscription {
        self.hub.subscribe(job_id)
    }

    /// Reads the finished archive. Only valid once the job is downloaded.
    pub async fn archive_bytes(&self, job_id: Uuid) -> DomainResult<Vec<u8>> {
        let job = self.job(job_id).await?;
        if job.status != JobStatus::Downloaded {
            return Err(DomainError::ArchiveNotReady(job.status));
        }
        let path = job
            .archive_path
            .ok_or(DomainError::ArchivePathMissing(job_id))?;
        Ok(tokio::fs::read(&path).await?)
    }
}
