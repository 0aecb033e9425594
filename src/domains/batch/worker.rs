//! Background worker of one export job. Renders every requested document,
//! packs the results into a zip archive and reports progress in decile steps
//! through the repository and the notification hub.
//!
//! Rendering runs in parallel, bounded by available parallelism. Archive
//! writes are strictly serial and follow submission order: entry N of the
//! archive is document N of the request.

use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};
use tokio::sync::{Mutex, Semaphore};
use uuid::Uuid;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::domains::core::file_storage::FileStorageService;
use crate::domains::notify::NotificationHub;
use crate::domains::render::instantiate;
use crate::domains::render::RenderService;
use crate::domains::template::types::{build_replacements, validate_bindings};
use crate::errors::{DbError, DomainError, DomainResult};

use super::repository::ExportJobRepository;
use super::types::{DocumentFailure, DocumentResolver, ExportJob, JobStatus};

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// How often the worker polls for its job record before giving up.
    pub pickup_attempts: u32,
    pub pickup_delay: Duration,
    /// Upper bound on documents rendered at the same time.
    pub max_parallelism: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            pickup_attempts: 10,
            pickup_delay: Duration::from_millis(200),
            max_parallelism: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
        }
    }
}

enum RenderOutcome {
    Rendered { name: String, bytes: Vec<u8> },
    Skipped { failure: DocumentFailure },
}

pub struct ExportWorker {
    repository: Arc<dyn ExportJobRepository>,
    resolver: Arc<dyn DocumentResolver>,
    storage: Arc<dyn FileStorageService>,
    render: Arc<RenderService>,
    hub: Arc<NotificationHub>,
    config: WorkerConfig,
}

impl ExportWorker {
    pub fn new(
        repository: Arc<dyn ExportJobRepository>,
        resolver: Arc<dyn DocumentResolver>,
        storage: Arc<dyn FileStorageService>,
        render: Arc<RenderService>,
        hub: Arc<NotificationHub>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            repository,
            resolver,
            storage,
            render,
            hub,
            config,
        }
    }

    /// Drives one job to a terminal status. All failures end in a persisted
    /// ERROR state except a job that never became visible, which is abandoned
    /// after the pickup retries run out.
    pub async fn run(&self, job_id: Uuid) {
        let mut job = match self.pick_up(job_id).await {
            Some(job) => job,
            None => {
                warn!("{}", DomainError::JobNotVisible(job_id));
                return;
            }
        };

        if self.render.exporters().find(&job.format).is_none() {
            let err = DomainError::UnsupportedFormat(job.format.clone());
            self.fail(&mut job, &err).await;
            return;
        }

        self.transition(&mut job, JobStatus::Downloading, None).await;

        match self.build_archive(&mut job).await {
            Ok(archive_path) => {
                if let Err(e) = self
                    .repository
                    .mark_downloaded(job.id, &archive_path, &job.failures)
                    .await
                {
                    error!("Failed to persist job {} completion: {}", job.id, e);
                }
                job.status = JobStatus::Downloaded;
                job.progress = Some(100);
                job.archive_path = Some(archive_path);
                info!(
                    "Job {} downloaded: {} documents, {} skipped",
                    job.id,
                    job.document_ids.len() - job.failures.len(),
                    job.failures.len()
                );
                self.hub.publish(job.snapshot());
            }
            Err(e) => self.fail(&mut job, &e).await,
        }
    }

    /// The job record is written by the submitter, possibly in a transaction
    /// that has not committed yet when the worker starts. Poll a fixed number
    /// of times before abandoning.
    async fn pick_up(&self, job_id: Uuid) -> Option<ExportJob> {
        for attempt in 0..self.config.pickup_attempts {
            match self.repository.find_by_id(job_id).await {
                Ok(job) => return Some(job),
                Err(DbError::NotFound(_, _)) => {
                    if attempt + 1 < self.config.pickup_attempts {
                        tokio::time::sleep(self.config.pickup_delay).await;
                    }
                }
                Err(e) => {
                    error!("Failed to pick up job {}: {}", job_id, e);
                    return None;
                }
            }
        }
        None
    }

    async fn transition(&self, job: &mut ExportJob, status: JobStatus, progress: Option<u8>) {
        job.status = status;
        job.progress = progress;
        if let Err(e) = self.repository.update_status(job.id, status, progress).await {
            error!("Failed to persist job {} status {}: {}", job.id, status, e);
        }
        self.hub.publish(job.snapshot());
    }

    async fn fail(&self, job: &mut ExportJob, err: &DomainError) {
        error!("Job {} failed: {}", job.id, err);
        let message = err.to_string();
        if let Err(e) = self
            .repository
            .mark_error(job.id, &message, &job.failures)
            .await
        {
            error!("Failed to persist job {} error: {}", job.id, e);
        }
        job.status = JobStatus::Error;
        job.archive_path = None;
        job.error_message = Some(message);
        self.hub.publish(job.snapshot());
    }

    /// Renders all documents and packs them. Returns the absolute archive
    /// path. Skipped documents accumulate in `job.failures`.
    async fn build_archive(&self, job: &mut ExportJob) -> DomainResult<String> {
        let total = job.document_ids.len();
        let semaphore = Arc::new(Semaphore::new(self.config.max_parallelism.max(1)));
        let file_cache: Arc<Mutex<HashMap<String, Arc<Vec<u8>>>>> =
            Arc::new(Mutex::new(HashMap::new()));

        let mut handles = Vec::with_capacity(total);
        for &document_id in &job.document_ids {
            let semaphore = semaphore.clone();
            let file_cache = file_cache.clone();
            let resolver = self.resolver.clone();
            let storage = self.storage.clone();
            let render = self.render.clone();
            let format = job.format.clone();
            handles.push(tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|_| DomainError::Internal("render pool closed".to_string()))?;
                render_one(document_id, &format, resolver, storage, render, file_cache).await
            }));
        }

        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

        let mut processed = 0usize;
        let mut last_bucket = 0usize;
        for handle in handles {
            let outcome = handle
                .await
                .map_err(|e| DomainError::Internal(format!("render task panicked: {}", e)))??;
            match outcome {
                RenderOutcome::Rendered { name, bytes } => {
                    writer
                        .start_file(format!("{}.{}", name, job.format), options)
                        .map_err(|e| DomainError::Internal(format!("zip: {}", e)))?;
                    writer.write_all(&bytes)?;
                }
                RenderOutcome::Skipped { failure } => {
                    warn!(
                        "Job {}: skipping document {}: {}",
                        job.id, failure.document_id, failure.reason
                    );
                    job.failures.push(failure);
                }
            }

            processed += 1;
            let bucket = processed * 10 / total;
            if bucket > last_bucket {
                last_bucket = bucket;
                self.transition(job, JobStatus::Progress, Some((bucket * 10) as u8))
                    .await;
            }
        }

        let cursor = writer
            .finish()
            .map_err(|e| DomainError::Internal(format!("zip: {}", e)))?;

        let archive_path = self
            .storage
            .allocate_archive_path(&format!("{}.zip", job.id))
            .await
            .map_err(DomainError::from)?;
        tokio::fs::write(&archive_path, cursor.into_inner()).await?;
        Ok(archive_path.to_string_lossy().into_owned())
    }
}

/// Renders a single document. A missing template file does not fail the job;
/// it is reported back as a skip.
async fn render_one(
    document_id: Uuid,
    format: &str,
    resolver: Arc<dyn DocumentResolver>,
    storage: Arc<dyn FileStorageService>,
    render: Arc<RenderService>,
    file_cache: Arc<Mutex<HashMap<String, Arc<Vec<u8>>>>>,
) -> DomainResult<RenderOutcome> {
    let resolved = resolver.resolve(document_id).await?;
    validate_bindings(&resolved.template, &resolved.bindings)?;
    let replacements = build_replacements(&resolved.template, &resolved.bindings);

    // The lock is held across the read so concurrent tasks sharing one
    // template load its bytes exactly once.
    let bytes = {
        let mut cache = file_cache.lock().await;
        match cache.get(&resolved.template.file_path) {
            Some(bytes) => bytes.clone(),
            None => {
                let loaded = match storage.read_file(&resolved.template.file_path).await {
                    Ok(bytes) => Arc::new(bytes),
                    Err(e) => {
                        return match DomainError::from(e) {
                            DomainError::TemplateFileMissing(path) => Ok(RenderOutcome::Skipped {
                                failure: DocumentFailure {
                                    document_id,
                                    reason: format!("template file missing: {}", path),
                                },
                            }),
                            other => Err(other),
                        };
                    }
                };
                cache
                    .insert(resolved.template.file_path.clone(), loaded.clone());
                loaded
            }
        }
    };

    let canonical = render.to_canonical(&resolved.template, &bytes).await?;
    let instantiated = instantiate(&canonical, &replacements);
    let bytes = render
        .exporters()
        .export(format, &instantiated, &replacements)
        .await?;
    Ok(RenderOutcome::Rendered {
        name: resolved.name,
        bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::batch::repository::{init_export_schema, SqliteExportJobRepository};
    use crate::domains::batch::types::{JobStatusSnapshot, ResolvedDocument};
    use crate::domains::core::file_storage::LocalFileStorageService;
    use crate::domains::render::OfficeConverter;
    use crate::domains::template::service::TemplateService;
    use crate::domains::template::types::ValueBinding;
    use async_trait::async_trait;
    use sqlx::SqlitePool;
    use tempfile::TempDir;

    struct MapResolver {
        documents: HashMap<Uuid, ResolvedDocument>,
    }

    #[async_trait]
    impl DocumentResolver for MapResolver {
        async fn resolve(&self, document_id: Uuid) -> DomainResult<ResolvedDocument> {
            self.documents
                .get(&document_id)
                .cloned()
                .ok_or(DomainError::EntityNotFound(
                    "document".to_string(),
                    document_id,
                ))
        }
    }

    async fn repo() -> Arc<dyn ExportJobRepository> {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        init_export_schema(&pool).await.unwrap();
        Arc::new(SqliteExportJobRepository::new(pool))
    }

    fn test_config() -> WorkerConfig {
        WorkerConfig {
            pickup_attempts: 2,
            pickup_delay: Duration::from_millis(5),
            max_parallelism: 4,
        }
    }

    async fn collect_until_terminal(
        sub: &mut crate::domains::notify::JobSubscription,
    ) -> Vec<JobStatusSnapshot> {
        let mut snapshots = Vec::new();
        while let Some(snapshot) = sub.next().await {
            let terminal = snapshot.status.is_terminal();
            snapshots.push(snapshot);
            if terminal {
                break;
            }
        }
        snapshots
    }

    #[tokio::test]
    async fn progress_is_published_in_decile_buckets() {
        let dir = TempDir::new().unwrap();
        let storage: Arc<dyn FileStorageService> =
            Arc::new(LocalFileStorageService::new(dir.path().to_str().unwrap()).unwrap());
        let template = TemplateService::new(storage.clone())
            .upload_template("letter", "letter.txt", b"Dear {{NAME}}")
            .await
            .unwrap();

        let mut documents = HashMap::new();
        let mut ids = Vec::new();
        for i in 0..20 {
            let id = Uuid::new_v4();
            ids.push(id);
            documents.insert(
                id,
                ResolvedDocument {
                    name: format!("doc-{}", i),
                    template: template.clone(),
                    bindings: vec![ValueBinding {
                        field_name: "NAME".to_string(),
                        value: Some("Ann".to_string()),
                    }],
                },
            );
        }

        let repository = repo().await;
        let job = ExportJob::new("txt", ids);
        repository.create(&job).await.unwrap();

        let hub = Arc::new(NotificationHub::default());
        let mut sub = hub.subscribe(job.id);
        let worker = ExportWorker::new(
            repository,
            Arc::new(MapResolver { documents }),
            storage.clone(),
            Arc::new(RenderService::new(
                storage,
                Arc::new(OfficeConverter::unavailable()),
            )),
            hub.clone(),
            test_config(),
        );
        worker.run(job.id).await;

        let snapshots = collect_until_terminal(&mut sub).await;
        assert_eq!(snapshots.first().unwrap().status, JobStatus::Downloading);
        assert_eq!(snapshots.last().unwrap().status, JobStatus::Downloaded);

        // the lifecycle only moves forward
        for pair in snapshots.windows(2) {
            assert!(pair[0].status.rank() <= pair[1].status.rank());
        }

        // 20 documents collapse into exactly one event per decile
        let percents: Vec<u8> = snapshots
            .iter()
            .filter(|s| s.status == JobStatus::Progress)
            .map(|s| s.progress.unwrap())
            .collect();
        assert_eq!(percents, vec![10, 20, 30, 40, 50, 60, 70, 80, 90, 100]);
    }

    #[tokio::test]
    async fn pickup_gives_up_on_an_invisible_job() {
        let dir = TempDir::new().unwrap();
        let storage: Arc<dyn FileStorageService> =
            Arc::new(LocalFileStorageService::new(dir.path().to_str().unwrap()).unwrap());
        let repository = repo().await;
        let hub = Arc::new(NotificationHub::default());
        let worker = ExportWorker::new(
            repository.clone(),
            Arc::new(MapResolver {
                documents: HashMap::new(),
            }),
            storage.clone(),
            Arc::new(RenderService::new(
                storage,
                Arc::new(OfficeConverter::unavailable()),
            )),
            hub,
            test_config(),
        );

        let ghost = Uuid::new_v4();
        worker.run(ghost).await;
        assert!(matches!(
            repository.find_by_id(ghost).await.unwrap_err(),
            DbError::NotFound(_, _)
        ));
    }
}
