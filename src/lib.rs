use std::sync::Arc;

// Public modules
pub mod domains;
pub mod errors;

use domains::batch::{DocumentResolver, ExportService, SqliteExportJobRepository};
use domains::core::file_storage::{FileStorageService, LocalFileStorageService};
use domains::notify::NotificationHub;
use domains::render::{OfficeConverter, RenderService};
use domains::template::TemplateService;
use errors::DomainResult;

/// The wired service graph. The embedding application supplies the database
/// pool and its own `DocumentResolver`; everything else is assembled here.
pub struct DocGen {
    pub storage: Arc<dyn FileStorageService>,
    pub templates: Arc<TemplateService>,
    pub render: Arc<RenderService>,
    pub exports: Arc<ExportService>,
    pub notifications: Arc<NotificationHub>,
}

/// Initialize the library: file storage rooted at `storage_path`, job schema
/// in `pool`, and the external document-conversion process probed once.
pub async fn initialize(
    storage_path: &str,
    pool: sqlx::SqlitePool,
    resolver: Arc<dyn DocumentResolver>,
) -> DomainResult<DocGen> {
    // Initialize env_logger if not already initialized
    let _ = env_logger::try_init();

    domains::batch::init_export_schema(&pool).await?;

    let storage: Arc<dyn FileStorageService> = Arc::new(LocalFileStorageService::new(storage_path)?);
    let office = Arc::new(OfficeConverter::detect());
    let templates = Arc::new(TemplateService::new(storage.clone()));
    let render = Arc::new(RenderService::new(storage.clone(), office));
    let notifications = Arc::new(NotificationHub::default());
    let repository = Arc::new(SqliteExportJobRepository::new(pool));
    let exports = Arc::new(ExportService::new(
        repository,
        resolver,
        storage.clone(),
        render.clone(),
        notifications.clone(),
    ));

    Ok(DocGen {
        storage,
        templates,
        render,
        exports,
        notifications,
    })
}
