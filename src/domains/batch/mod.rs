pub mod repository;
pub mod service;
pub mod types;
pub mod worker;

pub use repository::{init_export_schema, ExportJobRepository, SqliteExportJobRepository};
pub use service::ExportService;
pub use types::{
    DocumentFailure, DocumentResolver, ExportJob, JobStatus, JobStatusSnapshot, ResolvedDocument,
};
pub use worker::{ExportWorker, WorkerConfig};
