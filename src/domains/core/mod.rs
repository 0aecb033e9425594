pub mod file_storage;

pub use file_storage::{
    FileStorageError, FileStorageResult, FileStorageService, LocalFileStorageService, StoredFile,
};
