use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;

#[derive(Debug, Error)]
pub enum FileStorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("File not found: {0}")]
    NotFound(String),
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    #[error("Invalid path component: {0}")]
    InvalidPathComponent(String),
    #[error("Unknown storage error: {0}")]
    Other(String),
}

pub type FileStorageResult<T> = Result<T, FileStorageError>;

/// Outcome of storing template bytes.
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub relative_path: String,
    pub content_hash: String,
    pub size_bytes: u64,
    /// True when identical bytes were already on disk and the existing file was reused.
    pub reused: bool,
}

/// Lowercase hex SHA-256 of a byte slice.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Service trait for abstracting file storage operations.
///
/// Template bytes are stored content-addressed: the relative path is derived from
/// the SHA-256 of the data, so re-uploading identical bytes resolves to the file
/// already on disk instead of duplicating storage.
#[async_trait]
pub trait FileStorageService: Send + Sync {
    /// Save template data, returning its stored location and hash.
    async fn save_template(&self, data: &[u8], extension: &str) -> FileStorageResult<StoredFile>;

    /// Read a stored file using its relative path.
    async fn read_file(&self, relative_path: &str) -> FileStorageResult<Vec<u8>>;

    /// Reserve an absolute path for a new batch archive. The parent directory is
    /// guaranteed to exist; the file itself is not created.
    async fn allocate_archive_path(&self, file_name: &str) -> FileStorageResult<PathBuf>;

    /// Get the full absolute path for a given relative path.
    fn get_absolute_path(&self, relative_path: &str) -> PathBuf;
}

// --- Local File Storage Implementation ---

pub struct LocalFileStorageService {
    base_path: PathBuf,
    templates_subdir: String,
    downloads_subdir: String,
}

impl LocalFileStorageService {
    /// Creates a new LocalFileStorageService.
    /// Ensures the base directory and subdirectories exist.
    pub fn new(base_path_str: &str) -> io::Result<Self> {
        let base_path = PathBuf::from(base_path_str);
        let templates_subdir = "templates".to_string();
        let downloads_subdir = "downloads".to_string();

        // Create directories synchronously during setup
        std::fs::create_dir_all(base_path.join(&templates_subdir))?;
        std::fs::create_dir_all(base_path.join(&downloads_subdir))?;

        Ok(Self {
            base_path,
            templates_subdir,
            downloads_subdir,
        })
    }

    /// Rejects path components that could escape the base directory.
    fn sanitize_component(component: &str) -> FileStorageResult<&str> {
        if component.is_empty()
            || component.contains('/')
            || component.contains('\\')
            || component == "."
            || component == ".."
        {
            Err(FileStorageError::InvalidPathComponent(component.to_string()))
        } else {
            Ok(component)
        }
    }
}

#[async_trait]
impl FileStorageService for LocalFileStorageService {
    async fn save_template(&self, data: &[u8], extension: &str) -> FileStorageResult<StoredFile> {
        let extension = Self::sanitize_component(extension)?.to_ascii_lowercase();
        let content_hash = sha256_hex(data);
        let file_name = format!("{}.{}", content_hash, extension);

        let relative_path = Path::new(&self.templates_subdir)
            .join(&file_name)
            .to_str()
            .ok_or_else(|| FileStorageError::Other("non-UTF8 storage path".to_string()))?
            .to_string();
        let absolute_path = self.get_absolute_path(&relative_path);

        let reused = fs::try_exists(&absolute_path).await?;
        if !reused {
            fs::write(&absolute_path, data).await?;
        }

        Ok(StoredFile {
            relative_path,
            content_hash,
            size_bytes: data.len() as u64,
            reused,
        })
    }

    async fn read_file(&self, relative_path: &str) -> FileStorageResult<Vec<u8>> {
        let absolute_path = self.get_absolute_path(relative_path);

        if !absolute_path.starts_with(&self.base_path) {
            return Err(FileStorageError::PermissionDenied(
                "attempt to read outside base path".to_string(),
            ));
        }

        match fs::read(&absolute_path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(FileStorageError::NotFound(relative_path.to_string()))
            }
            Err(e) => Err(FileStorageError::Io(e)),
        }
    }

    async fn allocate_archive_path(&self, file_name: &str) -> FileStorageResult<PathBuf> {
        let file_name = Self::sanitize_component(file_name)?;
        let dir = self.base_path.join(&self.downloads_subdir);
        fs::create_dir_all(&dir).await?;
        Ok(dir.join(file_name))
    }

    fn get_absolute_path(&self, relative_path: &str) -> PathBuf {
        // Cleans RootDir/ParentDir components so a stored path can never walk
        // above the base directory.
        let mut abs_path = self.base_path.clone();
        for component in Path::new(relative_path).components() {
            if let std::path::Component::Normal(comp) = component {
                abs_path.push(comp);
            }
        }
        abs_path
    }
}
