use std::sync::Arc;

use log::info;
use uuid::Uuid;

use crate::domains::core::file_storage::FileStorageService;
use crate::errors::{DomainError, DomainResult};

use super::discovery::FieldDiscovery;
use super::extract::ExtractorRegistry;
use super::types::Template;

/// Template upload pipeline: extract text, discover fields, store the bytes.
///
/// Storage is content-addressed, so uploading a file whose bytes already exist
/// resolves to the stored copy instead of writing a duplicate.
pub struct TemplateService {
    storage: Arc<dyn FileStorageService>,
    extractors: ExtractorRegistry,
    discovery: FieldDiscovery,
}

impl TemplateService {
    pub fn new(storage: Arc<dyn FileStorageService>) -> Self {
        Self {
            storage,
            extractors: ExtractorRegistry::default(),
            discovery: FieldDiscovery::default(),
        }
    }

    pub fn with_discovery(storage: Arc<dyn FileStorageService>, discovery: FieldDiscovery) -> Self {
        Self {
            storage,
            extractors: ExtractorRegistry::default(),
            discovery,
        }
    }

    pub async fn upload_template(
        &self,
        name: &str,
        original_filename: &str,
        data: &[u8],
    ) -> DomainResult<Template> {
        let extension = extension_of(original_filename)?;
        let text = self.extractors.extract(&extension, data)?;
        let fields = self.discovery.discover(&text)?;

        let stored = self.storage.save_template(data, &extension).await?;
        if stored.reused {
            info!(
                "template '{}' reuses stored file {} (hash {})",
                name, stored.relative_path, stored.content_hash
            );
        }

        Ok(Template {
            id: Uuid::new_v4(),
            name: name.to_string(),
            file_path: stored.relative_path,
            content_hash: stored.content_hash,
            fields,
        })
    }

    /// Re-runs extraction and discovery for a replacement upload, keeping the
    /// template's identity.
    pub async fn update_template_file(
        &self,
        template: &mut Template,
        original_filename: &str,
        data: &[u8],
    ) -> DomainResult<()> {
        let extension = extension_of(original_filename)?;
        let text = self.extractors.extract(&extension, data)?;
        let fields = self.discovery.discover(&text)?;

        let stored = self.storage.save_template(data, &extension).await?;
        template.file_path = stored.relative_path;
        template.content_hash = stored.content_hash;
        template.fields = fields;
        Ok(())
    }
}

fn extension_of(filename: &str) -> DomainResult<String> {
    filename
        .rsplit('.')
        .next()
        .filter(|ext| !ext.is_empty() && *ext != filename)
        .map(|ext| ext.to_ascii_lowercase())
        .ok_or_else(|| DomainError::UnsupportedFormat(filename.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::core::file_storage::LocalFileStorageService;
    use crate::domains::template::types::SubstitutionStyle;
    use tempfile::TempDir;

    fn service(dir: &TempDir) -> TemplateService {
        let storage = LocalFileStorageService::new(dir.path().to_str().unwrap()).unwrap();
        TemplateService::new(Arc::new(storage))
    }

    #[tokio::test]
    async fn upload_discovers_fields_and_stores_bytes() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir);

        let template = service
            .upload_template("contract", "contract.txt", b"Dear {{NAME}}, amount: ")
            .await
            .unwrap();

        assert_eq!(template.fields.len(), 2);
        assert_eq!(template.fields[0].name, "NAME");
        assert_eq!(template.fields[0].style, SubstitutionStyle::Replace);
        assert_eq!(template.fields[1].name, "amount");
        assert_eq!(template.fields[1].style, SubstitutionStyle::Right);
        assert!(template.file_path.ends_with(".txt"));
    }

    #[tokio::test]
    async fn identical_upload_reuses_the_stored_path() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir);

        let first = service
            .upload_template("a", "a.txt", b"{{X}}")
            .await
            .unwrap();
        let second = service
            .upload_template("b", "b.txt", b"{{X}}")
            .await
            .unwrap();

        assert_eq!(first.file_path, second.file_path);
        assert_eq!(first.content_hash, second.content_hash);
        assert_ne!(first.id, second.id);
    }

    #[tokio::test]
    async fn filename_without_extension_is_unsupported() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir);

        let err = service
            .upload_template("x", "noextension", b"{{X}}")
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::UnsupportedFormat(_)));
    }

    #[tokio::test]
    async fn blank_template_is_unrecognized() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir);

        let err = service
            .upload_template("x", "x.txt", b"   ")
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::UnrecognizedTemplateFormat));
    }
}
