//! Single-document rendering: load the template file, normalize it into the
//! canonical model, instantiate the bound values and serialize the result.

use std::sync::Arc;

use log::debug;

use crate::domains::core::file_storage::FileStorageService;
use crate::domains::document::docx::{read_docx, CANONICAL_EXTENSION};
use crate::domains::document::types::Document;
use crate::domains::template::types::{
    build_replacements, validate_bindings, Template, ValueBinding,
};
use crate::errors::DomainResult;

use super::convert::ConverterRegistry;
use super::export::ExporterRegistry;
use super::instantiate::instantiate;
use super::office::OfficeConverter;

pub struct RenderService {
    storage: Arc<dyn FileStorageService>,
    converters: ConverterRegistry,
    exporters: ExporterRegistry,
}

impl RenderService {
    pub fn new(storage: Arc<dyn FileStorageService>, office: Arc<OfficeConverter>) -> Self {
        Self {
            storage,
            converters: ConverterRegistry::standard(office.clone()),
            exporters: ExporterRegistry::standard(office),
        }
    }

    pub fn exporters(&self) -> &ExporterRegistry {
        &self.exporters
    }

    /// Normalize raw template bytes into the canonical model based on the
    /// stored file extension.
    pub async fn to_canonical(&self, template: &Template, bytes: &[u8]) -> DomainResult<Document> {
        let extension = template.extension();
        if extension == CANONICAL_EXTENSION {
            read_docx(bytes)
        } else {
            self.converters.convert(&extension, bytes).await
        }
    }

    /// Render one document to `format` bytes. Bindings are validated against
    /// the template's fields before anything is loaded from storage.
    pub async fn export_document(
        &self,
        template: &Template,
        bindings: &[ValueBinding],
        format: &str,
    ) -> DomainResult<Vec<u8>> {
        validate_bindings(template, bindings)?;
        let replacements = build_replacements(template, bindings);

        let bytes = self.storage.read_file(&template.file_path).await?;
        let canonical = self.to_canonical(template, &bytes).await?;

        debug!(
            "Rendering template '{}' ({} bindings) to {}",
            template.name,
            bindings.len(),
            format
        );
        let instantiated = instantiate(&canonical, &replacements);
        self.exporters
            .export(format, &instantiated, &replacements)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::core::file_storage::LocalFileStorageService;
    use crate::domains::template::service::TemplateService;
    use crate::errors::{DomainError, ValidationError};
    use tempfile::TempDir;

    fn binding(name: &str, value: &str) -> ValueBinding {
        ValueBinding {
            field_name: name.to_string(),
            value: Some(value.to_string()),
        }
    }

    async fn fixture() -> (TempDir, Arc<dyn FileStorageService>, Template) {
        let dir = TempDir::new().unwrap();
        let storage: Arc<dyn FileStorageService> =
            Arc::new(LocalFileStorageService::new(dir.path().to_str().unwrap()).unwrap());
        let templates = TemplateService::new(storage.clone());
        let template = templates
            .upload_template("letter", "letter.txt", b"Dear {{NAME}}, sum: {{SUM}}")
            .await
            .unwrap();
        (dir, storage, template)
    }

    #[tokio::test]
    async fn renders_txt_template_to_txt() {
        let (_dir, storage, template) = fixture().await;
        let service = RenderService::new(storage, Arc::new(OfficeConverter::unavailable()));

        let bytes = service
            .export_document(
                &template,
                &[binding("NAME", "Ann"), binding("SUM", "12.50")],
                "txt",
            )
            .await
            .unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "NAME: Ann\nSUM: 12.50\n"
        );
    }

    #[tokio::test]
    async fn renders_substituted_docx() {
        let (_dir, storage, template) = fixture().await;
        let service = RenderService::new(storage, Arc::new(OfficeConverter::unavailable()));

        let bytes = service
            .export_document(
                &template,
                &[binding("NAME", "Ann"), binding("SUM", "12.50")],
                "docx",
            )
            .await
            .unwrap();
        let doc = read_docx(&bytes).unwrap();
        assert_eq!(doc.plain_text(), "Dear Ann, sum: 12.50\n");
    }

    #[tokio::test]
    async fn unknown_binding_is_rejected_before_storage_access() {
        let (_dir, storage, template) = fixture().await;
        let service = RenderService::new(storage, Arc::new(OfficeConverter::unavailable()));

        let err = service
            .export_document(&template, &[binding("BOGUS", "x")], "txt")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DomainError::Validation(ValidationError::UnknownField { .. })
        ));
    }

    #[tokio::test]
    async fn missing_template_file_maps_to_domain_error() {
        let (_dir, storage, mut template) = fixture().await;
        let service = RenderService::new(storage, Arc::new(OfficeConverter::unavailable()));
        template.file_path = "templates/gone.txt".to_string();

        let err = service
            .export_document(&template, &[], "txt")
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::TemplateFileMissing(_)));
    }
}
