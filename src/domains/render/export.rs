//! Output exporters: serialize an instantiated document (or the bound values
//! directly, for tabular targets) into the bytes of a requested format.

use std::sync::Arc;

use async_trait::async_trait;
use log::warn;

use crate::domains::document::docx::write_docx;
use crate::domains::document::types::Document;
use crate::domains::template::types::ReplacementMap;
use crate::errors::{DomainError, DomainResult};

use super::office::OfficeConverter;

#[async_trait]
pub trait Exporter: Send + Sync {
    fn supports(&self, format: &str) -> bool;
    async fn export(
        &self,
        document: &Document,
        replacements: &ReplacementMap,
    ) -> DomainResult<Vec<u8>>;
}

pub struct DocxExporter;

#[async_trait]
impl Exporter for DocxExporter {
    fn supports(&self, format: &str) -> bool {
        format.eq_ignore_ascii_case("docx")
    }

    async fn export(
        &self,
        document: &Document,
        _replacements: &ReplacementMap,
    ) -> DomainResult<Vec<u8>> {
        write_docx(document)
    }
}

pub struct TxtExporter;

#[async_trait]
impl Exporter for TxtExporter {
    fn supports(&self, format: &str) -> bool {
        format.eq_ignore_ascii_case("txt")
    }

    async fn export(
        &self,
        _document: &Document,
        replacements: &ReplacementMap,
    ) -> DomainResult<Vec<u8>> {
        let mut names: Vec<&String> = replacements.keys().collect();
        names.sort();

        let mut out = String::new();
        for name in names {
            let value = replacements
                .get(name)
                .and_then(|(_, value)| value.as_deref())
                .unwrap_or("");
            out.push_str(name);
            out.push_str(": ");
            out.push_str(value);
            out.push('\n');
        }
        Ok(out.into_bytes())
    }
}

pub struct CsvExporter;

#[async_trait]
impl Exporter for CsvExporter {
    fn supports(&self, format: &str) -> bool {
        format.eq_ignore_ascii_case("csv")
    }

    async fn export(
        &self,
        _document: &Document,
        replacements: &ReplacementMap,
    ) -> DomainResult<Vec<u8>> {
        let mut names: Vec<&String> = replacements.keys().collect();
        names.sort();

        let mut writer = csv::Writer::from_writer(Vec::new());
        writer
            .write_record(names.iter().map(|n| n.as_str()))
            .map_err(|e| DomainError::Internal(format!("csv: {}", e)))?;
        let values: Vec<&str> = names
            .iter()
            .map(|name| {
                replacements
                    .get(*name)
                    .and_then(|(_, value)| value.as_deref())
                    .unwrap_or("")
            })
            .collect();
        writer
            .write_record(&values)
            .map_err(|e| DomainError::Internal(format!("csv: {}", e)))?;
        writer
            .into_inner()
            .map_err(|e| DomainError::Internal(format!("csv: {}", e)))
    }
}

/// Pdf export serializes the canonical container and hands it to the external
/// conversion process. A conversion failure degrades to an empty payload so a
/// batch run keeps going; the failure is logged.
pub struct PdfExporter {
    office: Arc<OfficeConverter>,
}

impl PdfExporter {
    pub fn new(office: Arc<OfficeConverter>) -> Self {
        Self { office }
    }
}

#[async_trait]
impl Exporter for PdfExporter {
    fn supports(&self, format: &str) -> bool {
        format.eq_ignore_ascii_case("pdf")
    }

    async fn export(
        &self,
        document: &Document,
        _replacements: &ReplacementMap,
    ) -> DomainResult<Vec<u8>> {
        let docx_bytes = write_docx(document)?;
        match self.office.convert(&docx_bytes, "docx", "pdf").await {
            Ok(bytes) => Ok(bytes),
            Err(e) => {
                warn!("Pdf export failed, emitting empty payload: {}", e);
                Ok(Vec::new())
            }
        }
    }
}

pub struct ExporterRegistry {
    exporters: Vec<Box<dyn Exporter>>,
}

impl ExporterRegistry {
    pub fn standard(office: Arc<OfficeConverter>) -> Self {
        Self {
            exporters: vec![
                Box::new(DocxExporter),
                Box::new(TxtExporter),
                Box::new(CsvExporter),
                Box::new(PdfExporter::new(office)),
            ],
        }
    }

    pub fn find(&self, format: &str) -> Option<&dyn Exporter> {
        self.exporters
            .iter()
            .find(|e| e.supports(format))
            .map(|e| e.as_ref())
    }

    pub async fn export(
        &self,
        format: &str,
        document: &Document,
        replacements: &ReplacementMap,
    ) -> DomainResult<Vec<u8>> {
        let exporter = self
            .find(format)
            .ok_or_else(|| DomainError::UnsupportedFormat(format.to_string()))?;
        exporter.export(document, replacements).await
    }
}
