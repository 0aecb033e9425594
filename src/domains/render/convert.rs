//! Format converters: per-format adapters that normalize an uploaded byte
//! stream into the canonical document model. Dispatch is first-match over an
//! ordered adapter list, case-insensitive on the extension.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domains::document::docx::read_docx;
use crate::domains::document::types::{
    Block, Document, Paragraph, Table, TableCell, TableRow,
};
use crate::errors::{DomainError, DomainResult};

use super::office::OfficeConverter;

#[async_trait]
pub trait FormatConverter: Send + Sync {
    fn supports(&self, extension: &str) -> bool;
    async fn to_canonical(&self, input: &[u8]) -> DomainResult<Document>;
}

/// Each csv row becomes a table row of the canonical document.
pub struct CsvConverter;

#[async_trait]
impl FormatConverter for CsvConverter {
    fn supports(&self, extension: &str) -> bool {
        extension.eq_ignore_ascii_case("csv")
    }

    async fn to_canonical(&self, input: &[u8]) -> DomainResult<Document> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(input);

        let mut table = Table::default();
        for record in reader.records() {
            let record = record.map_err(|e| DomainError::Internal(format!("csv: {}", e)))?;
            let row = TableRow {
                cells: record
                    .iter()
                    .map(|cell| TableCell {
                        paragraphs: vec![Paragraph::from_text(cell.trim())],
                    })
                    .collect(),
            };
            table.rows.push(row);
        }

        Ok(Document {
            body: vec![Block::Table(table)],
            headers: vec![],
            footers: vec![],
        })
    }
}

/// Each text line becomes one paragraph.
pub struct TxtConverter;

#[async_trait]
impl FormatConverter for TxtConverter {
    fn supports(&self, extension: &str) -> bool {
        extension.eq_ignore_ascii_case("txt")
    }

    async fn to_canonical(&self, input: &[u8]) -> DomainResult<Document> {
        let text = String::from_utf8_lossy(input);
        Ok(Document {
            body: text
                .lines()
                .map(|line| Block::Paragraph(Paragraph::from_text(line)))
                .collect(),
            headers: vec![],
            footers: vec![],
        })
    }
}

/// Pdf input goes through the external conversion process into the canonical
/// container first.
pub struct PdfConverter {
    office: Arc<OfficeConverter>,
}

impl PdfConverter {
    pub fn new(office: Arc<OfficeConverter>) -> Self {
        Self { office }
    }
}

#[async_trait]
impl FormatConverter for PdfConverter {
    fn supports(&self, extension: &str) -> bool {
        extension.eq_ignore_ascii_case("pdf")
    }

    async fn to_canonical(&self, input: &[u8]) -> DomainResult<Document> {
        let docx_bytes = self.office.convert(input, "pdf", "docx").await?;
        read_docx(&docx_bytes)
    }
}

/// Ordered converter list; first `supports` match wins.
pub struct ConverterRegistry {
    converters: Vec<Box<dyn FormatConverter>>,
}

impl ConverterRegistry {
    pub fn standard(office: Arc<OfficeConverter>) -> Self {
        Self {
            converters: vec![
                Box::new(CsvConverter),
                Box::new(TxtConverter),
                Box::new(PdfConverter::new(office)),
            ],
        }
    }

    pub fn find(&self, extension: &str) -> Option<&dyn FormatConverter> {
        self.converters
            .iter()
            .find(|c| c.supports(extension))
            .map(|c| c.as_ref())
    }

    pub async fn convert(&self, extension: &str, input: &[u8]) -> DomainResult<Document> {
        let converter = self
            .find(extension)
            .ok_or_else(|| DomainError::UnsupportedFormat(extension.to_string()))?;
        converter.to_canonical(input).await
    }
}
