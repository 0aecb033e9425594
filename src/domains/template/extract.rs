//! Per-format text extractors.
//!
//! At template-upload time the raw text of the uploaded file is what field
//! discovery scans. Each adapter answers `supports` for an extension; the
//! registry dispatches to the first match.

use crate::domains::document::docx::read_docx;
use crate::errors::{DomainError, DomainResult};

pub trait TextExtractor: Send + Sync {
    fn supports(&self, extension: &str) -> bool;
    fn extract_text(&self, data: &[u8]) -> DomainResult<String>;
}

pub struct CsvTextExtractor;

impl TextExtractor for CsvTextExtractor {
    fn supports(&self, extension: &str) -> bool {
        extension.eq_ignore_ascii_case("csv")
    }

    fn extract_text(&self, data: &[u8]) -> DomainResult<String> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(data);

        let mut out = String::new();
        for record in reader.records() {
            let record = record.map_err(|e| DomainError::Internal(format!("csv: {}", e)))?;
            let line = record
                .iter()
                .map(|cell| cell.trim())
                .collect::<Vec<_>>()
                .join(" ");
            if !line.trim().is_empty() {
                out.push_str(&line);
                out.push('\n');
            }
        }
        Ok(out)
    }
}

pub struct DocxTextExtractor;

impl TextExtractor for DocxTextExtractor {
    fn supports(&self, extension: &str) -> bool {
        extension.eq_ignore_ascii_case("docx")
    }

    fn extract_text(&self, data: &[u8]) -> DomainResult<String> {
        Ok(read_docx(data)?.plain_text())
    }
}

/// JSON templates carry their text under one of a few conventional keys;
/// anything else falls back to the raw JSON string.
pub struct JsonTextExtractor;

const JSON_TEXT_KEYS: [&str; 4] = ["text", "template", "body", "content"];

impl TextExtractor for JsonTextExtractor {
    fn supports(&self, extension: &str) -> bool {
        extension.eq_ignore_ascii_case("json")
    }

    fn extract_text(&self, data: &[u8]) -> DomainResult<String> {
        let raw = String::from_utf8_lossy(data).into_owned();
        let value: serde_json::Value = serde_json::from_str(&raw)
            .map_err(|e| DomainError::Internal(format!("json: {}", e)))?;

        for key in JSON_TEXT_KEYS {
            if let Some(text) = value.get(key).and_then(|v| v.as_str()) {
                if !text.trim().is_empty() {
                    return Ok(text.to_string());
                }
            }
        }
        Ok(raw)
    }
}

pub struct TxtTextExtractor;

impl TextExtractor for TxtTextExtractor {
    fn supports(&self, extension: &str) -> bool {
        extension.eq_ignore_ascii_case("txt")
    }

    fn extract_text(&self, data: &[u8]) -> DomainResult<String> {
        Ok(String::from_utf8_lossy(data).into_owned())
    }
}

/// Ordered list of extractors; first `supports` match wins.
pub struct ExtractorRegistry {
    extractors: Vec<Box<dyn TextExtractor>>,
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self {
            extractors: vec![
                Box::new(CsvTextExtractor),
                Box::new(DocxTextExtractor),
                Box::new(JsonTextExtractor),
                Box::new(TxtTextExtractor),
            ],
        }
    }
}

impl ExtractorRegistry {
    pub fn extract(&self, extension: &str, data: &[u8]) -> DomainResult<String> {
        let extractor = self
            .extractors
            .iter()
            .find(|e| e.supports(extension))
            .ok_or_else(|| DomainError::UnsupportedFormat(extension.to_string()))?;
        extractor.extract_text(data)
    }
}
