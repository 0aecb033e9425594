use std::collections::HashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{DomainResult, ValidationError};

/// How a discovered field is rendered into the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SubstitutionStyle {
    /// Placeholder text is replaced in place by the bound value.
    Replace,
    /// The field is a label; its value is appended after a trailing colon
    /// construct instead of replacing the label text.
    Right,
}

/// One placeholder discovered in a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub style: SubstitutionStyle,
    pub required: bool,
}

impl Field {
    pub fn new(name: impl Into<String>, style: SubstitutionStyle) -> Self {
        Self {
            name: name.into(),
            style,
            required: false,
        }
    }
}

/// An uploaded template: ordered fields plus a reference to the stored bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub id: Uuid,
    pub name: String,
    /// Relative path of the stored template file.
    pub file_path: String,
    /// SHA-256 of the uploaded bytes; identical uploads share one stored file.
    pub content_hash: String,
    pub fields: Vec<Field>,
}

impl Template {
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Extension of the stored file, lowercased.
    pub fn extension(&self) -> String {
        self.file_path
            .rsplit('.')
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase()
    }
}

/// A value bound to one field of a document instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValueBinding {
    pub field_name: String,
    pub value: Option<String>,
}

/// Field name -> (style, value) map consumed by instantiation and export.
pub type ReplacementMap = HashMap<String, (SubstitutionStyle, Option<String>)>;

/// Checks a document instance's bindings against its template: bindings naming
/// unknown fields are rejected, and every required field must carry a value.
pub fn validate_bindings(template: &Template, bindings: &[ValueBinding]) -> DomainResult<()> {
    for binding in bindings {
        if template.field(&binding.field_name).is_none() {
            return Err(ValidationError::unknown_field(&binding.field_name).into());
        }
    }
    for field in template.fields.iter().filter(|f| f.required) {
        let bound = bindings
            .iter()
            .any(|b| b.field_name == field.name && b.value.is_some());
        if !bound {
            return Err(ValidationError::required(&field.name).into());
        }
    }
    Ok(())
}

/// Joins bound values against the template's fields. Bindings without a
/// matching field are dropped; fields without a binding are absent from the
/// map (instantiation leaves their tokens untouched).
pub fn build_replacements(template: &Template, bindings: &[ValueBinding]) -> ReplacementMap {
    let mut map = ReplacementMap::new();
    for field in &template.fields {
        if let Some(binding) = bindings.iter().find(|b| b.field_name == field.name) {
            map.insert(field.name.clone(), (field.style, binding.value.clone()));
        }
    }
    map
}
