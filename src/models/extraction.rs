use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{FieldType, Severity};

/// Field name → extracted value, ordered by name.
pub type FieldMap = BTreeMap<String, ExtractedFieldValue>;

/// Server-side extraction output for one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub document_id: Uuid,
    pub form_type: String,
    pub confidence: f32,
    pub fields: FieldMap,
    #[serde(default)]
    pub validation_errors: Vec<ValidationIssue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedFieldValue {
    pub value: String,
    pub confidence: f32,
    pub field_type: FieldType,
    pub label: String,
}

/// A server-side validation finding attached to a field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub field: String,
    pub message: String,
    pub severity: Severity,
}
