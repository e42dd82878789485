//! Extraction review: side-by-side correction of extracted fields.
//!
//! [`ReviewEditor`] keeps the server snapshot of an [`ExtractionResult`] next
//! to a local working copy. Inline edits only ever touch a field's `value`;
//! confidence, type and label stay as the extractor reported them. Saving
//! sends the whole field map in one request.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::Serialize;
use uuid::Uuid;

use crate::api::TaxApi;
use crate::error::{InputError, WorkflowError};
use crate::models::{ExtractionResult, FieldMap, FieldType, Severity, ValidationIssue};
use crate::notify::{Notification, NotificationSink};

/// Confidence threshold below which fields are flagged.
pub const CONFIDENCE_THRESHOLD: f32 = 0.70;

/// Maximum characters in a corrected value.
pub const MAX_FIELD_LENGTH: usize = 500;

static SSN_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{3}-?\d{2}-?\d{4}$").unwrap());
static EIN_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{2}-?\d{7}$").unwrap());
static NUMBER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-?\d+(\.\d+)?$").unwrap());
// 1234.56, $1,234.56, -$80
static CURRENCY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^-?\$?(\d{1,3}(,\d{3})+|\d+)(\.\d{1,2})?$").unwrap()
});
static PERCENTAGE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-?\d+(\.\d+)?\s?%?$").unwrap());

const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%m/%d/%Y"];
const CHECKBOX_VALUES: [&str; 5] = ["true", "false", "yes", "no", "x"];

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One row of the review table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldView {
    pub name: String,
    pub label: String,
    pub value: String,
    pub original_value: String,
    pub confidence: f32,
    pub field_type: FieldType,
    pub is_flagged: bool,
    pub is_edited: bool,
    pub issues: Vec<ValidationIssue>,
}

/// A field correction against the server snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldCorrection {
    pub field: String,
    pub original_value: String,
    pub corrected_value: String,
}

/// The open inline editor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InlineEdit {
    pub field: String,
    pub draft: String,
    /// Why the last commit was refused.
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Check a corrected value for `field_type` and return it trimmed.
///
/// An empty value is accepted for every type and clears the field.
pub fn validate_value(field_type: FieldType, value: &str) -> Result<String, String> {
    let value = value.trim();

    if value.chars().count() > MAX_FIELD_LENGTH {
        return Err(format!("must be at most {MAX_FIELD_LENGTH} characters"));
    }
    if value.chars().any(char::is_control) {
        return Err("must not contain control characters".to_string());
    }
    if value.is_empty() {
        return Ok(String::new());
    }

    let ok = match field_type {
        FieldType::Text => true,
        FieldType::Number => NUMBER_PATTERN.is_match(value),
        FieldType::Currency => CURRENCY_PATTERN.is_match(value),
        FieldType::Percentage => PERCENTAGE_PATTERN.is_match(value),
        FieldType::Date => DATE_FORMATS
            .iter()
            .any(|fmt| NaiveDate::parse_from_str(value, fmt).is_ok()),
        FieldType::Ssn => SSN_PATTERN.is_match(value),
        FieldType::Ein => EIN_PATTERN.is_match(value),
        FieldType::Checkbox => CHECKBOX_VALUES
            .iter()
            .any(|v| v.eq_ignore_ascii_case(value)),
    };

    if ok {
        Ok(value.to_string())
    } else {
        Err(format!("not a valid {}", field_type.as_str()))
    }
}

// ---------------------------------------------------------------------------
// Editor
// ---------------------------------------------------------------------------

pub struct ReviewEditor {
    snapshot: ExtractionResult,
    working: FieldMap,
    editing: Option<InlineEdit>,
}

impl ReviewEditor {
    pub fn new(result: ExtractionResult) -> Self {
        let working = result.fields.clone();
        Self {
            snapshot: result,
            working,
            editing: None,
        }
    }

    /// Fetch the extraction for `document_id` and open it for review.
    pub async fn load(api: &dyn TaxApi, document_id: Uuid) -> Result<Self, WorkflowError> {
        let result = api.get_extraction(document_id).await?;
        tracing::debug!(
            document_id = %document_id,
            fields = result.fields.len(),
            "Extraction loaded for review"
        );
        Ok(Self::new(result))
    }

    pub fn document_id(&self) -> Uuid {
        self.snapshot.document_id
    }

    pub fn form_type(&self) -> &str {
        &self.snapshot.form_type
    }

    pub fn snapshot(&self) -> &ExtractionResult {
        &self.snapshot
    }

    pub fn is_dirty(&self) -> bool {
        self.working != self.snapshot.fields
    }

    pub fn editing(&self) -> Option<&InlineEdit> {
        self.editing.as_ref()
    }

    /// Rows in field-name order, with the working value and its issues.
    pub fn fields(&self) -> Vec<FieldView> {
        self.working
            .iter()
            .map(|(name, field)| {
                let original = self
                    .snapshot
                    .fields
                    .get(name)
                    .map(|f| f.value.clone())
                    .unwrap_or_default();
                FieldView {
                    name: name.clone(),
                    label: field.label.clone(),
                    is_edited: field.value != original,
                    value: field.value.clone(),
                    original_value: original,
                    confidence: field.confidence,
                    field_type: field.field_type,
                    is_flagged: field.confidence < CONFIDENCE_THRESHOLD,
                    issues: self.issues_for(name).into_iter().cloned().collect(),
                }
            })
            .collect()
    }

    /// Open the inline editor on `field`, replacing any editor already open.
    pub fn begin_edit(&mut self, field: &str) -> Result<&InlineEdit, InputError> {
        let current = self
            .working
            .get(field)
            .ok_or_else(|| InputError::UnknownField(field.to_string()))?;
        if let Some(previous) = self.editing.as_ref() {
            tracing::debug!(field = %previous.field, "Abandoning open edit");
        }
        let edit = self.editing.insert(InlineEdit {
            field: field.to_string(),
            draft: current.value.clone(),
            error: None,
        });
        Ok(&*edit)
    }

    pub fn set_draft(&mut self, text: impl Into<String>) -> Result<(), InputError> {
        let edit = self.editing.as_mut().ok_or(InputError::NoActiveEdit)?;
        edit.draft = text.into();
        edit.error = None;
        Ok(())
    }

    pub fn cancel_edit(&mut self) -> Option<InlineEdit> {
        self.editing.take()
    }

    /// Validate the draft and write it into the working copy.
    ///
    /// On a validation error the editor stays open with the reason set.
    pub fn commit_edit(&mut self) -> Result<(), InputError> {
        let edit = self.editing.as_mut().ok_or(InputError::NoActiveEdit)?;
        let field = self
            .working
            .get_mut(&edit.field)
            .ok_or_else(|| InputError::UnknownField(edit.field.clone()))?;

        match validate_value(field.field_type, &edit.draft) {
            Ok(value) => {
                field.value = value;
                tracing::debug!(field = %edit.field, "Field corrected");
                self.editing = None;
                Ok(())
            }
            Err(reason) => {
                edit.error = Some(reason.clone());
                Err(InputError::InvalidFieldValue {
                    field: edit.field.clone(),
                    reason,
                })
            }
        }
    }

    /// Restore one field to the snapshot value. Returns whether it had changed.
    pub fn revert_field(&mut self, field: &str) -> Result<bool, InputError> {
        let original = self
            .snapshot
            .fields
            .get(field)
            .ok_or_else(|| InputError::UnknownField(field.to_string()))?;
        let Some(current) = self.working.get_mut(field) else {
            return Err(InputError::UnknownField(field.to_string()));
        };
        let changed = current.value != original.value;
        current.value = original.value.clone();
        if self.editing.as_ref().is_some_and(|e| e.field == field) {
            self.editing = None;
        }
        Ok(changed)
    }

    pub fn discard_changes(&mut self) {
        self.working = self.snapshot.fields.clone();
        self.editing = None;
    }

    pub fn corrections(&self) -> Vec<FieldCorrection> {
        self.working
            .iter()
            .filter_map(|(name, field)| {
                let original = self.snapshot.fields.get(name)?;
                (original.value != field.value).then(|| FieldCorrection {
                    field: name.clone(),
                    original_value: original.value.clone(),
                    corrected_value: field.value.clone(),
                })
            })
            .collect()
    }

    /// Send the working copy in one request. Returns the number of corrected
    /// fields saved; 0 without a request when nothing changed.
    ///
    /// On failure the local edits are kept so the user can try again.
    pub async fn save_corrections(
        &mut self,
        api: &dyn TaxApi,
        notifier: &dyn NotificationSink,
    ) -> Result<usize, WorkflowError> {
        let corrected = self.corrections().len();
        if corrected == 0 {
            return Ok(0);
        }

        match api.put_extraction(self.document_id(), &self.working).await {
            Ok(result) => {
                tracing::info!(
                    document_id = %self.document_id(),
                    corrected,
                    "Corrections saved"
                );
                self.working = result.fields.clone();
                self.snapshot = result;
                notifier.notify(Notification::success(
                    "Corrections saved",
                    format!("{corrected} field(s) updated"),
                ));
                Ok(corrected)
            }
            Err(e) => {
                let err = WorkflowError::from(e);
                notifier.notify(Notification::failure("Could not save corrections", &err));
                Err(err)
            }
        }
    }

    // --- validation overlay ---

    pub fn issues_for(&self, field: &str) -> Vec<&ValidationIssue> {
        self.snapshot
            .validation_errors
            .iter()
            .filter(|issue| issue.field == field)
            .collect()
    }

    pub fn highest_severity(&self, field: &str) -> Option<Severity> {
        self.issues_for(field).into_iter().map(|i| i.severity).max()
    }

    /// Issues whose field is not in the extraction (form-level findings).
    pub fn unattached_issues(&self) -> Vec<&ValidationIssue> {
        self.snapshot
            .validation_errors
            .iter()
            .filter(|issue| !self.snapshot.fields.contains_key(&issue.field))
            .collect()
    }

    pub fn flagged_count(&self) -> usize {
        self.working
            .values()
            .filter(|f| f.confidence < CONFIDENCE_THRESHOLD)
            .count()
    }
}
