use std::borrow::Cow;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::DocumentStatus;
use crate::search::Searchable;

/// Facet key for [`Document::status`].
pub const FACET_STATUS: &str = "status";
/// Facet key for the server's document classification.
pub const FACET_DOCUMENT_TYPE: &str = "document_type";
/// Facet key for the uploaded file type (`pdf`, `png`, ...).
pub const FACET_FILE_TYPE: &str = "file_type";
/// Flag key: extraction confidence is known and below the review threshold.
pub const FLAG_NEEDS_REVIEW: &str = "needs_review";
/// Flag key: the server reported an error message.
pub const FLAG_HAS_ERROR: &str = "has_error";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub filename: String,
    pub file_type: String,
    pub file_size: u64,
    pub status: DocumentStatus,
    #[serde(default)]
    pub document_type: Option<String>,
    #[serde(default)]
    pub extraction_confidence: Option<f32>,
    #[serde(default)]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub client_id: Option<Uuid>,
}

impl Document {
    pub fn needs_review(&self) -> bool {
        self.extraction_confidence
            .is_some_and(|c| c < crate::review::CONFIDENCE_THRESHOLD)
    }
}

impl Searchable for Document {
    fn id(&self) -> String {
        self.id.to_string()
    }

    fn search_text(&self) -> Vec<&str> {
        let mut text = vec![self.filename.as_str()];
        if let Some(ref kind) = self.document_type {
            text.push(kind);
        }
        if let Some(ref err) = self.error_message {
            text.push(err);
        }
        text
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn facet(&self, key: &str) -> Option<Cow<'_, str>> {
        match key {
            FACET_STATUS => Some(Cow::Borrowed(self.status.as_str())),
            FACET_DOCUMENT_TYPE => self.document_type.as_deref().map(Cow::Borrowed),
            FACET_FILE_TYPE => Some(Cow::Borrowed(self.file_type.as_str())),
            _ => None,
        }
    }

    fn flag(&self, key: &str) -> Option<bool> {
        match key {
            FLAG_NEEDS_REVIEW => Some(self.needs_review()),
            FLAG_HAS_ERROR => Some(self.error_message.is_some()),
            _ => None,
        }
    }
}
