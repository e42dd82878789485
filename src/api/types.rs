//! Request and response bodies exchanged with the REST API.

use std::path::Path;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{ChatMessage, DocumentStatus, FieldMap, FormStatus, SessionKind};

/// A file selected for upload, held in memory until the server acknowledges it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    /// Content type guessed from the filename extension.
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        let filename = filename.into();
        let content_type = mime_guess::from_path(&filename)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        Self {
            filename,
            content_type,
            bytes,
        }
    }

    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload")
            .to_string();
        Ok(Self::new(filename, bytes))
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Server acknowledgment of an upload or a reprocess request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadReceipt {
    pub document_id: Uuid,
    pub status: DocumentStatus,
}

/// Generic `{success, message}` body returned by mutating endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResponse {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionUpdate {
    pub fields: FieldMap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSession {
    pub kind: SessionKind,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMessage {
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachment_ids: Vec<Uuid>,
}

/// Stored copy of the sent message plus the assistant's reply, if any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentMessage {
    pub message: ChatMessage,
    #[serde(default)]
    pub reply: Option<ChatMessage>,
}

/// Partial message update; absent fields are left unchanged server-side.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bookmarked: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRequest {
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "status", rename_all = "snake_case")]
pub enum BatchOperation {
    SetStatus(FormStatus),
    Archive,
    Delete,
    Duplicate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRequest {
    pub operation: BatchOperation,
    pub form_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchOutcome {
    #[serde(default)]
    pub succeeded: Vec<Uuid>,
    #[serde(default)]
    pub failed: Vec<Uuid>,
    #[serde(default)]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_file_guesses_content_type() {
        assert_eq!(UploadFile::new("w2.pdf", vec![1]).content_type, "application/pdf");
        assert_eq!(UploadFile::new("scan.PNG", vec![1]).content_type, "image/png");
        assert_eq!(
            UploadFile::new("noext", vec![1]).content_type,
            "application/octet-stream"
        );
    }

    #[test]
    fn upload_file_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("1099-int.pdf");
        std::fs::write(&path, b"%PDF-1.7 test").unwrap();
        let file = UploadFile::from_path(&path).unwrap();
        assert_eq!(file.filename, "1099-int.pdf");
        assert_eq!(file.size(), 13);
    }

    #[test]
    fn batch_operation_wire_shape() {
        let json = serde_json::to_value(BatchOperation::SetStatus(FormStatus::Review)).unwrap();
        assert_eq!(json, serde_json::json!({"type": "set_status", "status": "review"}));
        let json = serde_json::to_value(BatchOperation::Archive).unwrap();
        assert_eq!(json, serde_json::json!({"type": "archive"}));
    }

    #[test]
    fn message_update_omits_absent_fields() {
        let update = MessageUpdate {
            bookmarked: Some(true),
            ..Default::default()
        };
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json, serde_json::json!({"bookmarked": true}));
    }
}
