use std::borrow::Cow;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{MessageRole, SessionKind};
use crate::search::Searchable;

/// Facet key for [`ChatMessage::role`].
pub const FACET_ROLE: &str = "role";
/// Facet key for the message's tax topic.
pub const FACET_TAX_TOPIC: &str = "tax_topic";
/// Flag key for bookmarked messages.
pub const FLAG_BOOKMARKED: &str = "bookmarked";
/// Flag key for messages that reference at least one form.
pub const FLAG_HAS_FORM_REFERENCES: &str = "has_form_references";
/// Flag key for messages carrying attachments.
pub const FLAG_HAS_ATTACHMENTS: &str = "has_attachments";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: Uuid,
    pub kind: SessionKind,
    pub title: String,
    #[serde(default)]
    pub client_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: MessageMetadata,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageMetadata {
    #[serde(default)]
    pub tax_topic: Option<String>,
    #[serde(default)]
    pub confidence: Option<f32>,
    #[serde(default)]
    pub bookmarked: bool,
    #[serde(default)]
    pub form_references: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    #[serde(default)]
    pub document_id: Option<Uuid>,
}

impl Searchable for ChatMessage {
    fn id(&self) -> String {
        self.id.to_string()
    }

    fn search_text(&self) -> Vec<&str> {
        let mut text = vec![self.content.as_str()];
        if let Some(ref topic) = self.metadata.tax_topic {
            text.push(topic);
        }
        text.extend(self.metadata.form_references.iter().map(String::as_str));
        text.extend(self.attachments.iter().map(|a| a.filename.as_str()));
        text
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn is_bookmarked(&self) -> bool {
        self.metadata.bookmarked
    }

    fn facet(&self, key: &str) -> Option<Cow<'_, str>> {
        match key {
            FACET_ROLE => Some(Cow::Borrowed(self.role.as_str())),
            FACET_TAX_TOPIC => self.metadata.tax_topic.as_deref().map(Cow::Borrowed),
            _ => None,
        }
    }

    fn flag(&self, key: &str) -> Option<bool> {
        match key {
            FLAG_BOOKMARKED => Some(self.metadata.bookmarked),
            FLAG_HAS_FORM_REFERENCES => Some(!self.metadata.form_references.is_empty()),
            FLAG_HAS_ATTACHMENTS => Some(!self.attachments.is_empty()),
            _ => None,
        }
    }
}
