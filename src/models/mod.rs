pub mod chat;
pub mod dashboard;
pub mod document;
pub mod enums;
pub mod extraction;
pub mod forms;

pub use chat::{Attachment, ChatMessage, ChatSession, MessageMetadata};
pub use dashboard::{ActivityEntry, DashboardAlert, DashboardMetrics};
pub use document::Document;
pub use enums::*;
pub use extraction::{ExtractedFieldValue, ExtractionResult, FieldMap, ValidationIssue};
pub use forms::TaxForm;
