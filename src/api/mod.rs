//! REST API seam.
//!
//! Every screen controller talks to the backend through [`TaxApi`].
//! [`HttpTaxApi`] is the reqwest implementation; [`MockTaxApi`] keeps the same
//! contract in memory for tests and offline demos.

pub mod client;
pub mod error;
pub mod mock;
pub mod types;

pub use client::HttpTaxApi;
pub use error::ApiError;
pub use mock::{MockFailure, MockTaxApi};
pub use types::*;

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{
    ActivityEntry, ChatMessage, ChatSession, DashboardAlert, DashboardMetrics, Document,
    ExtractionResult, FieldMap, SessionKind, TaxForm,
};

#[async_trait]
pub trait TaxApi: Send + Sync {
    // Documents
    async fn upload_document(&self, file: &UploadFile) -> Result<UploadReceipt, ApiError>;
    async fn list_documents(&self) -> Result<Vec<Document>, ApiError>;
    async fn get_document(&self, id: Uuid) -> Result<Document, ApiError>;
    async fn reprocess_document(&self, id: Uuid) -> Result<UploadReceipt, ApiError>;
    async fn archive_document(&self, id: Uuid) -> Result<(), ApiError>;
    async fn delete_document(&self, id: Uuid) -> Result<(), ApiError>;

    // Extraction
    async fn get_extraction(&self, document_id: Uuid) -> Result<ExtractionResult, ApiError>;
    async fn put_extraction(
        &self,
        document_id: Uuid,
        fields: &FieldMap,
    ) -> Result<ExtractionResult, ApiError>;

    // Chat sessions and messages
    async fn list_sessions(&self, kind: SessionKind) -> Result<Vec<ChatSession>, ApiError>;
    async fn create_session(&self, session: &NewSession) -> Result<ChatSession, ApiError>;
    async fn list_messages(&self, session_id: Uuid) -> Result<Vec<ChatMessage>, ApiError>;
    async fn send_message(
        &self,
        session_id: Uuid,
        message: &NewMessage,
    ) -> Result<SentMessage, ApiError>;
    async fn update_message(
        &self,
        session_id: Uuid,
        message_id: Uuid,
        update: &MessageUpdate,
    ) -> Result<ChatMessage, ApiError>;
    async fn invoke_agent(
        &self,
        kind: SessionKind,
        session_id: Uuid,
        request: &AgentRequest,
    ) -> Result<ChatMessage, ApiError>;

    // Forms
    async fn list_forms(&self) -> Result<Vec<TaxForm>, ApiError>;
    async fn batch_forms(&self, request: &BatchRequest) -> Result<BatchOutcome, ApiError>;

    // Dashboard
    async fn dashboard_metrics(&self) -> Result<DashboardMetrics, ApiError>;
    async fn dashboard_activity(&self) -> Result<Vec<ActivityEntry>, ApiError>;
    async fn dashboard_alerts(&self) -> Result<Vec<DashboardAlert>, ApiError>;
}
