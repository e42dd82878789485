//! In-memory [`TaxApi`] with scriptable failures.
//!
//! Used by the controller tests and for offline demos. Server-side processing
//! is simulated by calling [`MockTaxApi::set_document_status`] directly.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::error::ApiError;
use super::types::*;
use super::TaxApi;
use crate::models::{
    ActivityEntry, ChatMessage, ChatSession, DashboardAlert, DashboardMetrics, Document,
    DocumentStatus, ExtractionResult, FieldMap, MessageMetadata, MessageRole, SessionKind,
    TaxForm,
};

/// A failure injected into the next call of one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockFailure {
    Network,
    Status(u16),
    Rejected(String),
}

impl MockFailure {
    fn into_error(self) -> ApiError {
        match self {
            Self::Network => ApiError::Connection("mock://api".into()),
            Self::Status(status) => ApiError::Status {
                status,
                body: "mock failure".into(),
            },
            Self::Rejected(message) => ApiError::Rejected(message),
        }
    }
}

#[derive(Default)]
struct MockState {
    documents: Vec<Document>,
    extractions: HashMap<Uuid, ExtractionResult>,
    sessions: Vec<ChatSession>,
    messages: HashMap<Uuid, Vec<ChatMessage>>,
    forms: Vec<TaxForm>,
    locked_forms: Vec<Uuid>,
    metrics: DashboardMetrics,
    activity: Vec<ActivityEntry>,
    alerts: Vec<DashboardAlert>,
    failures: HashMap<&'static str, VecDeque<MockFailure>>,
    receipt_status: Option<DocumentStatus>,
    calls: Vec<&'static str>,
}

#[derive(Default)]
pub struct MockTaxApi {
    state: Mutex<MockState>,
}

impl MockTaxApi {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Record the call and pop an injected failure, if one is queued.
    fn enter(&self, op: &'static str) -> Result<MutexGuard<'_, MockState>, ApiError> {
        let mut state = self.lock();
        state.calls.push(op);
        if let Some(failure) = state.failures.get_mut(op).and_then(VecDeque::pop_front) {
            return Err(failure.into_error());
        }
        Ok(state)
    }

    /// Make the next call to `op` (a [`TaxApi`] method name) fail.
    pub fn fail_next(&self, op: &'static str, failure: MockFailure) {
        self.lock()
            .failures
            .entry(op)
            .or_default()
            .push_back(failure);
    }

    /// Every call made so far, by method name.
    pub fn calls(&self) -> Vec<&'static str> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self, op: &str) -> usize {
        self.lock().calls.iter().filter(|c| **c == op).count()
    }

    pub fn with_documents(self, documents: Vec<Document>) -> Self {
        self.lock().documents = documents;
        self
    }

    pub fn with_extraction(self, result: ExtractionResult) -> Self {
        self.lock().extractions.insert(result.document_id, result);
        self
    }

    pub fn with_forms(self, forms: Vec<TaxForm>) -> Self {
        self.lock().forms = forms;
        self
    }

    pub fn with_messages(self, session_id: Uuid, messages: Vec<ChatMessage>) -> Self {
        self.lock().messages.insert(session_id, messages);
        self
    }

    pub fn with_dashboard(
        self,
        metrics: DashboardMetrics,
        activity: Vec<ActivityEntry>,
        alerts: Vec<DashboardAlert>,
    ) -> Self {
        {
            let mut state = self.lock();
            state.metrics = metrics;
            state.activity = activity;
            state.alerts = alerts;
        }
        self
    }

    /// Batch operations on this form report it as failed.
    pub fn lock_form(&self, id: Uuid) {
        self.lock().locked_forms.push(id);
    }

    /// Simulate server-side processing progress.
    pub fn set_document_status(&self, id: Uuid, status: DocumentStatus, error: Option<&str>) {
        let mut state = self.lock();
        if let Some(doc) = state.documents.iter_mut().find(|d| d.id == id) {
            doc.status = status;
            doc.error_message = error.map(str::to_string);
        }
    }

    /// Upload and reprocess requests answer with `status` instead of
    /// accepting the document for background processing.
    pub fn answer_uploads_with(&self, status: DocumentStatus) {
        self.lock().receipt_status = Some(status);
    }

    pub fn set_extraction(&self, result: ExtractionResult) {
        self.lock().extractions.insert(result.document_id, result);
    }

    pub fn document(&self, id: Uuid) -> Option<Document> {
        self.lock().documents.iter().find(|d| d.id == id).cloned()
    }

    pub fn documents(&self) -> Vec<Document> {
        self.lock().documents.clone()
    }

    pub fn stored_messages(&self, session_id: Uuid) -> Vec<ChatMessage> {
        self.lock()
            .messages
            .get(&session_id)
            .cloned()
            .unwrap_or_default()
    }

    fn not_found(what: &str, id: Uuid) -> ApiError {
        ApiError::Status {
            status: 404,
            body: format!("{what} {id} not found"),
        }
    }
}

fn assistant_message(content: String) -> ChatMessage {
    ChatMessage {
        id: Uuid::new_v4(),
        role: MessageRole::Assistant,
        content,
        timestamp: Utc::now(),
        metadata: MessageMetadata::default(),
        attachments: vec![],
    }
}

#[async_trait]
impl TaxApi for MockTaxApi {
    async fn upload_document(&self, file: &UploadFile) -> Result<UploadReceipt, ApiError> {
        let mut state = self.enter("upload_document")?;
        let id = Uuid::new_v4();
        let status = state.receipt_status.unwrap_or(DocumentStatus::Pending);
        let file_type = std::path::Path::new(&file.filename)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("bin")
            .to_lowercase();
        state.documents.push(Document {
            id,
            filename: file.filename.clone(),
            file_type,
            file_size: file.size(),
            status,
            document_type: None,
            extraction_confidence: None,
            error_message: None,
            created_at: Utc::now(),
            client_id: None,
        });
        Ok(UploadReceipt {
            document_id: id,
            status,
        })
    }

    async fn list_documents(&self) -> Result<Vec<Document>, ApiError> {
        let state = self.enter("list_documents")?;
        Ok(state.documents.clone())
    }

    async fn get_document(&self, id: Uuid) -> Result<Document, ApiError> {
        let state = self.enter("get_document")?;
        state
            .documents
            .iter()
            .find(|d| d.id == id)
            .cloned()
            .ok_or_else(|| Self::not_found("document", id))
    }

    async fn reprocess_document(&self, id: Uuid) -> Result<UploadReceipt, ApiError> {
        let mut state = self.enter("reprocess_document")?;
        let status = state.receipt_status.unwrap_or(DocumentStatus::Processing);
        let doc = state
            .documents
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| Self::not_found("document", id))?;
        doc.status = status;
        doc.error_message = None;
        Ok(UploadReceipt {
            document_id: id,
            status,
        })
    }

    async fn archive_document(&self, id: Uuid) -> Result<(), ApiError> {
        let mut state = self.enter("archive_document")?;
        let doc = state
            .documents
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| Self::not_found("document", id))?;
        doc.status = DocumentStatus::Archived;
        Ok(())
    }

    async fn delete_document(&self, id: Uuid) -> Result<(), ApiError> {
        let mut state = self.enter("delete_document")?;
        let before = state.documents.len();
        state.documents.retain(|d| d.id != id);
        if state.documents.len() == before {
            return Err(Self::not_found("document", id));
        }
        state.extractions.remove(&id);
        Ok(())
    }

    async fn get_extraction(&self, document_id: Uuid) -> Result<ExtractionResult, ApiError> {
        let state = self.enter("get_extraction")?;
        state
            .extractions
            .get(&document_id)
            .cloned()
            .ok_or_else(|| Self::not_found("extraction", document_id))
    }

    async fn put_extraction(
        &self,
        document_id: Uuid,
        fields: &FieldMap,
    ) -> Result<ExtractionResult, ApiError> {
        let mut state = self.enter("put_extraction")?;
        let result = state
            .extractions
            .get_mut(&document_id)
            .ok_or_else(|| Self::not_found("extraction", document_id))?;
        result.fields = fields.clone();
        Ok(result.clone())
    }

    async fn list_sessions(&self, kind: SessionKind) -> Result<Vec<ChatSession>, ApiError> {
        let state = self.enter("list_sessions")?;
        Ok(state
            .sessions
            .iter()
            .filter(|s| s.kind == kind)
            .cloned()
            .collect())
    }

    async fn create_session(&self, session: &NewSession) -> Result<ChatSession, ApiError> {
        let mut state = self.enter("create_session")?;
        let now = Utc::now();
        let created = ChatSession {
            id: Uuid::new_v4(),
            kind: session.kind,
            title: session.title.clone(),
            client_id: session.client_id,
            created_at: now,
            updated_at: now,
        };
        state.sessions.push(created.clone());
        Ok(created)
    }

    async fn list_messages(&self, session_id: Uuid) -> Result<Vec<ChatMessage>, ApiError> {
        let state = self.enter("list_messages")?;
        Ok(state.messages.get(&session_id).cloned().unwrap_or_default())
    }

    async fn send_message(
        &self,
        session_id: Uuid,
        message: &NewMessage,
    ) -> Result<SentMessage, ApiError> {
        let mut state = self.enter("send_message")?;
        let stored = ChatMessage {
            id: Uuid::new_v4(),
            role: MessageRole::User,
            content: message.content.clone(),
            timestamp: Utc::now(),
            metadata: MessageMetadata::default(),
            attachments: vec![],
        };
        let reply = assistant_message(format!("Received: {}", message.content));
        let thread = state.messages.entry(session_id).or_default();
        thread.push(stored.clone());
        thread.push(reply.clone());
        Ok(SentMessage {
            message: stored,
            reply: Some(reply),
        })
    }

    async fn update_message(
        &self,
        session_id: Uuid,
        message_id: Uuid,
        update: &MessageUpdate,
    ) -> Result<ChatMessage, ApiError> {
        let mut state = self.enter("update_message")?;
        let message = state
            .messages
            .get_mut(&session_id)
            .and_then(|thread| thread.iter_mut().find(|m| m.id == message_id))
            .ok_or_else(|| Self::not_found("message", message_id))?;
        if let Some(ref content) = update.content {
            message.content = content.clone();
        }
        if let Some(bookmarked) = update.bookmarked {
            message.metadata.bookmarked = bookmarked;
        }
        Ok(message.clone())
    }

    async fn invoke_agent(
        &self,
        kind: SessionKind,
        session_id: Uuid,
        request: &AgentRequest,
    ) -> Result<ChatMessage, ApiError> {
        let mut state = self.enter("invoke_agent")?;
        let prompt = ChatMessage {
            id: Uuid::new_v4(),
            role: MessageRole::User,
            content: request.prompt.clone(),
            timestamp: Utc::now(),
            metadata: MessageMetadata::default(),
            attachments: vec![],
        };
        let reply = assistant_message(format!("[{}] {}", kind.as_str(), request.prompt));
        let history = state.messages.entry(session_id).or_default();
        history.push(prompt);
        history.push(reply.clone());
        Ok(reply)
    }

    async fn list_forms(&self) -> Result<Vec<TaxForm>, ApiError> {
        let state = self.enter("list_forms")?;
        Ok(state.forms.clone())
    }

    async fn batch_forms(&self, request: &BatchRequest) -> Result<BatchOutcome, ApiError> {
        let mut state = self.enter("batch_forms")?;
        let mut outcome = BatchOutcome::default();
        for id in &request.form_ids {
            if state.locked_forms.contains(id) || !state.forms.iter().any(|f| f.id == *id) {
                outcome.failed.push(*id);
                continue;
            }
            match request.operation {
                BatchOperation::SetStatus(status) => {
                    if let Some(form) = state.forms.iter_mut().find(|f| f.id == *id) {
                        form.status = status;
                        form.updated_at = Utc::now();
                    }
                }
                BatchOperation::Archive | BatchOperation::Delete => {
                    state.forms.retain(|f| f.id != *id);
                }
                BatchOperation::Duplicate => {
                    if let Some(original) = state.forms.iter().find(|f| f.id == *id).cloned() {
                        state.forms.push(TaxForm {
                            id: Uuid::new_v4(),
                            name: format!("{} (copy)", original.name),
                            updated_at: Utc::now(),
                            ..original
                        });
                    }
                }
            }
            outcome.succeeded.push(*id);
        }
        Ok(outcome)
    }

    async fn dashboard_metrics(&self) -> Result<DashboardMetrics, ApiError> {
        let state = self.enter("dashboard_metrics")?;
        Ok(state.metrics.clone())
    }

    async fn dashboard_activity(&self) -> Result<Vec<ActivityEntry>, ApiError> {
        let state = self.enter("dashboard_activity")?;
        Ok(state.activity.clone())
    }

    async fn dashboard_alerts(&self) -> Result<Vec<DashboardAlert>, ApiError> {
        let state = self.enter("dashboard_alerts")?;
        Ok(state.alerts.clone())
    }
}
