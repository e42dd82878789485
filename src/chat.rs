//! Chat threads: general, tax-assistant and email-agent conversations.
//!
//! Sending is optimistic. The user's message is appended as `Pending` right
//! away, replaced by the stored copy (plus the assistant reply) when the API
//! answers, or marked `Failed` for an explicit retry. Failed messages are
//! never resent automatically.

use std::borrow::Cow;
use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::api::{AgentRequest, MessageUpdate, NewMessage, NewSession, TaxApi};
use crate::error::{InputError, WorkflowError};
use crate::models::{ChatMessage, ChatSession, MessageMetadata, MessageRole, SessionKind};
use crate::notify::{Notification, NotificationSink};
use crate::search::{apply, FilterState, Searchable};

pub const MAX_MESSAGE_LENGTH: usize = 4000;
pub const TITLE_MAX_CHARS: usize = 50;
pub const DEFAULT_TITLE: &str = "New conversation";

// ═══════════════════════════════════════════
// Title generation
// ═══════════════════════════════════════════

/// Session title from the first user message, cut at 50 characters.
pub fn generate_title(first_message: &str) -> String {
    let trimmed = first_message.trim();
    if trimmed.is_empty() {
        return DEFAULT_TITLE.to_string();
    }

    match trimmed.char_indices().nth(TITLE_MAX_CHARS) {
        Some((cut, _)) => format!("{}...", trimmed[..cut].trim_end()),
        None => trimmed.to_string(),
    }
}

/// Trimmed content, or why it cannot be sent.
pub fn validate_message(content: &str) -> Result<&str, InputError> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(InputError::EmptyMessage);
    }
    let len = trimmed.chars().count();
    if len > MAX_MESSAGE_LENGTH {
        return Err(InputError::MessageTooLong {
            len,
            max: MAX_MESSAGE_LENGTH,
        });
    }
    Ok(trimmed)
}

// ═══════════════════════════════════════════
// Thread messages
// ═══════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LocalMessageState {
    /// Stored by the server.
    Sent,
    /// Sent, waiting for the API.
    Pending,
    /// The send failed; kept locally until retried.
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThreadMessage {
    pub message: ChatMessage,
    pub state: LocalMessageState,
}

impl ThreadMessage {
    fn sent(message: ChatMessage) -> Self {
        Self {
            message,
            state: LocalMessageState::Sent,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.state, LocalMessageState::Failed { .. })
    }
}

impl Searchable for ThreadMessage {
    fn id(&self) -> String {
        self.message.id()
    }

    fn search_text(&self) -> Vec<&str> {
        self.message.search_text()
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.message.timestamp
    }

    fn is_bookmarked(&self) -> bool {
        self.message.is_bookmarked()
    }

    fn facet(&self, key: &str) -> Option<Cow<'_, str>> {
        self.message.facet(key)
    }

    fn flag(&self, key: &str) -> Option<bool> {
        self.message.flag(key)
    }
}

/// Sessions of one kind, most recently active first.
pub async fn recent_sessions(
    api: &dyn TaxApi,
    kind: SessionKind,
) -> Result<Vec<ChatSession>, WorkflowError> {
    let mut sessions = api.list_sessions(kind).await?;
    sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    Ok(sessions)
}

// ═══════════════════════════════════════════
// Thread controller
// ═══════════════════════════════════════════

pub struct ChatThread {
    api: Arc<dyn TaxApi>,
    notifier: Arc<dyn NotificationSink>,
    kind: SessionKind,
    client_id: Option<Uuid>,
    session: Option<ChatSession>,
    messages: Vec<ThreadMessage>,
    /// Local ids of prompts sent to the agent endpoint. They keep the local
    /// id until the next load.
    agent_prompts: HashSet<Uuid>,
}

impl ChatThread {
    /// A thread with no server session yet; the first send creates one
    /// titled after the message.
    pub fn new(
        api: Arc<dyn TaxApi>,
        notifier: Arc<dyn NotificationSink>,
        kind: SessionKind,
        client_id: Option<Uuid>,
    ) -> Self {
        Self {
            api,
            notifier,
            kind,
            client_id,
            session: None,
            messages: Vec::new(),
            agent_prompts: HashSet::new(),
        }
    }

    /// Reopen an existing session. Call [`load`](Self::load) to fetch history.
    pub fn resume(
        api: Arc<dyn TaxApi>,
        notifier: Arc<dyn NotificationSink>,
        session: ChatSession,
    ) -> Self {
        Self {
            api,
            notifier,
            kind: session.kind,
            client_id: session.client_id,
            session: Some(session),
            messages: Vec::new(),
            agent_prompts: HashSet::new(),
        }
    }

    pub fn kind(&self) -> SessionKind {
        self.kind
    }

    pub fn session(&self) -> Option<&ChatSession> {
        self.session.as_ref()
    }

    pub fn title(&self) -> &str {
        self.session
            .as_ref()
            .map(|s| s.title.as_str())
            .unwrap_or(DEFAULT_TITLE)
    }

    pub fn messages(&self) -> &[ThreadMessage] {
        &self.messages
    }

    pub fn failed_messages(&self) -> impl Iterator<Item = &ThreadMessage> {
        self.messages.iter().filter(|m| m.is_failed())
    }

    fn position(&self, id: Uuid) -> Result<usize, WorkflowError> {
        self.messages
            .iter()
            .position(|m| m.message.id == id)
            .ok_or_else(|| WorkflowError::NotFound(format!("message {id}")))
    }

    fn report(&self, title: &str, err: WorkflowError) -> WorkflowError {
        self.notifier.notify(Notification::failure(title, &err));
        err
    }

    /// Index and session of a message the server holds under `id`.
    fn stored(&self, id: Uuid, rejection: &str) -> Result<(usize, Uuid), WorkflowError> {
        let idx = self.position(id)?;
        if self.messages[idx].state != LocalMessageState::Sent || self.agent_prompts.contains(&id) {
            return Err(InputError::Rejected(rejection.into()).into());
        }
        Ok((idx, self.session_id()?))
    }

    fn push_pending(&mut self, content: String) -> Uuid {
        let local_id = Uuid::new_v4();
        self.messages.push(ThreadMessage {
            message: ChatMessage {
                id: local_id,
                role: MessageRole::User,
                content,
                timestamp: Utc::now(),
                metadata: MessageMetadata::default(),
                attachments: vec![],
            },
            state: LocalMessageState::Pending,
        });
        local_id
    }

    /// Replace the history with the server's. Unsent local messages stay at
    /// the end.
    pub async fn load(&mut self) -> Result<usize, WorkflowError> {
        let Some(session_id) = self.session.as_ref().map(|s| s.id) else {
            return Ok(0);
        };
        match self.api.list_messages(session_id).await {
            Ok(stored) => {
                let unsent: Vec<ThreadMessage> = self
                    .messages
                    .drain(..)
                    .filter(|m| m.state != LocalMessageState::Sent)
                    .collect();
                self.messages = stored.into_iter().map(ThreadMessage::sent).collect();
                self.agent_prompts
                    .retain(|id| unsent.iter().any(|m| m.message.id == *id));
                self.messages.extend(unsent);
                tracing::debug!(session_id = %session_id, count = self.messages.len(), "Chat history loaded");
                Ok(self.messages.len())
            }
            Err(e) => Err(self.report("Could not load conversation", e.into())),
        }
    }

    async fn ensure_session(&mut self, first_message: &str) -> Result<Uuid, WorkflowError> {
        if let Some(ref session) = self.session {
            return Ok(session.id);
        }
        let request = NewSession {
            kind: self.kind,
            title: generate_title(first_message),
            client_id: self.client_id,
        };
        let session = self.api.create_session(&request).await?;
        tracing::info!(session_id = %session.id, kind = self.kind.as_str(), "Chat session created");
        let id = session.id;
        self.session = Some(session);
        Ok(id)
    }

    /// Send a user message. Returns the id of the local entry, which is
    /// replaced by the server's id once stored.
    ///
    /// Only validation errors are returned; a failed send leaves the entry
    /// `Failed` for [`retry`](Self::retry).
    pub async fn send(&mut self, content: &str) -> Result<Uuid, WorkflowError> {
        let content = match validate_message(content) {
            Ok(c) => c.to_string(),
            Err(e) => return Err(self.report("Message not sent", e.into())),
        };

        let local_id = self.push_pending(content);
        Ok(self.deliver(local_id).await)
    }

    /// Resend a failed message in place. Failed agent prompts go back to the
    /// agent.
    pub async fn retry(&mut self, id: Uuid) -> Result<Uuid, WorkflowError> {
        let idx = match self.position(id) {
            Ok(idx) if self.messages[idx].is_failed() => idx,
            Ok(_) => {
                return Err(self.report(
                    "Retry not possible",
                    InputError::Rejected("Only failed messages can be retried".into()).into(),
                ))
            }
            Err(e) => return Err(self.report("Retry not possible", e)),
        };
        self.messages[idx].state = LocalMessageState::Pending;
        if self.agent_prompts.contains(&id) {
            // The failure is already on the entry and toasted.
            let _ = self.deliver_to_agent(id).await;
            return Ok(id);
        }
        Ok(self.deliver(id).await)
    }

    /// Push the pending entry `local_id` to the API. Returns its final id.
    async fn deliver(&mut self, local_id: Uuid) -> Uuid {
        let content = match self.position(local_id) {
            Ok(idx) => self.messages[idx].message.content.clone(),
            Err(_) => return local_id,
        };

        let result = match self.ensure_session(&content).await {
            Ok(session_id) => {
                let request = NewMessage {
                    content,
                    attachment_ids: vec![],
                };
                self.api
                    .send_message(session_id, &request)
                    .await
                    .map_err(WorkflowError::from)
            }
            Err(e) => Err(e),
        };

        let Ok(idx) = self.position(local_id) else {
            return local_id;
        };
        match result {
            Ok(sent) => {
                let stored_id = sent.message.id;
                self.messages[idx] = ThreadMessage::sent(sent.message);
                if let Some(reply) = sent.reply {
                    self.messages.insert(idx + 1, ThreadMessage::sent(reply));
                }
                if let Some(ref mut session) = self.session {
                    session.updated_at = Utc::now();
                }
                stored_id
            }
            Err(err) => {
                tracing::warn!(error = %err, "Message send failed");
                self.messages[idx].state = LocalMessageState::Failed {
                    reason: err.to_string(),
                };
                self.notifier
                    .notify(Notification::failure("Message not sent", &err));
                local_id
            }
        }
    }

    /// Change the text of a stored user message.
    pub async fn edit(&mut self, id: Uuid, content: &str) -> Result<(), WorkflowError> {
        let content = match validate_message(content) {
            Ok(c) => c.to_string(),
            Err(e) => return Err(self.report("Edit not saved", e.into())),
        };
        const REJECTION: &str = "Only sent user messages can be edited";
        let target = self.stored(id, REJECTION).and_then(|(idx, session_id)| {
            if self.messages[idx].message.role == MessageRole::User {
                Ok((idx, session_id))
            } else {
                Err(InputError::Rejected(REJECTION.into()).into())
            }
        });
        let (idx, session_id) = match target {
            Ok(target) => target,
            Err(e) => return Err(self.report("Edit not saved", e)),
        };

        let update = MessageUpdate {
            content: Some(content),
            bookmarked: None,
        };
        match self.api.update_message(session_id, id, &update).await {
            Ok(updated) => {
                self.messages[idx] = ThreadMessage::sent(updated);
                Ok(())
            }
            Err(e) => Err(self.report("Edit not saved", e.into())),
        }
    }

    /// Flip the bookmark locally, then persist it. Returns the new value.
    pub async fn toggle_bookmark(&mut self, id: Uuid) -> Result<bool, WorkflowError> {
        let (idx, session_id) = match self.stored(id, "Message is not stored yet") {
            Ok(target) => target,
            Err(e) => return Err(self.report("Bookmark not saved", e)),
        };

        let bookmarked = !self.messages[idx].message.metadata.bookmarked;
        self.messages[idx].message.metadata.bookmarked = bookmarked;

        let update = MessageUpdate {
            content: None,
            bookmarked: Some(bookmarked),
        };
        match self.api.update_message(session_id, id, &update).await {
            Ok(updated) => {
                if let Ok(idx) = self.position(id) {
                    self.messages[idx] = ThreadMessage::sent(updated);
                }
                Ok(bookmarked)
            }
            Err(e) => {
                if let Ok(idx) = self.position(id) {
                    self.messages[idx].message.metadata.bookmarked = !bookmarked;
                }
                Err(self.report("Bookmark not saved", e.into()))
            }
        }
    }

    pub fn search(&self, filter: &FilterState) -> Vec<&ThreadMessage> {
        apply(&self.messages, filter)
    }

    /// Ask the thread's agent. General threads have none.
    pub async fn invoke_agent(&mut self, prompt: &str) -> Result<Uuid, WorkflowError> {
        if self.kind == SessionKind::General {
            return Err(self.report(
                "Agent unavailable",
                InputError::Rejected("General conversations have no agent".into()).into(),
            ));
        }
        let prompt = match validate_message(prompt) {
            Ok(p) => p.to_string(),
            Err(e) => return Err(self.report("Agent request not sent", e.into())),
        };

        let local_id = self.push_pending(prompt);
        self.agent_prompts.insert(local_id);
        self.deliver_to_agent(local_id).await
    }

    /// Send the pending prompt `local_id` to the agent and append its reply.
    /// On failure the prompt is marked `Failed`.
    async fn deliver_to_agent(&mut self, local_id: Uuid) -> Result<Uuid, WorkflowError> {
        let prompt = match self.position(local_id) {
            Ok(idx) => self.messages[idx].message.content.clone(),
            Err(e) => return Err(self.report("Agent request failed", e)),
        };

        let result = match self.ensure_session(&prompt).await {
            Ok(session_id) => {
                let request = AgentRequest {
                    prompt,
                    client_id: self.client_id,
                };
                self.api
                    .invoke_agent(self.kind, session_id, &request)
                    .await
                    .map(|reply| (session_id, reply))
                    .map_err(WorkflowError::from)
            }
            Err(e) => Err(e),
        };

        let idx = self.position(local_id);
        match result {
            Ok((session_id, reply)) => {
                tracing::info!(kind = self.kind.as_str(), session_id = %session_id, "Agent replied");
                let id = reply.id;
                let at = match idx {
                    Ok(idx) => {
                        self.messages[idx].state = LocalMessageState::Sent;
                        idx + 1
                    }
                    Err(_) => self.messages.len(),
                };
                self.messages.insert(at, ThreadMessage::sent(reply));
                Ok(id)
            }
            Err(err) => {
                tracing::warn!(error = %err, "Agent request failed");
                if let Ok(idx) = idx {
                    self.messages[idx].state = LocalMessageState::Failed {
                        reason: err.to_string(),
                    };
                }
                Err(self.report("Agent request failed", err))
            }
        }
    }

    fn session_id(&self) -> Result<Uuid, WorkflowError> {
        self.session
            .as_ref()
            .map(|s| s.id)
            .ok_or_else(|| WorkflowError::NotFound("chat session".into()))
    }
}
