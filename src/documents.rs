//! Document library screen: listing, filtering and batch archive/delete.
//!
//! Archive and delete are optimistic: the local list changes first, then each
//! id is sent to the API and only the ids the API refused are restored.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::api::TaxApi;
use crate::error::{InputError, WorkflowError};
use crate::models::{Document, DocumentStatus};
use crate::notify::{Notification, NotificationSink};
use crate::search::{apply, BatchReport, FilterState, Selection};

/// Header numbers for the library screen.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LibraryStats {
    pub total_documents: usize,
    pub in_flight: usize,
    pub needs_review: usize,
    pub failed: usize,
    pub last_upload: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DocumentAction {
    Archive,
    Delete,
}

impl DocumentAction {
    fn past_tense(self) -> &'static str {
        match self {
            Self::Archive => "archived",
            Self::Delete => "deleted",
        }
    }
}

pub struct DocumentLibrary {
    api: Arc<dyn TaxApi>,
    notifier: Arc<dyn NotificationSink>,
    documents: Vec<Document>,
    pub selection: Selection,
    refreshed_at: Option<DateTime<Utc>>,
}

impl DocumentLibrary {
    pub fn new(api: Arc<dyn TaxApi>, notifier: Arc<dyn NotificationSink>) -> Self {
        Self {
            api,
            notifier,
            documents: Vec::new(),
            selection: Selection::new(),
            refreshed_at: None,
        }
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn get(&self, id: Uuid) -> Option<&Document> {
        self.documents.iter().find(|d| d.id == id)
    }

    pub fn refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.refreshed_at
    }

    /// Reload the list. On failure the previous list is kept.
    pub async fn refresh(&mut self) -> Result<usize, WorkflowError> {
        match self.api.list_documents().await {
            Ok(documents) => {
                let known: HashSet<String> =
                    documents.iter().map(|d| d.id.to_string()).collect();
                self.selection.retain_ids(|id| known.contains(id));
                self.documents = documents;
                self.refreshed_at = Some(Utc::now());
                tracing::debug!(count = self.documents.len(), "Document library refreshed");
                Ok(self.documents.len())
            }
            Err(e) => {
                let err = WorkflowError::from(e);
                self.notifier
                    .notify(Notification::failure("Could not load documents", &err));
                Err(err)
            }
        }
    }

    pub fn visible(&self, filter: &FilterState) -> Vec<&Document> {
        apply(&self.documents, filter)
    }

    /// Select everything the current filter shows.
    pub fn select_all_visible(&mut self, filter: &FilterState) {
        let visible = apply(&self.documents, filter);
        self.selection.select_all(&visible);
    }

    pub fn status_counts(&self) -> HashMap<DocumentStatus, usize> {
        let mut counts = HashMap::new();
        for doc in &self.documents {
            *counts.entry(doc.status).or_insert(0) += 1;
        }
        counts
    }

    pub fn stats(&self) -> LibraryStats {
        LibraryStats {
            total_documents: self.documents.len(),
            in_flight: self
                .documents
                .iter()
                .filter(|d| d.status.is_in_flight())
                .count(),
            needs_review: self.documents.iter().filter(|d| d.needs_review()).count(),
            failed: self
                .documents
                .iter()
                .filter(|d| d.status == DocumentStatus::Failed)
                .count(),
            last_upload: self.documents.iter().map(|d| d.created_at).max(),
        }
    }

    pub async fn archive_selected(&mut self) -> Result<BatchReport, WorkflowError> {
        self.run_batch(DocumentAction::Archive).await
    }

    pub async fn delete_selected(&mut self) -> Result<BatchReport, WorkflowError> {
        self.run_batch(DocumentAction::Delete).await
    }

    async fn run_batch(&mut self, action: DocumentAction) -> Result<BatchReport, WorkflowError> {
        let ids: Vec<Uuid> = self
            .selection
            .uuids()
            .into_iter()
            .filter(|id| self.get(*id).is_some())
            .collect();
        if ids.is_empty() {
            let err = WorkflowError::from(InputError::EmptySelection);
            self.notifier
                .notify(Notification::failure("No documents selected", &err));
            return Err(err);
        }

        let mut report = BatchReport::default();
        if action == DocumentAction::Archive {
            // Already archived: nothing to send.
            let (already, pending): (Vec<Uuid>, Vec<Uuid>) = ids.into_iter().partition(|id| {
                self.get(*id)
                    .is_some_and(|d| d.status == DocumentStatus::Archived)
            });
            report.skipped = already;
            return self.apply_optimistic(action, pending, report).await;
        }
        self.apply_optimistic(action, ids, report).await
    }

    async fn apply_optimistic(
        &mut self,
        action: DocumentAction,
        ids: Vec<Uuid>,
        mut report: BatchReport,
    ) -> Result<BatchReport, WorkflowError> {
        let previous = self.documents.clone();
        let targets: HashSet<Uuid> = ids.iter().copied().collect();
        match action {
            DocumentAction::Archive => {
                for doc in self.documents.iter_mut().filter(|d| targets.contains(&d.id)) {
                    doc.status = DocumentStatus::Archived;
                }
            }
            DocumentAction::Delete => self.documents.retain(|d| !targets.contains(&d.id)),
        }

        let mut last_error = None;
        for id in ids {
            let result = match action {
                DocumentAction::Archive => self.api.archive_document(id).await,
                DocumentAction::Delete => self.api.delete_document(id).await,
            };
            match result {
                Ok(()) => report.succeeded.push(id),
                Err(e) => {
                    tracing::warn!(document_id = %id, error = %e, "Document action failed");
                    report.failed.push(id);
                    last_error = Some(WorkflowError::from(e));
                }
            }
        }

        if !report.failed.is_empty() {
            self.rollback(&previous, &report.failed);
        }
        if action == DocumentAction::Delete {
            for id in &report.succeeded {
                self.selection.deselect(&id.to_string());
            }
        }

        let summary = report.summary(action.past_tense());
        tracing::info!(
            action = action.past_tense(),
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            "Document batch finished"
        );
        match last_error {
            Some(err) => self
                .notifier
                .notify(Notification::failure(summary, &err)),
            None if report.skipped.is_empty() => self
                .notifier
                .notify(Notification::success("Documents updated", summary)),
            None => self
                .notifier
                .notify(Notification::info("Documents updated", summary)),
        }
        Ok(report)
    }

    /// Restore `failed` ids to their state in `previous`, keeping order.
    fn rollback(&mut self, previous: &[Document], failed: &[Uuid]) {
        let failed: HashSet<Uuid> = failed.iter().copied().collect();
        let mut current: HashMap<Uuid, Document> =
            self.documents.drain(..).map(|d| (d.id, d)).collect();
        self.documents = previous
            .iter()
            .filter_map(|old| {
                if failed.contains(&old.id) {
                    Some(old.clone())
                } else {
                    current.remove(&old.id)
                }
            })
            .collect();
    }
}
