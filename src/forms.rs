//! Forms dashboard: the practice's tax forms with batch status changes.
//!
//! Status changes follow `draft → review → finalized → filed` (plus
//! `review → draft`). Forms that cannot make the requested move are skipped
//! before anything is sent; the rest go to the API in one batch request.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::api::{BatchOperation, BatchRequest, TaxApi};
use crate::error::{InputError, WorkflowError};
use crate::models::{FormStatus, TaxForm};
use crate::notify::{Notification, NotificationSink};
use crate::search::{apply, BatchReport, FilterState, Selection};

fn operation_label(op: BatchOperation) -> String {
    match op {
        BatchOperation::SetStatus(status) => format!("moved to {}", status.as_str()),
        BatchOperation::Archive => "archived".into(),
        BatchOperation::Delete => "deleted".into(),
        BatchOperation::Duplicate => "duplicated".into(),
    }
}

pub struct FormsBoard {
    api: Arc<dyn TaxApi>,
    notifier: Arc<dyn NotificationSink>,
    forms: Vec<TaxForm>,
    pub selection: Selection,
}

impl FormsBoard {
    pub fn new(api: Arc<dyn TaxApi>, notifier: Arc<dyn NotificationSink>) -> Self {
        Self {
            api,
            notifier,
            forms: Vec::new(),
            selection: Selection::new(),
        }
    }

    pub fn forms(&self) -> &[TaxForm] {
        &self.forms
    }

    pub fn get(&self, id: Uuid) -> Option<&TaxForm> {
        self.forms.iter().find(|f| f.id == id)
    }

    /// Reload the forms. On failure the previous list is kept.
    pub async fn refresh(&mut self) -> Result<usize, WorkflowError> {
        match self.api.list_forms().await {
            Ok(forms) => {
                let known: HashSet<String> = forms.iter().map(|f| f.id.to_string()).collect();
                self.selection.retain_ids(|id| known.contains(id));
                self.forms = forms;
                tracing::debug!(count = self.forms.len(), "Forms refreshed");
                Ok(self.forms.len())
            }
            Err(e) => {
                let err = WorkflowError::from(e);
                self.notifier
                    .notify(Notification::failure("Could not load forms", &err));
                Err(err)
            }
        }
    }

    pub fn visible(&self, filter: &FilterState) -> Vec<&TaxForm> {
        apply(&self.forms, filter)
    }

    pub fn select_all_visible(&mut self, filter: &FilterState) {
        let visible = apply(&self.forms, filter);
        self.selection.select_all(&visible);
    }

    /// Average completion over all forms, 0 when there are none.
    pub fn average_completion(&self) -> f32 {
        if self.forms.is_empty() {
            return 0.0;
        }
        let total: u32 = self.forms.iter().map(|f| u32::from(f.completion)).sum();
        total as f32 / self.forms.len() as f32
    }

    /// Run `op` over the selected forms.
    ///
    /// The local list is updated before the request; ids the server reports
    /// as failed (or leaves out) are restored afterwards. A transport failure
    /// restores everything and is returned as an error.
    pub async fn apply_batch(&mut self, op: BatchOperation) -> Result<BatchReport, WorkflowError> {
        let selected: Vec<Uuid> = self
            .selection
            .uuids()
            .into_iter()
            .filter(|id| self.get(*id).is_some())
            .collect();
        if selected.is_empty() {
            let err = WorkflowError::from(InputError::EmptySelection);
            self.notifier
                .notify(Notification::failure("No forms selected", &err));
            return Err(err);
        }

        let mut report = BatchReport::default();
        let eligible: Vec<Uuid> = match op {
            BatchOperation::SetStatus(next) => {
                let (ok, skipped): (Vec<Uuid>, Vec<Uuid>) =
                    selected.into_iter().partition(|id| {
                        self.get(*id)
                            .is_some_and(|f| f.status.can_transition_to(next))
                    });
                report.skipped = skipped;
                ok
            }
            _ => selected,
        };

        let label = operation_label(op);
        if eligible.is_empty() {
            self.notifier.notify(Notification::warning(
                "Nothing to update",
                report.summary(&label),
            ));
            return Ok(report);
        }

        let previous = self.forms.clone();
        self.apply_locally(op, &eligible);

        let request = BatchRequest {
            operation: op,
            form_ids: eligible.clone(),
        };
        let outcome = match self.api.batch_forms(&request).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.forms = previous;
                let err = WorkflowError::from(e);
                self.notifier
                    .notify(Notification::failure("Batch update failed", &err));
                return Err(err);
            }
        };

        let succeeded: HashSet<Uuid> = outcome.succeeded.iter().copied().collect();
        for id in eligible {
            if succeeded.contains(&id) {
                report.succeeded.push(id);
            } else {
                report.failed.push(id);
            }
        }
        if !report.failed.is_empty() {
            self.rollback(&previous, &report.failed);
        }

        if matches!(op, BatchOperation::Archive | BatchOperation::Delete) {
            for id in &report.succeeded {
                self.selection.deselect(&id.to_string());
            }
        }
        if op == BatchOperation::Duplicate && !report.succeeded.is_empty() {
            // Copies get server-assigned ids.
            if let Err(e) = self.refresh().await {
                tracing::warn!(error = %e, "Reload after duplicate failed");
            }
        }

        tracing::info!(
            operation = %label,
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            skipped = report.skipped.len(),
            "Form batch finished"
        );
        let mut summary = report.summary(&label);
        if let Some(message) = outcome.message.filter(|m| !m.is_empty()) {
            summary = format!("{summary}. {message}");
        }
        if report.is_complete_success() {
            self.notifier
                .notify(Notification::success("Forms updated", summary));
        } else {
            self.notifier
                .notify(Notification::warning("Forms partly updated", summary));
        }
        Ok(report)
    }

    fn apply_locally(&mut self, op: BatchOperation, ids: &[Uuid]) {
        let targets: HashSet<Uuid> = ids.iter().copied().collect();
        match op {
            BatchOperation::SetStatus(status) => {
                let now = Utc::now();
                for form in self.forms.iter_mut().filter(|f| targets.contains(&f.id)) {
                    form.status = status;
                    form.updated_at = now;
                }
            }
            BatchOperation::Archive | BatchOperation::Delete => {
                self.forms.retain(|f| !targets.contains(&f.id));
            }
            BatchOperation::Duplicate => {}
        }
    }

    /// Put the `failed` forms back as they were in `previous`, in order.
    fn rollback(&mut self, previous: &[TaxForm], failed: &[Uuid]) {
        let failed: HashSet<Uuid> = failed.iter().copied().collect();
        let mut current: Vec<Option<TaxForm>> = self.forms.drain(..).map(Some).collect();
        let mut restored: Vec<TaxForm> = Vec::with_capacity(previous.len());
        for old in previous {
            if failed.contains(&old.id) {
                restored.push(old.clone());
            } else if let Some(slot) = current
                .iter_mut()
                .find(|slot| slot.as_ref().is_some_and(|f| f.id == old.id))
            {
                if let Some(form) = slot.take() {
                    restored.push(form);
                }
            }
        }
        // Anything new that was not in the previous list stays at the end.
        restored.extend(current.into_iter().flatten());
        self.forms = restored;
    }

    /// Forms that can move to `next` from their current status.
    pub fn eligible_for(&self, next: FormStatus) -> Vec<&TaxForm> {
        self.forms
            .iter()
            .filter(|f| f.status.can_transition_to(next))
            .collect()
    }
}
