use std::collections::BTreeSet;

use serde::Serialize;
use uuid::Uuid;

use super::Searchable;

/// What happened to each selected id in a batch action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub succeeded: Vec<Uuid>,
    /// Rejected by the server or not reached; rolled back locally.
    pub failed: Vec<Uuid>,
    /// Never sent: the action does not apply to these items.
    pub skipped: Vec<Uuid>,
}

impl BatchReport {
    pub fn is_complete_success(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty()
    }

    /// One-line summary for a toast.
    pub fn summary(&self, action: &str) -> String {
        let mut parts = vec![format!("{} {action}", self.succeeded.len())];
        if !self.failed.is_empty() {
            parts.push(format!("{} failed", self.failed.len()));
        }
        if !self.skipped.is_empty() {
            parts.push(format!("{} skipped", self.skipped.len()));
        }
        parts.join(", ")
    }
}

/// Batch selection over a filtered list, keyed by [`Searchable::id`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    ids: BTreeSet<String>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_selected(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn select(&mut self, id: impl Into<String>) {
        self.ids.insert(id.into());
    }

    pub fn deselect(&mut self, id: &str) {
        self.ids.remove(id);
    }

    /// Flip one id; returns whether it is selected afterwards.
    pub fn toggle(&mut self, id: &str) -> bool {
        if self.ids.remove(id) {
            false
        } else {
            self.ids.insert(id.to_string());
            true
        }
    }

    /// Select every currently visible item.
    pub fn select_all<T: Searchable>(&mut self, visible: &[&T]) {
        self.ids.extend(visible.iter().map(|item| item.id()));
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    /// Drop ids that are no longer visible after a filter change.
    pub fn retain_visible<T: Searchable>(&mut self, visible: &[&T]) {
        let shown: BTreeSet<String> = visible.iter().map(|item| item.id()).collect();
        self.ids.retain(|id| shown.contains(id));
    }

    /// Keep only ids for which `keep` returns true.
    pub fn retain_ids(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.ids.retain(|id| keep(id));
    }

    /// True when every visible item is selected and at least one is visible.
    pub fn is_all_selected<T: Searchable>(&self, visible: &[&T]) -> bool {
        !visible.is_empty() && visible.iter().all(|item| self.ids.contains(&item.id()))
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }

    /// Selected ids that parse as UUIDs, in sorted order.
    pub fn uuids(&self) -> Vec<Uuid> {
        self.ids.iter().filter_map(|id| Uuid::parse_str(id).ok()).collect()
    }
}
