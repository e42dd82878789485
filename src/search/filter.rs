use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::sort::{sort_items, SortOrder};
use super::Searchable;

/// Compound filter state bound to one list screen.
///
/// All predicates combine with AND semantics. Within one facet key the
/// selected values combine with OR; an empty selection for a key is inactive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterState {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub date_from: Option<NaiveDate>,
    #[serde(default)]
    pub date_to: Option<NaiveDate>,
    #[serde(default)]
    pub facets: BTreeMap<String, BTreeSet<String>>,
    #[serde(default)]
    pub flags: BTreeMap<String, bool>,
    /// `None` keeps the source order.
    #[serde(default)]
    pub sort: Option<SortOrder>,
}

impl FilterState {
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    pub fn with_date_range(mut self, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        self.date_from = from;
        self.date_to = to;
        self
    }

    /// Add `value` to the selection for facet `key`.
    pub fn with_facet(mut self, key: &str, value: impl Into<String>) -> Self {
        self.select_facet(key, value);
        self
    }

    pub fn with_flag(mut self, key: &str, value: bool) -> Self {
        self.flags.insert(key.to_string(), value);
        self
    }

    pub fn sorted_by(mut self, order: SortOrder) -> Self {
        self.sort = Some(order);
        self
    }

    pub fn select_facet(&mut self, key: &str, value: impl Into<String>) {
        self.facets
            .entry(key.to_string())
            .or_default()
            .insert(value.into());
    }

    pub fn deselect_facet(&mut self, key: &str, value: &str) {
        if let Some(values) = self.facets.get_mut(key) {
            values.remove(value);
            if values.is_empty() {
                self.facets.remove(key);
            }
        }
    }

    pub fn clear_facet(&mut self, key: &str) {
        self.facets.remove(key);
    }

    pub fn clear_flag(&mut self, key: &str) {
        self.flags.remove(key);
    }

    /// Reset every predicate and the sort order.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// True when at least one predicate or a sort order is set.
    pub fn is_active(&self) -> bool {
        !self.query.trim().is_empty()
            || self.date_from.is_some()
            || self.date_to.is_some()
            || self.facets.values().any(|v| !v.is_empty())
            || !self.flags.is_empty()
            || self.sort.is_some()
    }

    /// Lowercased whitespace-separated query terms.
    pub fn terms(&self) -> Vec<String> {
        self.query
            .split_whitespace()
            .map(str::to_lowercase)
            .collect()
    }
}

/// Check one item against every predicate in `state`.
///
/// `terms` is `state.terms()`, passed in so a full pass lowercases the query once.
pub fn matches<T: Searchable + ?Sized>(item: &T, state: &FilterState, terms: &[String]) -> bool {
    if !terms.is_empty() {
        let texts: Vec<String> = item.search_text().iter().map(|t| t.to_lowercase()).collect();
        let all_found = terms
            .iter()
            .all(|term| texts.iter().any(|text| text.contains(term.as_str())));
        if !all_found {
            return false;
        }
    }

    if state.date_from.is_some() || state.date_to.is_some() {
        let day = item.timestamp().date_naive();
        if state.date_from.is_some_and(|from| day < from) {
            return false;
        }
        if state.date_to.is_some_and(|to| day > to) {
            return false;
        }
    }

    for (key, selected) in &state.facets {
        if selected.is_empty() {
            continue;
        }
        match item.facet(key) {
            Some(value) if selected.contains(value.as_ref()) => {}
            _ => return false,
        }
    }

    state
        .flags
        .iter()
        .all(|(key, wanted)| item.flag(key) == Some(*wanted))
}

/// Filter then sort `items` according to `state`.
pub fn apply<'a, T: Searchable>(items: &'a [T], state: &FilterState) -> Vec<&'a T> {
    let terms = state.terms();
    let mut visible: Vec<&T> = items
        .iter()
        .filter(|item| matches(*item, state, &terms))
        .collect();

    if let Some(order) = state.sort {
        sort_items(&mut visible, order, &terms);
    }

    tracing::trace!(
        total = items.len(),
        visible = visible.len(),
        "filter applied"
    );
    visible
}
