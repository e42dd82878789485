use std::cmp::Reverse;

use serde::{Deserialize, Serialize};

use super::Searchable;

/// Score added per query-term occurrence.
pub const KEYWORD_WEIGHT: u32 = 10;
/// Score added once when the item is bookmarked.
pub const BOOKMARK_WEIGHT: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Newest,
    Oldest,
    Relevance,
}

/// Additive relevance: keyword occurrences plus the bookmark bonus.
///
/// `terms` must already be lowercased.
pub fn relevance_score<T: Searchable + ?Sized>(item: &T, terms: &[String]) -> u32 {
    let occurrences: usize = item
        .search_text()
        .iter()
        .map(|text| {
            let lower = text.to_lowercase();
            terms
                .iter()
                .map(|term| lower.matches(term.as_str()).count())
                .sum::<usize>()
        })
        .sum();

    let keyword = u32::try_from(occurrences)
        .unwrap_or(u32::MAX)
        .saturating_mul(KEYWORD_WEIGHT);
    let bookmark = if item.is_bookmarked() { BOOKMARK_WEIGHT } else { 0 };
    keyword.saturating_add(bookmark)
}

/// Stable sort of already-filtered items.
pub(crate) fn sort_items<T: Searchable>(items: &mut Vec<&T>, order: SortOrder, terms: &[String]) {
    match order {
        SortOrder::Newest => items.sort_by_key(|item| Reverse(item.timestamp())),
        SortOrder::Oldest => items.sort_by_key(|item| item.timestamp()),
        SortOrder::Relevance => {
            let mut scored: Vec<(u32, &T)> = items
                .iter()
                .map(|item| (relevance_score(*item, terms), *item))
                .collect();
            // Ties fall back to recency.
            scored.sort_by(|(sa, a), (sb, b)| {
                sb.cmp(sa).then_with(|| b.timestamp().cmp(&a.timestamp()))
            });
            *items = scored.into_iter().map(|(_, item)| item).collect();
        }
    }
}
