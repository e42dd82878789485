//! Collection filter/search engine shared by the document library, the forms
//! dashboard and chat-history search.
//!
//! Filtering is pure: a [`FilterState`] is applied to a borrowed slice and
//! yields references in the requested order. Nothing is indexed; callers
//! re-run [`apply`] whenever the filter state changes.

pub mod filter;
pub mod selection;
pub mod sort;

use std::borrow::Cow;

use chrono::{DateTime, Utc};

pub use filter::{apply, matches, FilterState};
pub use selection::{BatchReport, Selection};
pub use sort::{relevance_score, SortOrder, BOOKMARK_WEIGHT, KEYWORD_WEIGHT};

/// The searchable surface of a collection item.
///
/// Facet and flag keys are plain strings published as constants next to each
/// model (`models::document::FACET_STATUS`, ...). Unknown keys return `None`,
/// which fails any predicate on that key.
pub trait Searchable {
    /// Stable identifier used by [`Selection`].
    fn id(&self) -> String;

    /// Text fields matched by the free-text query.
    fn search_text(&self) -> Vec<&str>;

    /// Timestamp used for date-range filtering and newest/oldest ordering.
    fn timestamp(&self) -> DateTime<Utc>;

    fn is_bookmarked(&self) -> bool {
        false
    }

    /// Enum-like value for `key`, as its wire string.
    fn facet(&self, key: &str) -> Option<Cow<'_, str>>;

    fn flag(&self, key: &str) -> Option<bool>;
}
