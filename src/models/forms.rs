use std::borrow::Cow;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{FormCategory, FormComplexity, FormStatus};
use crate::search::Searchable;

/// Facet key for [`TaxForm::category`].
pub const FACET_CATEGORY: &str = "category";
/// Facet key for [`TaxForm::complexity`].
pub const FACET_COMPLEXITY: &str = "complexity";
/// Facet key for [`TaxForm::status`].
pub const FACET_STATUS: &str = "status";
/// Facet key for the tax year, as a four-digit string.
pub const FACET_TAX_YEAR: &str = "tax_year";
/// Flag key for forms at 100% completion.
pub const FLAG_COMPLETE: &str = "complete";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxForm {
    pub id: Uuid,
    pub name: String,
    pub form_code: String,
    pub category: FormCategory,
    pub complexity: FormComplexity,
    /// Completion percent, 0–100.
    pub completion: u8,
    pub status: FormStatus,
    pub tax_year: u16,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub client_name: Option<String>,
}

impl Searchable for TaxForm {
    fn id(&self) -> String {
        self.id.to_string()
    }

    fn search_text(&self) -> Vec<&str> {
        let mut text = vec![self.name.as_str(), self.form_code.as_str()];
        if let Some(ref client) = self.client_name {
            text.push(client);
        }
        text
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn facet(&self, key: &str) -> Option<Cow<'_, str>> {
        match key {
            FACET_CATEGORY => Some(Cow::Borrowed(self.category.as_str())),
            FACET_COMPLEXITY => Some(Cow::Borrowed(self.complexity.as_str())),
            FACET_STATUS => Some(Cow::Borrowed(self.status.as_str())),
            FACET_TAX_YEAR => Some(Cow::Owned(self.tax_year.to_string())),
            _ => None,
        }
    }

    fn flag(&self, key: &str) -> Option<bool> {
        match key {
            FLAG_COMPLETE => Some(self.completion >= 100),
            _ => None,
        }
    }
}
