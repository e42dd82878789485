use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::Severity;

/// Headline numbers for the dashboard header.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardMetrics {
    /// Document count keyed by status wire string.
    #[serde(default)]
    pub documents_by_status: BTreeMap<String, u32>,
    #[serde(default)]
    pub pending_reviews: u32,
    /// Form count keyed by status wire string.
    #[serde(default)]
    pub forms_by_status: BTreeMap<String, u32>,
    #[serde(default)]
    pub average_extraction_confidence: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub id: Uuid,
    pub kind: String,
    pub summary: String,
    pub occurred_at: DateTime<Utc>,
    #[serde(default)]
    pub actor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardAlert {
    pub id: Uuid,
    pub severity: Severity,
    pub message: String,
    #[serde(default)]
    pub acknowledged: bool,
    pub raised_at: DateTime<Utc>,
}
