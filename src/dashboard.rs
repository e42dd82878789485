//! Practice dashboard: headline metrics, recent activity and alerts.
//!
//! The three parts are fetched independently. A part that fails to load keeps
//! its previous value, so one slow endpoint never blanks the whole screen.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::api::{ApiError, TaxApi};
use crate::error::WorkflowError;
use crate::models::{ActivityEntry, DashboardAlert, DashboardMetrics, Severity};
use crate::notify::{Notification, NotificationSink};
use crate::poller::{spawn_periodic, PollerHandle};

/// Activity entries kept for display.
pub const MAX_ACTIVITY_ENTRIES: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DashboardPart {
    Metrics,
    Activity,
    Alerts,
}

impl DashboardPart {
    fn as_str(self) -> &'static str {
        match self {
            Self::Metrics => "metrics",
            Self::Activity => "activity",
            Self::Alerts => "alerts",
        }
    }
}

/// Which parts a refresh updated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefreshReport {
    pub updated: Vec<DashboardPart>,
    pub failed: Vec<DashboardPart>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DashboardSnapshot {
    pub metrics: Option<DashboardMetrics>,
    pub activity: Vec<ActivityEntry>,
    pub alerts: Vec<DashboardAlert>,
    pub refreshed_at: Option<DateTime<Utc>>,
}

pub struct Dashboard {
    api: Arc<dyn TaxApi>,
    notifier: Arc<dyn NotificationSink>,
    snapshot: DashboardSnapshot,
}

impl Dashboard {
    pub fn new(api: Arc<dyn TaxApi>, notifier: Arc<dyn NotificationSink>) -> Self {
        Self {
            api,
            notifier,
            snapshot: DashboardSnapshot::default(),
        }
    }

    pub fn snapshot(&self) -> &DashboardSnapshot {
        &self.snapshot
    }

    /// Fetch all three parts concurrently.
    pub async fn refresh(&mut self) -> RefreshReport {
        let (metrics, activity, alerts) = tokio::join!(
            self.api.dashboard_metrics(),
            self.api.dashboard_activity(),
            self.api.dashboard_alerts(),
        );

        let mut report = RefreshReport::default();
        let mut last_error: Option<ApiError> = None;

        match metrics {
            Ok(m) => {
                self.snapshot.metrics = Some(m);
                report.updated.push(DashboardPart::Metrics);
            }
            Err(e) => record_failure(&mut report, &mut last_error, DashboardPart::Metrics, e),
        }
        match activity {
            Ok(mut entries) => {
                entries.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at));
                entries.truncate(MAX_ACTIVITY_ENTRIES);
                self.snapshot.activity = entries;
                report.updated.push(DashboardPart::Activity);
            }
            Err(e) => record_failure(&mut report, &mut last_error, DashboardPart::Activity, e),
        }
        match alerts {
            Ok(mut alerts) => {
                // Most severe first, newest first within a severity.
                alerts.sort_by(|a, b| {
                    b.severity
                        .cmp(&a.severity)
                        .then(b.raised_at.cmp(&a.raised_at))
                });
                self.snapshot.alerts = alerts;
                report.updated.push(DashboardPart::Alerts);
            }
            Err(e) => record_failure(&mut report, &mut last_error, DashboardPart::Alerts, e),
        }

        if !report.updated.is_empty() {
            self.snapshot.refreshed_at = Some(Utc::now());
        }
        if let Some(e) = last_error {
            let parts: Vec<&str> = report.failed.iter().map(|p| p.as_str()).collect();
            let err = WorkflowError::from(e);
            self.notifier.notify(Notification::failure(
                format!("Dashboard {} not refreshed", parts.join(", ")),
                &err,
            ));
        }
        tracing::debug!(
            updated = report.updated.len(),
            failed = report.failed.len(),
            "Dashboard refreshed"
        );
        report
    }

    pub fn unacknowledged_alerts(&self) -> Vec<&DashboardAlert> {
        self.snapshot
            .alerts
            .iter()
            .filter(|a| !a.acknowledged)
            .collect()
    }

    pub fn highest_alert_severity(&self) -> Option<Severity> {
        self.unacknowledged_alerts()
            .into_iter()
            .map(|a| a.severity)
            .max()
    }
}

fn record_failure(
    report: &mut RefreshReport,
    last_error: &mut Option<ApiError>,
    part: DashboardPart,
    error: ApiError,
) {
    tracing::warn!(part = part.as_str(), error = %error, "Dashboard part failed to load");
    report.failed.push(part);
    *last_error = Some(error);
}

/// Refreshes a shared [`Dashboard`] on a fixed interval.
pub struct DashboardRefresher {
    dashboard: Arc<tokio::sync::Mutex<Dashboard>>,
    poller: PollerHandle,
}

impl DashboardRefresher {
    /// Start refreshing every `interval` (the first run is one interval out).
    pub fn start(dashboard: Arc<tokio::sync::Mutex<Dashboard>>, interval: Duration) -> Self {
        let shared = dashboard.clone();
        let poller = spawn_periodic("dashboard", interval, move || {
            let shared = shared.clone();
            async move {
                shared.lock().await.refresh().await;
            }
        });
        Self { dashboard, poller }
    }

    pub fn dashboard(&self) -> &Arc<tokio::sync::Mutex<Dashboard>> {
        &self.dashboard
    }

    pub fn is_running(&self) -> bool {
        self.poller.is_running()
    }

    pub async fn stop(self) {
        self.poller.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{MockFailure, MockTaxApi};
    use crate::notify::{NotificationLevel, ToastQueue};
    use chrono::TimeZone;
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 4, 1, hour, 0, 0).unwrap()
    }

    fn alert(severity: Severity, hour: u32, acknowledged: bool) -> DashboardAlert {
        DashboardAlert {
            id: Uuid::new_v4(),
            severity,
            message: format!("{} at {hour}", severity.as_str()),
            acknowledged,
            raised_at: at(hour),
        }
    }

    fn activity(hour: u32) -> ActivityEntry {
        ActivityEntry {
            id: Uuid::new_v4(),
            kind: "document_uploaded".into(),
            summary: format!("Upload at {hour}"),
            occurred_at: at(hour),
            actor: Some("preparer".into()),
        }
    }

    fn metrics(pending: u32) -> DashboardMetrics {
        DashboardMetrics {
            documents_by_status: BTreeMap::from([("completed".to_string(), 12)]),
            pending_reviews: pending,
            forms_by_status: BTreeMap::new(),
            average_extraction_confidence: Some(0.88),
        }
    }

    fn setup() -> (Arc<MockTaxApi>, Arc<ToastQueue>, Dashboard) {
        let api = Arc::new(MockTaxApi::new().with_dashboard(
            metrics(3),
            vec![activity(8), activity(11), activity(9)],
            vec![
                alert(Severity::Warning, 10, false),
                alert(Severity::Error, 8, false),
                alert(Severity::Error, 9, true),
            ],
        ));
        let toasts = Arc::new(ToastQueue::new());
        let dashboard = Dashboard::new(api.clone(), toasts.clone());
        (api, toasts, dashboard)
    }

    #[tokio::test]
    async fn refresh_orders_activity_and_alerts() {
        let (_api, toasts, mut dashboard) = setup();
        let report = dashboard.refresh().await;
        assert_eq!(report.updated.len(), 3);
        assert!(report.failed.is_empty());

        let snap = dashboard.snapshot();
        assert_eq!(snap.metrics.as_ref().unwrap().pending_reviews, 3);
        let hours: Vec<DateTime<Utc>> = snap.activity.iter().map(|a| a.occurred_at).collect();
        assert_eq!(hours, vec![at(11), at(9), at(8)]);
        assert_eq!(snap.alerts[0].severity, Severity::Error);
        assert_eq!(snap.alerts[0].raised_at, at(9));
        assert_eq!(snap.alerts[2].severity, Severity::Warning);
        assert!(toasts.is_empty());
    }

    #[tokio::test]
    async fn partial_failure_keeps_previous_part() {
        let (api, toasts, mut dashboard) = setup();
        dashboard.refresh().await;

        api.fail_next("dashboard_alerts", MockFailure::Status(503));
        let report = dashboard.refresh().await;
        assert_eq!(report.failed, vec![DashboardPart::Alerts]);
        assert_eq!(report.updated.len(), 2);
        assert_eq!(dashboard.snapshot().alerts.len(), 3);

        let toast = &toasts.drain()[0];
        assert_eq!(toast.level, NotificationLevel::Error);
        assert_eq!(toast.title, "Dashboard alerts not refreshed");
    }

    #[tokio::test]
    async fn first_refresh_failure_leaves_part_empty() {
        let (api, _toasts, mut dashboard) = setup();
        api.fail_next("dashboard_metrics", MockFailure::Network);
        dashboard.refresh().await;
        assert!(dashboard.snapshot().metrics.is_none());
        assert_eq!(dashboard.snapshot().activity.len(), 3);
    }

    #[tokio::test]
    async fn alert_overlay() {
        let (_api, _toasts, mut dashboard) = setup();
        dashboard.refresh().await;
        assert_eq!(dashboard.unacknowledged_alerts().len(), 2);
        assert_eq!(dashboard.highest_alert_severity(), Some(Severity::Error));
    }

    #[tokio::test]
    async fn refresher_runs_until_stopped() {
        let (api, _toasts, dashboard) = setup();
        let dashboard = Arc::new(tokio::sync::Mutex::new(dashboard));
        let refresher = DashboardRefresher::start(dashboard.clone(), Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(refresher.is_running());
        refresher.stop().await;

        let calls = api.call_count("dashboard_metrics");
        assert!(calls >= 1);
        assert!(dashboard.lock().await.snapshot().refreshed_at.is_some());
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(api.call_count("dashboard_metrics"), calls);
    }
}
