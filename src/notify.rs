//! Non-blocking user notifications (toasts).
//!
//! Controllers never block on the UI: they push a [`Notification`] into a
//! [`NotificationSink`] and carry on. The UI drains the [`ToastQueue`] on its
//! own schedule.

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{ErrorCategory, WorkflowError};

/// Oldest toasts are dropped beyond this many.
pub const MAX_QUEUED_TOASTS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    Success,
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub title: String,
    pub message: String,
    pub category: Option<ErrorCategory>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn success(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Success, title, message, None)
    }

    pub fn info(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Info, title, message, None)
    }

    /// Error toast carrying the error's category.
    pub fn failure(title: impl Into<String>, error: &WorkflowError) -> Self {
        Self::new(
            NotificationLevel::Error,
            title,
            error.to_string(),
            Some(error.category()),
        )
    }

    /// Error reported by the server about work it did on its own
    /// (e.g. extraction failing after an accepted upload).
    pub fn server_error(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(
            NotificationLevel::Error,
            title,
            message,
            Some(ErrorCategory::Api),
        )
    }

    pub fn warning(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Warning, title, message, None)
    }

    fn new(
        level: NotificationLevel,
        title: impl Into<String>,
        message: impl Into<String>,
        category: Option<ErrorCategory>,
    ) -> Self {
        Self {
            level,
            title: title.into(),
            message: message.into(),
            category,
            created_at: Utc::now(),
        }
    }
}

pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Bounded in-memory toast queue.
#[derive(Debug, Default)]
pub struct ToastQueue {
    queue: Mutex<VecDeque<Notification>>,
}

impl ToastQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every queued toast, oldest first.
    pub fn drain(&self) -> Vec<Notification> {
        match self.queue.lock() {
            Ok(mut q) => q.drain(..).collect(),
            Err(poisoned) => poisoned.into_inner().drain(..).collect(),
        }
    }

    pub fn len(&self) -> usize {
        match self.queue.lock() {
            Ok(q) => q.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl NotificationSink for ToastQueue {
    fn notify(&self, notification: Notification) {
        if notification.level == NotificationLevel::Error {
            tracing::warn!(
                title = %notification.title,
                message = %notification.message,
                "User-facing error"
            );
        }
        let mut q = match self.queue.lock() {
            Ok(q) => q,
            Err(poisoned) => poisoned.into_inner(),
        };
        if q.len() == MAX_QUEUED_TOASTS {
            q.pop_front();
        }
        q.push_back(notification);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InputError;

    #[test]
    fn drain_returns_in_order_and_empties() {
        let queue = ToastQueue::new();
        queue.notify(Notification::info("a", "first"));
        queue.notify(Notification::success("b", "second"));
        let drained = queue.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].title, "a");
        assert_eq!(drained[1].level, NotificationLevel::Success);
        assert!(queue.is_empty());
    }

    #[test]
    fn queue_is_bounded() {
        let queue = ToastQueue::new();
        for i in 0..(MAX_QUEUED_TOASTS + 5) {
            queue.notify(Notification::info(format!("t{i}"), ""));
        }
        let drained = queue.drain();
        assert_eq!(drained.len(), MAX_QUEUED_TOASTS);
        assert_eq!(drained[0].title, "t5");
    }

    #[test]
    fn poisoned_queue_still_counts() {
        let queue = std::sync::Arc::new(ToastQueue::new());
        queue.notify(Notification::info("kept", ""));
        let poisoner = queue.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.queue.lock().unwrap();
            panic!("poison the queue");
        })
        .join();
        assert!(queue.queue.is_poisoned());
        assert_eq!(queue.len(), 1);
        assert!(!queue.is_empty());
        assert_eq!(queue.drain().len(), 1);
    }

    #[test]
    fn failure_carries_category() {
        let err = WorkflowError::from(InputError::EmptyMessage);
        let toast = Notification::failure("Send failed", &err);
        assert_eq!(toast.level, NotificationLevel::Error);
        assert_eq!(toast.category, Some(ErrorCategory::Validation));
        assert_eq!(toast.message, "Message is empty");
    }
}
