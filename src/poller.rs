//! Fixed-interval background refresh.
//!
//! Spawns a tokio task that runs a refresh closure every `interval` until the
//! returned [`PollerHandle`] is shut down or dropped. The first run happens one
//! interval after spawning; callers do their initial load themselves.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Handle for a background poller task.
///
/// Dropping the handle signals shutdown; a refresh already in progress
/// completes, no new one is started.
pub struct PollerHandle {
    name: &'static str,
    shutdown: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl PollerHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Signal shutdown and wait for the task to exit.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

/// Run `task` every `interval` on the current tokio runtime.
pub fn spawn_periodic<F, Fut>(name: &'static str, interval: Duration, mut task: F) -> PollerHandle
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let (tx, mut rx) = watch::channel(false);

    let handle = tokio::spawn(async move {
        tracing::info!(poller = name, interval_secs = interval.as_secs_f64(), "Poller started");
        let mut ticker = interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                changed = rx.changed() => {
                    if changed.is_err() || *rx.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    tracing::debug!(poller = name, "Poll tick");
                    task().await;
                }
            }
        }
        tracing::info!(poller = name, "Poller shutting down");
    });

    PollerHandle {
        name,
        shutdown: tx,
        handle: Some(handle),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn runs_on_interval_until_shutdown() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let poller = spawn_periodic("test", Duration::from_millis(10), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(poller.is_running());
        poller.shutdown().await;

        let after_shutdown = count.load(Ordering::SeqCst);
        assert!(after_shutdown >= 2, "ran {after_shutdown} times");
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(count.load(Ordering::SeqCst), after_shutdown);
    }

    #[tokio::test]
    async fn first_run_waits_one_interval() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let poller = spawn_periodic("slow", Duration::from_secs(60), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        drop(poller);
    }
}
