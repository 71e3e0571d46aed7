//! Periodic retry of every dirty row.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;

use super::SyncCoordinator;

pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(15);

/// Background task pushing dirty rows on a flat interval.
///
/// A failed cycle is logged and the loop carries on; there is no backoff.
pub struct ReconciliationLoop;

impl ReconciliationLoop {
    /// Start the loop. The first cycle runs immediately.
    ///
    /// The loop stops when [`ReconciliationHandle::stop`] is called or the
    /// handle is dropped.
    pub fn spawn(coordinator: Arc<SyncCoordinator>, interval: Duration) -> ReconciliationHandle {
        let trigger = Arc::new(Notify::new());
        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run(coordinator, interval, Arc::clone(&trigger), shutdown_rx));
        tracing::info!(interval_secs = interval.as_secs(), "Reconciliation loop started");
        ReconciliationHandle {
            trigger,
            shutdown,
            task,
        }
    }
}

async fn run(
    coordinator: Arc<SyncCoordinator>,
    interval: Duration,
    trigger: Arc<Notify>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }

        match coordinator.sync_dirty_now().await {
            Ok(report) if report.failed > 0 => {
                tracing::debug!(failed = report.failed, "Some dirty rows are still pending");
            }
            Ok(_) => {}
            Err(error) => tracing::warn!("Reconciliation cycle failed: {error}"),
        }

        tokio::select! {
            () = tokio::time::sleep(interval) => {}
            () = trigger.notified() => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    tracing::info!("Reconciliation loop stopped");
}

pub struct ReconciliationHandle {
    trigger: Arc<Notify>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ReconciliationHandle {
    /// Run the next cycle now instead of waiting out the interval.
    pub fn trigger(&self) {
        self.trigger.notify_one();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the loop and wait for the running cycle to end.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(error) = self.task.await {
            tracing::warn!("Reconciliation loop ended abnormally: {error}");
        }
    }
}
