//! Offline-first synchronization engine.
//!
//! [`SyncCoordinator`] is the entry point: it writes to the local store,
//! pushes on background tasks and pulls once at startup.
//! [`ReconciliationLoop`] retries whatever is still dirty.

mod coordinator;
mod reconcile;
mod remote;

#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::time::Duration;

pub use coordinator::{SyncCoordinator, SyncReport};
pub use reconcile::{ReconciliationHandle, ReconciliationLoop, DEFAULT_SYNC_INTERVAL};
pub use remote::{PushOutcome, RemoteSync};

/// Startup sequence: schedule the one-shot restore, then start the loop.
pub fn start(coordinator: Arc<SyncCoordinator>, interval: Duration) -> ReconciliationHandle {
    coordinator.restore_from_cloud_once();
    ReconciliationLoop::spawn(coordinator, interval)
}
