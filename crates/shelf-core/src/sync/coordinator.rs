//! The engine facade clients call into.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::JoinSet;

use super::remote::{PushOutcome, RemoteSync};
use crate::auth::IdentitySession;
use crate::catalog::{dedup_by_id, CatalogLookup, SearchError};
use crate::models::{Book, BookId};
use crate::remote::RemoteDocumentStore;
use crate::services::{LiveQuery, LocalStore};
use crate::Result;

/// Tally of one [`SyncCoordinator::sync_dirty_now`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub attempted: usize,
    pub confirmed: usize,
    pub superseded: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl SyncReport {
    fn record(&mut self, outcome: PushOutcome) {
        self.attempted += 1;
        match outcome {
            PushOutcome::Confirmed => self.confirmed += 1,
            PushOutcome::Superseded => self.superseded += 1,
            PushOutcome::Skipped => self.skipped += 1,
            PushOutcome::Failed => self.failed += 1,
        }
    }
}

/// Write path and reconciliation policy over the local and remote stores.
///
/// Writes land in the local store immediately and are pushed on background
/// tasks owned by the coordinator. Dropping the coordinator aborts pending
/// background work; call [`SyncCoordinator::flush`] first to let it finish.
pub struct SyncCoordinator {
    local: LocalStore,
    remote: Arc<RemoteSync>,
    catalog: Arc<dyn CatalogLookup>,
    tasks: Mutex<JoinSet<()>>,
    restored: AtomicBool,
}

impl SyncCoordinator {
    pub fn new(
        local: LocalStore,
        session: Arc<IdentitySession>,
        remote: Arc<dyn RemoteDocumentStore>,
        catalog: Arc<dyn CatalogLookup>,
    ) -> Self {
        Self {
            remote: Arc::new(RemoteSync::new(session, remote, local.clone())),
            local,
            catalog,
            tasks: Mutex::new(JoinSet::new()),
            restored: AtomicBool::new(false),
        }
    }

    pub fn local(&self) -> &LocalStore {
        &self.local
    }

    pub fn session(&self) -> &Arc<IdentitySession> {
        self.remote.session()
    }

    fn tasks(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn spawn<F>(&self, task: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.tasks();
        while tasks.try_join_next().is_some() {}
        tasks.spawn(task);
    }

    /// Number of background tasks not yet reaped.
    pub fn pending_tasks(&self) -> usize {
        self.tasks().len()
    }

    /// Store `book` as dirty and schedule its push.
    ///
    /// Returns the stored row once the local write committed; the push runs
    /// independently and its failure is never reported here.
    pub async fn save(&self, book: Book) -> Result<Book> {
        let stored = self.local.upsert(&Book { dirty: true, ..book }).await?;
        tracing::debug!(id = %stored.id, revision = stored.revision, "Saved book locally");

        let remote = Arc::clone(&self.remote);
        let id = stored.id.clone();
        self.spawn(async move {
            remote.push(&id).await;
        });
        Ok(stored)
    }

    /// Same write path as [`SyncCoordinator::save`].
    pub async fn update(&self, book: Book) -> Result<Book> {
        self.save(book).await
    }

    /// Delete the local row and schedule the remote delete.
    pub async fn remove(&self, id: &BookId) -> Result<bool> {
        let removed = self.local.delete_by_id(id).await?;
        tracing::debug!(%id, removed, "Removed book locally");

        let remote = Arc::clone(&self.remote);
        let id = id.clone();
        self.spawn(async move {
            remote.delete(&id).await;
        });
        Ok(removed)
    }

    pub fn list_all(&self) -> LiveQuery {
        self.local.list_all()
    }

    pub fn search_local(&self, query: impl Into<String>) -> LiveQuery {
        self.local.search(query)
    }

    /// Catalog search with repeated ids dropped.
    pub async fn search_remote_catalog(
        &self,
        query: &str,
    ) -> std::result::Result<Vec<Book>, SearchError> {
        let results = self.catalog.search(query).await?;
        Ok(dedup_by_id(results))
    }

    /// Schedule the one-time pull of the owner's remote collection.
    ///
    /// Returns `false` when an earlier call already scheduled it.
    pub fn restore_from_cloud_once(&self) -> bool {
        if self.restored.swap(true, Ordering::SeqCst) {
            return false;
        }
        let remote = Arc::clone(&self.remote);
        self.spawn(async move {
            remote.pull_merge().await;
        });
        true
    }

    /// Pull now and wait for the result. Used by explicit restore requests.
    pub async fn pull_now(&self) -> Option<usize> {
        self.remote.pull_merge().await
    }

    /// Push every dirty row and wait for the pushes.
    pub async fn sync_dirty_now(&self) -> Result<SyncReport> {
        let dirty = self.local.list_dirty().await?;
        let mut report = SyncReport::default();
        for book in &dirty {
            report.record(self.remote.push(&book.id).await);
        }
        if report.attempted > 0 {
            tracing::debug!(?report, "Dirty rows pushed");
        }
        Ok(report)
    }

    /// Wait for every background task, including ones spawned meanwhile.
    pub async fn flush(&self) {
        loop {
            let mut pending = std::mem::take(&mut *self.tasks());
            if pending.is_empty() {
                return;
            }
            while let Some(joined) = pending.join_next().await {
                if let Err(error) = joined {
                    tracing::warn!("Background sync task failed: {error}");
                }
            }
        }
    }
}
