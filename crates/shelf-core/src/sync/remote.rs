//! Pushes, deletes and pulls the current owner's documents.
//!
//! Nothing here returns an error: remote failures are logged and turned into
//! outcome values so the local write path never sees them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OwnedMutexGuard;

use crate::auth::{Identity, IdentitySession};
use crate::models::BookId;
use crate::remote::{document_key, RemoteBook, RemoteDocumentStore};
use crate::services::LocalStore;

/// What became of a single push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Written remotely and the dirty bit was cleared
    Confirmed,
    /// Written remotely, but the row changed locally meanwhile and stays dirty
    Superseded,
    /// Nothing to send: the row is already clean or no longer exists
    Skipped,
    /// Not written; the dirty bit is untouched
    Failed,
}

type KeyLocks = Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>;

/// Exclusive hold on one document key, released on drop.
struct KeyGuard<'a> {
    locks: &'a KeyLocks,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks
            .get(&self.key)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.key);
        }
    }
}

pub struct RemoteSync {
    session: Arc<IdentitySession>,
    remote: Arc<dyn RemoteDocumentStore>,
    local: LocalStore,
    locks: KeyLocks,
}

impl RemoteSync {
    pub fn new(
        session: Arc<IdentitySession>,
        remote: Arc<dyn RemoteDocumentStore>,
        local: LocalStore,
    ) -> Self {
        Self {
            session,
            remote,
            local,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn session(&self) -> &Arc<IdentitySession> {
        &self.session
    }

    async fn identity(&self, action: &str) -> Option<Identity> {
        match self.session.current_identity().await {
            Ok(identity) => Some(identity),
            Err(error) => {
                tracing::warn!("{action} skipped; no identity: {error}");
                None
            }
        }
    }

    /// Wait until no other push or delete is working on `key`.
    async fn lock_key(&self, key: &str) -> KeyGuard<'_> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(key.to_string()).or_default())
        };
        KeyGuard {
            locks: &self.locks,
            key: key.to_string(),
            guard: Some(lock.lock_owned().await),
        }
    }

    /// Send the current local state of `id` to its remote document.
    ///
    /// Pushes of one document run one at a time and each reads the row after
    /// taking its turn, so an older state can never land after a newer one.
    /// The dirty bit is cleared only if the row still has the revision that
    /// was sent.
    pub async fn push(&self, id: &BookId) -> PushOutcome {
        let Some(key) = document_key(id) else {
            tracing::warn!(%id, "push skipped; id has no usable document key");
            return PushOutcome::Failed;
        };
        let _turn = self.lock_key(&key).await;

        let book = match self.local.get(id).await {
            Ok(Some(book)) if book.dirty => book,
            Ok(_) => {
                tracing::debug!(%id, "push skipped; row is clean or gone");
                return PushOutcome::Skipped;
            }
            Err(error) => {
                tracing::warn!(%id, "push failed; local read failed: {error}");
                return PushOutcome::Failed;
            }
        };
        let Some(identity) = self.identity("push").await else {
            return PushOutcome::Failed;
        };

        if let Err(error) = self
            .remote
            .set(&identity, &key, &RemoteBook::from_book(&book))
            .await
        {
            tracing::warn!(%id, "push failed; will retry later: {error}");
            return PushOutcome::Failed;
        }

        match self.local.clear_dirty(id, book.revision).await {
            Ok(true) => {
                tracing::debug!(%id, owner = %identity.owner, "push ok");
                PushOutcome::Confirmed
            }
            Ok(false) => {
                tracing::debug!(%id, "push ok; newer local write keeps row dirty");
                PushOutcome::Superseded
            }
            Err(error) => {
                tracing::warn!(%id, "push ok but clearing dirty bit failed: {error}");
                PushOutcome::Failed
            }
        }
    }

    /// Best-effort removal of the remote document for `id`.
    pub async fn delete(&self, id: &BookId) -> bool {
        let Some(key) = document_key(id) else {
            tracing::warn!(%id, "delete skipped; id has no usable document key");
            return false;
        };
        let _turn = self.lock_key(&key).await;
        let Some(identity) = self.identity("delete").await else {
            return false;
        };

        match self.remote.delete(&identity, &key).await {
            Ok(()) => {
                tracing::debug!(%id, "delete ok");
                true
            }
            Err(error) => {
                tracing::warn!(%id, "delete failed (ignored): {error}");
                false
            }
        }
    }

    /// Copy every remote document of the current owner into the local store.
    ///
    /// Pulled rows are clean and overwrite local rows with the same id, dirty
    /// or not. Returns the number of merged documents, `None` on failure.
    pub async fn pull_merge(&self) -> Option<usize> {
        let identity = self.identity("pull").await?;

        let documents = match self.remote.list(&identity).await {
            Ok(documents) => documents,
            Err(error) => {
                tracing::warn!("pull failed; will try again later: {error}");
                return None;
            }
        };

        let mut merged = 0;
        for stored in documents {
            let book = stored.document.into_book(&stored.key);
            if let Err(error) = self.local.upsert(&book).await {
                tracing::warn!(id = %book.id, "pull aborted; local write failed: {error}");
                return None;
            }
            merged += 1;
        }

        tracing::info!(owner = %identity.owner, count = merged, "pull ok");
        Some(merged)
    }
}
