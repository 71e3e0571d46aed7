//! In-process document store.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use super::{RemoteBook, RemoteDocumentStore, RemoteError, RemoteResult, StoredDocument};
use crate::auth::{Identity, OwnerKey};
use crate::util::unix_millis_now;

#[derive(Debug, Default)]
struct Documents {
    by_path: BTreeMap<String, RemoteBook>,
    last_stamp: i64,
}

/// Document store held in memory.
///
/// Assigns `updatedAt` on every write like a hosted store would. The offline
/// switch makes every call fail with [`RemoteError::Unreachable`].
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    documents: Mutex<Documents>,
    offline: AtomicBool,
    writes: AtomicUsize,
}

fn collection_prefix(owner: &OwnerKey) -> String {
    format!("users/{owner}/books/")
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn is_offline(&self) -> bool {
        self.offline.load(Ordering::SeqCst)
    }

    /// Document at a full path such as `users/u1/books/works_OL1W`.
    pub fn document(&self, path: &str) -> Option<RemoteBook> {
        self.lock().by_path.get(path).cloned()
    }

    /// Number of documents across all owners.
    pub fn len(&self) -> usize {
        self.lock().by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of accepted `set` calls.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Documents> {
        self.documents.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_reachable(&self) -> RemoteResult<()> {
        if self.is_offline() {
            Err(RemoteError::Unreachable)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RemoteDocumentStore for MemoryDocumentStore {
    async fn set(
        &self,
        identity: &Identity,
        key: &str,
        document: &RemoteBook,
    ) -> RemoteResult<()> {
        self.ensure_reachable()?;
        let mut documents = self.lock();
        let stamp = unix_millis_now().max(documents.last_stamp + 1);
        documents.last_stamp = stamp;
        documents.by_path.insert(
            format!("{}{key}", collection_prefix(&identity.owner)),
            RemoteBook {
                updated_at: Some(stamp),
                ..document.clone()
            },
        );
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get(&self, identity: &Identity, key: &str) -> RemoteResult<Option<RemoteBook>> {
        self.ensure_reachable()?;
        Ok(self.document(&format!("{}{key}", collection_prefix(&identity.owner))))
    }

    async fn delete(&self, identity: &Identity, key: &str) -> RemoteResult<()> {
        self.ensure_reachable()?;
        self.lock()
            .by_path
            .remove(&format!("{}{key}", collection_prefix(&identity.owner)));
        Ok(())
    }

    async fn list(&self, identity: &Identity) -> RemoteResult<Vec<StoredDocument>> {
        self.ensure_reachable()?;
        let prefix = collection_prefix(&identity.owner);
        Ok(self
            .lock()
            .by_path
            .range(prefix.clone()..)
            .take_while(|(path, _)| path.starts_with(&prefix))
            .map(|(path, document)| StoredDocument {
                key: path[prefix.len()..].to_string(),
                document: document.clone(),
            })
            .collect())
    }
}
