//! Per-owner remote document collection.
//!
//! Documents live at `users/{owner}/books/{key}` where `key` is the
//! sanitized book id. Implementations never see unsanitized ids.

mod document;
mod http;
mod memory;

use async_trait::async_trait;
use thiserror::Error;

pub use document::RemoteBook;
pub use http::HttpDocumentStore;
pub use memory::MemoryDocumentStore;

use crate::auth::{Identity, OwnerKey};
use crate::models::BookId;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Remote store is unreachable")]
    Unreachable,
    #[error("Remote store is not configured")]
    NotConfigured,
    #[error("Invalid remote store configuration: {0}")]
    InvalidConfiguration(&'static str),
    #[error("Remote HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Remote store API error: {0}")]
    Api(String),
    #[error("Invalid remote document: {0}")]
    Json(#[from] serde_json::Error),
}

pub type RemoteResult<T> = Result<T, RemoteError>;

/// A document together with the key it is stored under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredDocument {
    pub key: String,
    pub document: RemoteBook,
}

/// Remote key of `id` inside an owner's collection.
///
/// `None` when the id sanitizes to nothing (`""`, `"/"`, `"//"`); such a key
/// would address the collection itself.
pub fn document_key(id: &BookId) -> Option<String> {
    Some(id.sanitized()).filter(|key| !key.is_empty())
}

/// Full path of the document holding `id` for `owner`.
pub fn document_path(owner: &OwnerKey, id: &BookId) -> Option<String> {
    document_key(id).map(|key| format!("users/{owner}/books/{key}"))
}

/// Owner-scoped document collection.
///
/// Every call names the identity it acts for; the store does not track a
/// current owner of its own.
#[async_trait]
pub trait RemoteDocumentStore: Send + Sync {
    /// Create or replace the document, stamping a server update time.
    async fn set(&self, identity: &Identity, key: &str, document: &RemoteBook)
        -> RemoteResult<()>;

    async fn get(&self, identity: &Identity, key: &str) -> RemoteResult<Option<RemoteBook>>;

    /// Remove the document. Removing a missing document succeeds.
    async fn delete(&self, identity: &Identity, key: &str) -> RemoteResult<()>;

    /// Every document in the owner's collection.
    async fn list(&self, identity: &Identity) -> RemoteResult<Vec<StoredDocument>>;
}

/// Stand-in used when no remote store is configured; every call fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnconfiguredDocumentStore;

#[async_trait]
impl RemoteDocumentStore for UnconfiguredDocumentStore {
    async fn set(&self, _: &Identity, _: &str, _: &RemoteBook) -> RemoteResult<()> {
        Err(RemoteError::NotConfigured)
    }

    async fn get(&self, _: &Identity, _: &str) -> RemoteResult<Option<RemoteBook>> {
        Err(RemoteError::NotConfigured)
    }

    async fn delete(&self, _: &Identity, _: &str) -> RemoteResult<()> {
        Err(RemoteError::NotConfigured)
    }

    async fn list(&self, _: &Identity) -> RemoteResult<Vec<StoredDocument>> {
        Err(RemoteError::NotConfigured)
    }
}
