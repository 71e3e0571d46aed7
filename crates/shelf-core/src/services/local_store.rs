//! Shared local store used by the sync engine and every client.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{watch, Mutex};

use crate::db::{BookRepository, Database, SqliteBookRepository};
use crate::models::{Book, BookId};
use crate::{Error, Result};

/// Thread-safe handle to the local book store.
///
/// This is the single source of truth for what clients render. Every
/// mutation bumps a change counter that [`LiveQuery`] handles wait on.
#[derive(Clone)]
pub struct LocalStore {
    db: Arc<Mutex<Database>>,
    db_path: Option<PathBuf>,
    changes: Arc<watch::Sender<u64>>,
}

impl LocalStore {
    /// Open a store at the given filesystem path.
    pub fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::open(&db_path)?;
        tracing::info!("Opened local store at {}", db_path.display());
        Ok(Self::from_database(db, Some(db_path)))
    }

    /// Open an in-memory store (primarily for tests).
    pub fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory()?;
        Ok(Self::from_database(db, None))
    }

    fn from_database(db: Database, db_path: Option<PathBuf>) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            db: Arc::new(Mutex::new(db)),
            db_path,
            changes: Arc::new(changes),
        }
    }

    /// Path of the backing file, `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn notify(&self) {
        self.changes.send_modify(|version| *version = version.wrapping_add(1));
    }

    /// Fetch a book by id.
    pub async fn get(&self, id: &BookId) -> Result<Option<Book>> {
        let db = self.db.lock().await;
        SqliteBookRepository::new(db.connection()).get(id)
    }

    /// Insert or fully replace a book, returning the stored row.
    pub async fn upsert(&self, book: &Book) -> Result<Book> {
        let revision = {
            let db = self.db.lock().await;
            SqliteBookRepository::new(db.connection()).upsert(book)?
        };
        self.notify();
        Ok(Book {
            revision,
            ..book.clone()
        })
    }

    /// Remove a book; no-op when absent.
    pub async fn delete_by_id(&self, id: &BookId) -> Result<bool> {
        let deleted = {
            let db = self.db.lock().await;
            SqliteBookRepository::new(db.connection()).delete(id)?
        };
        if deleted {
            self.notify();
        }
        Ok(deleted)
    }

    /// Set the dirty bit without altering other fields; no-op when absent.
    pub async fn mark_dirty(&self, id: &BookId, dirty: bool) -> Result<bool> {
        let updated = {
            let db = self.db.lock().await;
            SqliteBookRepository::new(db.connection()).mark_dirty(id, dirty)?
        };
        if updated {
            self.notify();
        }
        Ok(updated)
    }

    /// Clear the dirty bit if nothing wrote the row since `revision`.
    pub async fn clear_dirty(&self, id: &BookId, revision: i64) -> Result<bool> {
        let cleared = {
            let db = self.db.lock().await;
            SqliteBookRepository::new(db.connection()).clear_dirty(id, revision)?
        };
        if cleared {
            self.notify();
        }
        Ok(cleared)
    }

    /// Snapshot of every dirty book, newest first.
    pub async fn list_dirty(&self) -> Result<Vec<Book>> {
        let db = self.db.lock().await;
        SqliteBookRepository::new(db.connection()).list_dirty()
    }

    /// Snapshot of every book, newest first.
    pub async fn books(&self) -> Result<Vec<Book>> {
        let db = self.db.lock().await;
        SqliteBookRepository::new(db.connection()).list_all()
    }

    /// Snapshot of books whose title or author contains `query`.
    pub async fn search_books(&self, query: &str) -> Result<Vec<Book>> {
        let db = self.db.lock().await;
        SqliteBookRepository::new(db.connection()).search(query)
    }

    /// Number of stored books.
    pub async fn count(&self) -> Result<usize> {
        let db = self.db.lock().await;
        SqliteBookRepository::new(db.connection()).count()
    }

    /// Live sequence of every book, newest first.
    pub fn list_all(&self) -> LiveQuery {
        LiveQuery::new(self.clone(), None)
    }

    /// Live sequence of books matching `query` on title or author.
    pub fn search(&self, query: impl Into<String>) -> LiveQuery {
        LiveQuery::new(self.clone(), Some(query.into()))
    }
}

/// Restartable, never-ending view over the local store.
///
/// The first [`LiveQuery::next`] yields the current snapshot immediately; each
/// later call waits for the next committed mutation. Bursts of mutations may
/// be observed as a single snapshot.
pub struct LiveQuery {
    store: LocalStore,
    filter: Option<String>,
    changes: watch::Receiver<u64>,
    primed: bool,
}

impl LiveQuery {
    fn new(store: LocalStore, filter: Option<String>) -> Self {
        let changes = store.changes.subscribe();
        Self {
            store,
            filter,
            changes,
            primed: false,
        }
    }

    /// Wait for the next snapshot.
    pub async fn next(&mut self) -> Result<Vec<Book>> {
        if self.primed {
            self.changes
                .changed()
                .await
                .map_err(|_| Error::Database("local change feed closed".to_string()))?;
        } else {
            self.changes.borrow_and_update();
            self.primed = true;
        }

        match &self.filter {
            Some(query) => self.store.search_books(query).await,
            None => self.store.books().await,
        }
    }
}
