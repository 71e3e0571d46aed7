use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;

use super::*;
use crate::auth::{
    Credential, Identity, IdentitySession, LocalIdentityProvider, MemorySessionStore, OwnerKey,
    SessionPersistence,
};
use crate::catalog::{CatalogLookup, SearchError};
use crate::models::{Book, BookId};
use crate::remote::{
    document_path, MemoryDocumentStore, RemoteBook, RemoteDocumentStore, RemoteResult,
    StoredDocument,
};
use crate::services::LocalStore;

struct FixedCatalog {
    results: Vec<Book>,
    offline: bool,
}

#[async_trait]
impl CatalogLookup for FixedCatalog {
    async fn search(&self, _query: &str) -> Result<Vec<Book>, SearchError> {
        if self.offline {
            Err(SearchError::Offline)
        } else {
            Ok(self.results.clone())
        }
    }
}

struct Engine {
    coordinator: Arc<SyncCoordinator>,
    remote: Arc<MemoryDocumentStore>,
    session: Arc<IdentitySession>,
}

impl Engine {
    fn with_parts(local: LocalStore, remote: Arc<MemoryDocumentStore>, owner: &str) -> Self {
        let store = Arc::new(MemorySessionStore::new());
        store
            .save_session(&Identity::anonymous(OwnerKey::new(owner)))
            .unwrap();
        let session = Arc::new(IdentitySession::new(
            Arc::new(LocalIdentityProvider::new()),
            store,
        ));
        let catalog = Arc::new(FixedCatalog {
            results: Vec::new(),
            offline: false,
        });
        let coordinator = Arc::new(SyncCoordinator::new(
            local,
            Arc::clone(&session),
            remote.clone(),
            catalog,
        ));
        Self {
            coordinator,
            remote,
            session,
        }
    }

    fn new() -> Self {
        Self::with_parts(
            LocalStore::open_in_memory().unwrap(),
            Arc::new(MemoryDocumentStore::new()),
            "u1",
        )
    }

    fn local(&self) -> &LocalStore {
        self.coordinator.local()
    }

    async fn owner(&self) -> OwnerKey {
        self.session.current_identity().await.unwrap().owner
    }
}

fn dune() -> Book {
    Book::new("/works/OL1W", "Dune", "Frank Herbert", "1965")
}

async fn wait_until_clean(local: &LocalStore) {
    tokio::time::timeout(Duration::from_secs(60), async {
        while !local.list_dirty().await.unwrap().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("dirty rows were never confirmed");
}

#[tokio::test(start_paused = true)]
async fn book_saved_offline_reaches_remote_within_one_interval() {
    let engine = Engine::new();
    engine.remote.set_offline(true);
    let mut live = engine.coordinator.list_all();

    engine.coordinator.save(dune()).await.unwrap();
    let books = live.next().await.unwrap();
    assert_eq!(books.len(), 1);
    assert!(books[0].dirty);

    engine.coordinator.flush().await;
    assert!(engine.local().get(&dune().id).await.unwrap().unwrap().dirty);

    let handle = ReconciliationLoop::spawn(Arc::clone(&engine.coordinator), DEFAULT_SYNC_INTERVAL);
    engine.remote.set_offline(false);
    tokio::time::sleep(DEFAULT_SYNC_INTERVAL + Duration::from_secs(1)).await;

    assert!(!engine.local().get(&dune().id).await.unwrap().unwrap().dirty);
    let document = engine.remote.document("users/u1/books/works_OL1W").unwrap();
    assert_eq!(document.title, "Dune");
    assert_eq!(document.id.as_deref(), Some("/works/OL1W"));

    handle.stop().await;
}

#[tokio::test]
async fn local_state_tracks_writes_while_remote_is_down() {
    let engine = Engine::new();
    engine.remote.set_offline(true);

    let hyperion = Book::new("b2", "Hyperion", "Dan Simmons", "1989").with_created_at(1);
    engine.coordinator.save(dune().with_created_at(2)).await.unwrap();
    engine.coordinator.save(hyperion.clone()).await.unwrap();
    engine
        .coordinator
        .update(Book {
            year: "1990".to_string(),
            ..hyperion
        })
        .await
        .unwrap();
    engine.coordinator.remove(&dune().id).await.unwrap();
    engine.coordinator.flush().await;

    let books = engine.coordinator.list_all().next().await.unwrap();
    assert_eq!(books.len(), 1);
    assert_eq!(books[0].id, BookId::from("b2"));
    assert_eq!(books[0].year, "1990");
    assert!(books[0].dirty);
    assert!(engine.remote.is_empty());
}

#[tokio::test]
async fn repeated_push_leaves_one_identical_document() {
    let engine = Engine::new();

    engine.coordinator.save(dune()).await.unwrap();
    engine.coordinator.flush().await;
    let first = engine.remote.document("users/u1/books/works_OL1W").unwrap();

    engine.coordinator.save(dune()).await.unwrap();
    engine.coordinator.flush().await;
    let second = engine.remote.document("users/u1/books/works_OL1W").unwrap();

    assert_eq!(engine.remote.len(), 1);
    assert!(first.same_content(&second));
    assert!(!engine.local().get(&dune().id).await.unwrap().unwrap().dirty);
}

#[tokio::test]
async fn restore_pulls_remote_books_into_a_fresh_store() {
    let remote = Arc::new(MemoryDocumentStore::new());
    let original = Engine::with_parts(LocalStore::open_in_memory().unwrap(), remote.clone(), "u1");
    let hyperion = Book::new("b2", "Hyperion", "Dan Simmons", "1989").with_cover(9);
    original.coordinator.save(dune()).await.unwrap();
    original.coordinator.save(hyperion.clone()).await.unwrap();
    original.coordinator.flush().await;

    let reinstalled = Engine::with_parts(LocalStore::open_in_memory().unwrap(), remote, "u1");
    assert!(reinstalled.coordinator.restore_from_cloud_once());
    assert!(!reinstalled.coordinator.restore_from_cloud_once());
    reinstalled.coordinator.flush().await;

    let mut restored = reinstalled.local().books().await.unwrap();
    restored.sort_by(|a, b| a.id.cmp(&b.id));
    assert_eq!(restored.len(), 2);
    for book in &restored {
        assert!(!book.dirty);
    }
    let pulled = &restored[0];
    assert_eq!(pulled.id, dune().id);
    assert_eq!(pulled.title, "Dune");
    assert_eq!(restored[1].cover_reference, Some(9));
    assert_eq!(restored[1].created_at, hyperion.created_at);
}

#[tokio::test]
async fn removed_book_stays_gone_when_remote_delete_fails() {
    let engine = Engine::new();
    engine.coordinator.save(dune()).await.unwrap();
    engine.coordinator.flush().await;

    engine.remote.set_offline(true);
    assert!(engine.coordinator.remove(&dune().id).await.unwrap());
    engine.coordinator.flush().await;
    engine.remote.set_offline(false);
    engine.coordinator.sync_dirty_now().await.unwrap();

    let books = engine.coordinator.list_all().next().await.unwrap();
    assert!(books.is_empty());
    // Failed deletes are not retried, so the document is orphaned.
    assert!(engine.remote.document("users/u1/books/works_OL1W").is_some());
}

/// Memory store whose first write takes a while to land.
struct SlowFirstWrite {
    inner: Arc<MemoryDocumentStore>,
    delayed: AtomicBool,
}

#[async_trait]
impl RemoteDocumentStore for SlowFirstWrite {
    async fn set(&self, identity: &Identity, key: &str, document: &RemoteBook) -> RemoteResult<()> {
        if !self.delayed.swap(true, Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        self.inner.set(identity, key, document).await
    }

    async fn get(&self, identity: &Identity, key: &str) -> RemoteResult<Option<RemoteBook>> {
        self.inner.get(identity, key).await
    }

    async fn delete(&self, identity: &Identity, key: &str) -> RemoteResult<()> {
        self.inner.delete(identity, key).await
    }

    async fn list(&self, identity: &Identity) -> RemoteResult<Vec<StoredDocument>> {
        self.inner.list(identity).await
    }
}

#[tokio::test(start_paused = true)]
async fn slow_older_push_cannot_overwrite_newer_edit() {
    let memory = Arc::new(MemoryDocumentStore::new());
    let store = Arc::new(MemorySessionStore::new());
    store
        .save_session(&Identity::anonymous(OwnerKey::new("u1")))
        .unwrap();
    let coordinator = SyncCoordinator::new(
        LocalStore::open_in_memory().unwrap(),
        Arc::new(IdentitySession::new(
            Arc::new(LocalIdentityProvider::new()),
            store,
        )),
        Arc::new(SlowFirstWrite {
            inner: memory.clone(),
            delayed: AtomicBool::new(false),
        }),
        Arc::new(FixedCatalog {
            results: Vec::new(),
            offline: false,
        }),
    );

    coordinator.save(dune()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    coordinator
        .update(Book {
            title: "Dune (revised)".to_string(),
            ..dune()
        })
        .await
        .unwrap();
    coordinator.flush().await;

    let local = coordinator.local().get(&dune().id).await.unwrap().unwrap();
    let remote = memory.document("users/u1/books/works_OL1W").unwrap();
    assert_eq!(local.title, "Dune (revised)");
    assert!(!local.dirty);
    assert_eq!(remote.title, "Dune (revised)");
    assert_eq!(coordinator.sync_dirty_now().await.unwrap().attempted, 0);
}

#[tokio::test]
async fn book_without_document_key_stays_local() {
    let engine = Engine::new();
    engine.coordinator.save(dune()).await.unwrap();
    engine.coordinator.flush().await;

    let slash = Book::new("/", "Slash only", "", "");
    engine.coordinator.save(slash.clone()).await.unwrap();
    engine.coordinator.remove(&slash.id).await.unwrap();
    engine.coordinator.save(slash.clone()).await.unwrap();
    engine.coordinator.flush().await;

    assert!(engine.remote.document("users/u1/books/").is_none());
    assert!(engine.remote.document("users/u1/books/works_OL1W").is_some());
    assert_eq!(engine.remote.len(), 1);
    assert!(engine.local().get(&slash.id).await.unwrap().unwrap().dirty);
}

#[tokio::test]
async fn colliding_sanitized_ids_share_one_document() {
    let engine = Engine::new();

    engine
        .coordinator
        .save(Book::new("a/b", "Slash", "", "").with_created_at(1))
        .await
        .unwrap();
    engine.coordinator.flush().await;
    engine
        .coordinator
        .save(Book::new("a_b", "Underscore", "", "").with_created_at(2))
        .await
        .unwrap();
    engine.coordinator.flush().await;

    assert_eq!(engine.local().count().await.unwrap(), 2);
    assert_eq!(engine.remote.len(), 1);
    let document = engine.remote.document("users/u1/books/a_b").unwrap();
    assert_eq!(document.title, "Underscore");
}

#[tokio::test]
async fn double_upgrade_keeps_documents_reachable() {
    let engine = Engine::new();
    engine.coordinator.save(dune()).await.unwrap();
    engine.coordinator.flush().await;
    let before = engine.owner().await;
    let credential = Credential::new("reader@example.com", "secret").unwrap();

    let first = engine.session.upgrade_to_permanent(&credential).await.unwrap();
    let second = engine.session.upgrade_to_permanent(&credential).await.unwrap();

    assert_eq!(first.owner, before);
    assert_eq!(second.owner, before);
    let path = document_path(&second.owner, &dune().id).unwrap();
    assert!(engine.remote.document(&path).is_some());
    assert_eq!(engine.coordinator.pull_now().await, Some(1));
}

#[tokio::test]
async fn sign_out_switches_to_an_empty_collection() {
    let engine = Engine::new();
    engine.coordinator.save(dune()).await.unwrap();
    engine.coordinator.flush().await;

    let fresh = engine.session.sign_out().await.unwrap();

    assert_ne!(fresh.owner, OwnerKey::new("u1"));
    assert_eq!(engine.coordinator.pull_now().await, Some(0));
    let listed = engine.remote.list(&fresh).await.unwrap();
    assert!(listed.is_empty());
}

#[tokio::test]
async fn sync_dirty_now_reports_each_push() {
    let engine = Engine::new();
    engine.remote.set_offline(true);
    engine.coordinator.save(dune()).await.unwrap();
    engine
        .coordinator
        .save(Book::new("b2", "Hyperion", "", ""))
        .await
        .unwrap();
    engine.coordinator.flush().await;

    let offline = engine.coordinator.sync_dirty_now().await.unwrap();
    assert_eq!(
        offline,
        SyncReport {
            attempted: 2,
            confirmed: 0,
            superseded: 0,
            skipped: 0,
            failed: 2,
        }
    );

    engine.remote.set_offline(false);
    let online = engine.coordinator.sync_dirty_now().await.unwrap();
    assert_eq!(online.confirmed, 2);
    assert_eq!(engine.coordinator.sync_dirty_now().await.unwrap().attempted, 0);
}

#[tokio::test]
async fn catalog_results_are_deduplicated() {
    let local = LocalStore::open_in_memory().unwrap();
    let session = Arc::new(IdentitySession::new(
        Arc::new(LocalIdentityProvider::new()),
        Arc::new(MemorySessionStore::new()),
    ));
    let catalog = Arc::new(FixedCatalog {
        results: vec![
            Book::new("/works/OL1W", "Dune", "Frank Herbert", "1965"),
            Book::new("/works/OL1W", "Dune (duplicate)", "Frank Herbert", "1965"),
            Book::new("/works/OL2W", "Dune Messiah", "Frank Herbert", "1969"),
        ],
        offline: false,
    });
    let coordinator = SyncCoordinator::new(
        local,
        session,
        Arc::new(MemoryDocumentStore::new()),
        catalog,
    );

    let results = coordinator.search_remote_catalog("dune").await.unwrap();

    let titles: Vec<_> = results.iter().map(|book| book.title.as_str()).collect();
    assert_eq!(titles, vec!["Dune", "Dune Messiah"]);
}

#[tokio::test]
async fn catalog_failure_is_surfaced() {
    let coordinator = SyncCoordinator::new(
        LocalStore::open_in_memory().unwrap(),
        Arc::new(IdentitySession::new(
            Arc::new(LocalIdentityProvider::new()),
            Arc::new(MemorySessionStore::new()),
        )),
        Arc::new(MemoryDocumentStore::new()),
        Arc::new(FixedCatalog {
            results: Vec::new(),
            offline: true,
        }),
    );

    let error = coordinator.search_remote_catalog("dune").await.unwrap_err();
    assert_eq!(error.user_message(), "No internet connection.");
}

#[tokio::test]
async fn triggered_cycle_runs_before_the_interval() {
    let engine = Engine::new();
    engine.remote.set_offline(true);
    engine.coordinator.save(dune()).await.unwrap();
    engine.coordinator.flush().await;

    let handle = ReconciliationLoop::spawn(
        Arc::clone(&engine.coordinator),
        Duration::from_secs(3600),
    );
    engine.remote.set_offline(false);
    handle.trigger();
    wait_until_clean(engine.local()).await;

    handle.stop().await;
    assert_eq!(engine.remote.len(), 1);
}

#[tokio::test]
async fn loop_survives_failing_cycles_and_stops_on_request() {
    let engine = Engine::new();
    engine.remote.set_offline(true);
    engine.coordinator.save(dune()).await.unwrap();

    let handle = ReconciliationLoop::spawn(
        Arc::clone(&engine.coordinator),
        Duration::from_millis(5),
    );
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(!handle.is_finished());

    engine.remote.set_offline(false);
    wait_until_clean(engine.local()).await;
    handle.stop().await;
}

#[tokio::test]
async fn start_restores_once_and_runs_the_loop() {
    let remote = Arc::new(MemoryDocumentStore::new());
    let seeded = Engine::with_parts(LocalStore::open_in_memory().unwrap(), remote.clone(), "u1");
    seeded.coordinator.save(dune()).await.unwrap();
    seeded.coordinator.flush().await;

    let engine = Engine::with_parts(LocalStore::open_in_memory().unwrap(), remote, "u1");
    let handle = start(Arc::clone(&engine.coordinator), Duration::from_secs(3600));
    engine.coordinator.flush().await;

    assert!(!engine.coordinator.restore_from_cloud_once());
    assert_eq!(engine.local().count().await.unwrap(), 1);
    handle.stop().await;
}
