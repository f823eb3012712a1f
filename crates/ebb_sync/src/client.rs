//! The sync client: shared local state plus the remote adapter.

use crate::config::StoreConfig;
use crate::error::SyncResult;
use crate::remote::RemoteAdapter;
use crate::store::DataStore;
use ebb_core::{
    validate_collection, DeltaSetTracker, DocumentBackend, InMemoryBackend, LocalCache,
    PendingWriteAction, PendingWriteLog,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Per-collection critical sections.
///
/// `sync_gate` serializes push, pull and sync (and the purge/clear
/// operations that rewrite the log or cursors); it is the only lock held
/// across remote calls. `write` covers each cache + log unit and is
/// never held across an `.await`.
#[derive(Debug, Default)]
pub(crate) struct CollectionLocks {
    pub(crate) sync_gate: tokio::sync::Mutex<()>,
    pub(crate) write: Mutex<()>,
}

/// Everything a collection handle works with.
pub(crate) struct StoreContext {
    pub(crate) collection: String,
    pub(crate) cache: LocalCache,
    pub(crate) log: Arc<PendingWriteLog>,
    pub(crate) tracker: Arc<DeltaSetTracker>,
    pub(crate) remote: Arc<dyn RemoteAdapter>,
    pub(crate) locks: Arc<CollectionLocks>,
}

struct ClientInner {
    backend: Arc<dyn DocumentBackend>,
    cache: LocalCache,
    log: Arc<PendingWriteLog>,
    tracker: Arc<DeltaSetTracker>,
    remote: Arc<dyn RemoteAdapter>,
    locks: Mutex<HashMap<String, Arc<CollectionLocks>>>,
}

/// Entry point of the engine.
///
/// One client owns the local cache, pending write log and delta cursors
/// stored in a backend, and hands out per-collection [`DataStore`]
/// handles. Handles for the same collection share their locks, whatever
/// their mode.
///
/// # Example
///
/// ```rust,no_run
/// use ebb_sync::{InMemoryRemote, StoreConfig, SyncClient};
/// use ebb_core::Record;
/// use std::sync::Arc;
///
/// # async fn demo() -> ebb_sync::SyncResult<()> {
/// let client = SyncClient::in_memory(Arc::new(InMemoryRemote::new()))?;
/// let books = client.store("books", StoreConfig::sync())?;
///
/// books.save(Record::new().field("title", "Dune")).await?;
/// assert_eq!(books.sync_count(false), 1);
/// books.push().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct SyncClient {
    inner: Arc<ClientInner>,
}

impl SyncClient {
    /// Opens a client over a backend, loading the persisted log and
    /// cursors.
    pub fn open(
        backend: Arc<dyn DocumentBackend>,
        remote: Arc<dyn RemoteAdapter>,
    ) -> SyncResult<Self> {
        let log = Arc::new(PendingWriteLog::open(Arc::clone(&backend))?);
        let tracker = Arc::new(DeltaSetTracker::open(Arc::clone(&backend))?);
        tracing::info!(pending = log.count("", true), "sync client opened");

        Ok(Self {
            inner: Arc::new(ClientInner {
                cache: LocalCache::new(Arc::clone(&backend)),
                backend,
                log,
                tracker,
                remote,
                locks: Mutex::new(HashMap::new()),
            }),
        })
    }

    /// Opens a client with a volatile in-memory cache.
    pub fn in_memory(remote: Arc<dyn RemoteAdapter>) -> SyncResult<Self> {
        Self::open(Arc::new(InMemoryBackend::new()), remote)
    }

    /// Returns a handle for one collection.
    ///
    /// # Errors
    ///
    /// Fails if the collection name is empty, contains control characters
    /// or uses the reserved `_ebb` prefix.
    pub fn store(&self, collection: &str, config: StoreConfig) -> SyncResult<DataStore> {
        validate_collection(collection)?;
        let locks = Arc::clone(
            self.inner
                .locks
                .lock()
                .entry(collection.to_string())
                .or_default(),
        );

        let ctx = StoreContext {
            collection: collection.to_string(),
            cache: self.inner.cache.clone(),
            log: Arc::clone(&self.inner.log),
            tracker: Arc::clone(&self.inner.tracker),
            remote: Arc::clone(&self.inner.remote),
            locks,
        };
        tracing::debug!(collection, mode = %config.mode, "store opened");
        Ok(DataStore::new(Arc::new(ctx), &config))
    }

    /// Total pending writes across every collection.
    pub fn sync_count(&self) -> usize {
        self.inner.log.count("", true)
    }

    /// Every pending write, in enqueue order.
    pub fn pending_writes(&self) -> Vec<PendingWriteAction> {
        self.inner.log.get_all_collections()
    }

    /// The local cache.
    pub fn cache(&self) -> &LocalCache {
        &self.inner.cache
    }

    /// The remote adapter.
    pub fn remote(&self) -> &Arc<dyn RemoteAdapter> {
        &self.inner.remote
    }

    /// Flushes the backend.
    pub fn flush(&self) -> SyncResult<()> {
        self.inner.backend.flush()?;
        Ok(())
    }
}

impl std::fmt::Debug for SyncClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncClient")
            .field("pending", &self.sync_count())
            .finish_non_exhaustive()
    }
}
