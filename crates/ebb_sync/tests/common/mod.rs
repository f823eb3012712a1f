//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use ebb_core::{DocumentBackend, InMemoryBackend, WriteBatch};
use ebb_storage::{StorageError, StorageResult};
use ebb_sync::{DataStore, InMemoryRemote, StoreConfig, StoreMode, SyncClient};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// An in-memory backend whose writes can be made to fail.
#[derive(Debug, Default)]
pub struct FailingBackend {
    inner: InMemoryBackend,
    failing: AtomicBool,
}

impl FailingBackend {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl DocumentBackend for FailingBackend {
    fn get(&self, namespace: &str, key: &str) -> StorageResult<Option<Vec<u8>>> {
        self.inner.get(namespace, key)
    }

    fn scan(&self, namespace: &str) -> StorageResult<Vec<(String, Vec<u8>)>> {
        self.inner.scan(namespace)
    }

    fn apply(&self, batch: WriteBatch) -> StorageResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::Io(std::io::Error::other("disk full")));
        }
        self.inner.apply(batch)
    }

    fn flush(&self) -> StorageResult<()> {
        self.inner.flush()
    }
}

pub struct Fixture {
    pub remote: Arc<InMemoryRemote>,
    pub client: SyncClient,
}

impl Fixture {
    pub fn new() -> Self {
        init_tracing();
        let remote = Arc::new(InMemoryRemote::new());
        let client = SyncClient::in_memory(remote.clone()).unwrap();
        Self { remote, client }
    }

    pub fn with_backend(backend: Arc<dyn DocumentBackend>) -> Self {
        init_tracing();
        let remote = Arc::new(InMemoryRemote::new());
        let client = SyncClient::open(backend, remote.clone()).unwrap();
        Self { remote, client }
    }

    pub fn store(&self, collection: &str, mode: StoreMode) -> DataStore {
        self.client
            .store(collection, StoreConfig::new(mode))
            .unwrap()
    }
}
