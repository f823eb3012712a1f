//! Restarting a client over a file-backed cache.

mod common;

use ebb_core::{DeltaSetTracker, FileBackend};
use ebb_sync::{InMemoryRemote, PendingAction, Record, StoreConfig, SyncClient};
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

fn open_client(path: &Path, remote: &Arc<InMemoryRemote>) -> SyncClient {
    let backend = Arc::new(FileBackend::open(path).unwrap());
    SyncClient::open(backend, remote.clone()).unwrap()
}

#[tokio::test]
async fn pending_writes_survive_a_restart() {
    common::init_tracing();
    let dir = tempdir().unwrap();
    let path = dir.path().join("cache.ebb");
    let remote = Arc::new(InMemoryRemote::new());
    remote.insert("notes", Record::with_id("kept").field("v", 0));

    {
        let client = open_client(&path, &remote);
        let notes = client.store("notes", StoreConfig::sync()).unwrap();
        notes.pull(None).await.unwrap();
        notes.save(Record::with_id("n1").field("v", 1)).await.unwrap();
        notes.save(Record::with_id("n1").field("v", 2)).await.unwrap();
        notes.remove("kept").await.unwrap();
        client.flush().unwrap();
    }

    let client = open_client(&path, &remote);
    let notes = client.store("notes", StoreConfig::sync()).unwrap();
    let pending = notes.pending_writes();
    assert_eq!(pending.len(), 2);
    assert_eq!(pending[0].entity_id, "n1");
    assert_eq!(pending[0].action, PendingAction::Create);
    assert_eq!(pending[1].action, PendingAction::Delete);
    assert_eq!(
        notes.find_by_id("n1").await.unwrap().unwrap().get("v"),
        Some(&2.into())
    );

    assert_eq!(notes.push().await.unwrap().count, 2);
    assert!(remote.get("notes", "kept").is_none());
    assert_eq!(remote.get("notes", "n1").unwrap().get("v"), Some(&2.into()));
}

#[tokio::test]
async fn sequence_order_continues_after_a_restart() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cache.ebb");
    let remote = Arc::new(InMemoryRemote::new());

    {
        let client = open_client(&path, &remote);
        let notes = client.store("notes", StoreConfig::sync()).unwrap();
        notes.save(Record::with_id("first")).await.unwrap();
    }

    let client = open_client(&path, &remote);
    let notes = client.store("notes", StoreConfig::sync()).unwrap();
    notes.save(Record::with_id("second")).await.unwrap();

    let pending = notes.pending_writes();
    assert_eq!(pending[0].entity_id, "first");
    assert_eq!(pending[1].entity_id, "second");
    assert!(pending[1].sequence > pending[0].sequence);
}

#[tokio::test]
async fn delta_cursors_survive_a_restart() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cache.ebb");
    let remote = Arc::new(InMemoryRemote::new());
    remote.insert("notes", Record::with_id("a"));
    remote.insert("notes", Record::with_id("b"));

    {
        let client = open_client(&path, &remote);
        let notes = client
            .store("notes", StoreConfig::sync().with_delta_set_fetching(true))
            .unwrap();
        assert_eq!(notes.pull(None).await.unwrap().count, 2);
    }

    remote.insert("notes", Record::with_id("c"));
    let client = open_client(&path, &remote);
    let tracker = DeltaSetTracker::open(client.cache().backend().clone()).unwrap();
    assert_eq!(tracker.cursors("notes").len(), 1);

    let notes = client
        .store("notes", StoreConfig::sync().with_delta_set_fetching(true))
        .unwrap();
    let pulled = notes.pull(None).await.unwrap();
    assert_eq!(pulled.count, 1);
    assert_eq!(pulled.entities[0].id(), Some("c"));
    assert_eq!(notes.get_count().await.unwrap(), 3);
}

#[tokio::test]
async fn a_second_client_cannot_share_the_journal() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cache.ebb");
    let _held = FileBackend::open(&path).unwrap();

    assert!(FileBackend::open(&path).is_err());
}
