//! Local writes, coalescing and the pending write log.

mod common;

use common::Fixture;
use ebb_core::is_local_id;
use ebb_sync::{PendingAction, Predicate, Query, Record, StoreMode};

#[tokio::test]
async fn repeated_saves_coalesce_into_one_create() {
    let fx = Fixture::new();
    let books = fx.store("books", StoreMode::Sync);

    books
        .save(Record::with_id("b1").field("title", "Dune"))
        .await
        .unwrap();
    assert_eq!(books.sync_count(true), 1);

    books
        .save(Record::with_id("b1").field("title", "Dune Messiah"))
        .await
        .unwrap();
    assert_eq!(books.sync_count(true), 1);

    let pending = books.pending_writes();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].action, PendingAction::Create);
    assert_eq!(
        books.find_by_id("b1").await.unwrap().unwrap().get("title"),
        Some(&"Dune Messiah".into())
    );
}

#[tokio::test]
async fn saves_of_a_remote_entity_coalesce_into_one_update() {
    let fx = Fixture::new();
    fx.remote
        .insert("books", Record::with_id("b1").field("title", "Dune"));
    let books = fx.store("books", StoreMode::Sync);
    books.pull(None).await.unwrap();

    books
        .save(Record::with_id("b1").field("title", "Dune (2nd ed.)"))
        .await
        .unwrap();
    books
        .save(Record::with_id("b1").field("title", "Dune (3rd ed.)"))
        .await
        .unwrap();

    let pending = books.pending_writes();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].action, PendingAction::Update);
}

#[tokio::test]
async fn create_then_remove_leaves_nothing_to_push() {
    let fx = Fixture::new();
    let books = fx.store("books", StoreMode::Sync);

    books.save(Record::with_id("b1")).await.unwrap();
    let removed = books.remove("b1").await.unwrap();
    assert_eq!(removed.count, 1);
    assert_eq!(books.sync_count(false), 0);

    let pushed = books.push().await.unwrap();
    assert_eq!(pushed.count, 0);
    assert_eq!(fx.remote.calls("save") + fx.remote.calls("remove"), 0);
}

#[tokio::test]
async fn save_without_id_gets_local_id() {
    let fx = Fixture::new();
    let books = fx.store("books", StoreMode::Sync);

    let saved = books
        .save(Record::new().field("title", "Solaris"))
        .await
        .unwrap();
    let id = saved.id.clone().unwrap();
    assert!(is_local_id(&id));
    assert!(saved.metadata.last_modified.is_some());
    assert!(saved.metadata.entity_creation_time.is_some());
    assert_eq!(books.pending_writes()[0].entity_id, id);
}

#[tokio::test]
async fn save_a_save_b_delete_a_push() {
    let fx = Fixture::new();
    fx.remote.insert("notes", Record::with_id("a").field("v", 0));
    let notes = fx.store("notes", StoreMode::Sync);
    notes.pull(None).await.unwrap();

    notes
        .save(Record::with_id("a").field("v", 1))
        .await
        .unwrap();
    notes
        .save(Record::with_id("b").field("v", 2))
        .await
        .unwrap();
    assert_eq!(notes.sync_count(false), 2);

    notes.remove("a").await.unwrap();
    let pending = notes.pending_writes();
    assert_eq!(pending.len(), 2);
    assert_eq!(pending[0].entity_id, "a");
    assert_eq!(pending[0].action, PendingAction::Delete);
    assert_eq!(pending[1].entity_id, "b");
    assert_eq!(pending[1].action, PendingAction::Create);

    let pushed = notes.push().await.unwrap();
    assert_eq!(pushed.count, 2);
    assert_eq!(notes.sync_count(false), 0);
    assert!(fx.remote.get("notes", "a").is_none());
    assert_eq!(
        fx.remote.get("notes", "b").unwrap().get("v"),
        Some(&2.into())
    );
}

#[tokio::test]
async fn deleting_an_unpushed_entity_leaves_only_the_other() {
    let fx = Fixture::new();
    let notes = fx.store("notes", StoreMode::Sync);
    notes.save(Record::with_id("a").field("v", 1)).await.unwrap();
    notes.save(Record::with_id("b").field("v", 2)).await.unwrap();
    assert_eq!(notes.sync_count(false), 2);

    notes.remove("a").await.unwrap();
    let pending = notes.pending_writes();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].entity_id, "b");
    assert_eq!(pending[0].action, PendingAction::Create);

    assert_eq!(notes.push().await.unwrap().count, 1);
    assert_eq!(notes.sync_count(false), 0);
    assert!(fx.remote.get("notes", "a").is_none());
    assert_eq!(fx.remote.get("notes", "b").unwrap().get("v"), Some(&2.into()));
    assert_eq!(fx.remote.calls("remove"), 0);
}

#[tokio::test]
async fn remove_then_save_restores_an_update() {
    let fx = Fixture::new();
    fx.remote.insert("notes", Record::with_id("a"));
    let notes = fx.store("notes", StoreMode::Sync);
    notes.pull(None).await.unwrap();

    notes.remove("a").await.unwrap();
    notes
        .save(Record::with_id("a").field("v", 5))
        .await
        .unwrap();

    let pending = notes.pending_writes();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].action, PendingAction::Update);
}

#[tokio::test]
async fn removing_an_unknown_id_is_a_no_op() {
    let fx = Fixture::new();
    let notes = fx.store("notes", StoreMode::Sync);

    assert_eq!(notes.remove("ghost").await.unwrap().count, 0);
    assert_eq!(notes.sync_count(false), 0);
}

#[tokio::test]
async fn remove_by_query_queues_deletes() {
    let fx = Fixture::new();
    for (id, n) in [("a", 1), ("b", 2), ("c", 3)] {
        fx.remote.insert("nums", Record::with_id(id).field("n", n));
    }
    let nums = fx.store("nums", StoreMode::Sync);
    nums.pull(None).await.unwrap();

    let query = Query::new().filter(Predicate::gte("n", 2));
    let removed = nums.remove_by_query(Some(&query)).await.unwrap();
    assert_eq!(removed.count, 2);
    assert_eq!(nums.get_count().await.unwrap(), 1);
    assert!(nums
        .pending_writes()
        .iter()
        .all(|e| e.action == PendingAction::Delete));

    nums.push().await.unwrap();
    assert_eq!(fx.remote.len("nums"), 1);
}

#[tokio::test]
async fn sync_counts_span_collections() {
    let fx = Fixture::new();
    let books = fx.store("books", StoreMode::Sync);
    let films = fx.store("films", StoreMode::Sync);

    books.save(Record::with_id("b1")).await.unwrap();
    films.save(Record::with_id("f1")).await.unwrap();
    films.save(Record::with_id("f2")).await.unwrap();

    assert_eq!(books.sync_count(false), 1);
    assert_eq!(books.sync_count(true), 3);
    assert_eq!(fx.client.sync_count(), 3);
    assert_eq!(fx.client.pending_writes().len(), 3);
}

#[tokio::test]
async fn purge_discards_matching_pending_writes_only() {
    let fx = Fixture::new();
    let tasks = fx.store("tasks", StoreMode::Sync);
    tasks
        .save(Record::with_id("t1").field("done", true))
        .await
        .unwrap();
    tasks
        .save(Record::with_id("t2").field("done", false))
        .await
        .unwrap();

    let done = Query::new().filter(Predicate::is_true("done"));
    assert_eq!(tasks.purge(Some(&done)).await.unwrap(), 1);
    assert_eq!(tasks.sync_count(false), 1);
    assert_eq!(tasks.pending_writes()[0].entity_id, "t2");

    // The cache is untouched.
    assert!(tasks.find_by_id("t1").await.unwrap().is_some());

    assert_eq!(tasks.purge(None).await.unwrap(), 1);
    assert_eq!(tasks.sync_count(false), 0);
    assert_eq!(tasks.get_count().await.unwrap(), 2);
}

#[tokio::test]
async fn clear_cache_drops_records_and_their_pending_writes() {
    let fx = Fixture::new();
    let tasks = fx.store("tasks", StoreMode::Sync);
    for (id, done) in [("t1", true), ("t2", false), ("t3", true)] {
        tasks
            .save(Record::with_id(id).field("done", done))
            .await
            .unwrap();
    }

    let done = Query::new().filter(Predicate::is_true("done"));
    let cleared = tasks.clear_cache(Some(&done)).await.unwrap();
    assert_eq!(cleared.count, 2);
    assert_eq!(tasks.get_count().await.unwrap(), 1);
    assert_eq!(tasks.sync_count(false), 1);

    let cleared = tasks.clear_cache(None).await.unwrap();
    assert_eq!(cleared.count, 1);
    assert_eq!(tasks.get_count().await.unwrap(), 0);
    assert_eq!(tasks.sync_count(false), 0);
}

#[tokio::test]
async fn reserved_collection_names_are_rejected() {
    let fx = Fixture::new();
    let err = fx
        .client
        .store("_ebb.pending", ebb_sync::StoreConfig::sync())
        .unwrap_err();
    assert!(err.is_validation());
    assert!(fx.client.store("", ebb_sync::StoreConfig::sync()).is_err());
}
