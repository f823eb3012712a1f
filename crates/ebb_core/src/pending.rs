//! Pending write log.
//!
//! The log records, per `(collection, entity id)`, the one mutation still
//! owed to the remote. Repeated local edits coalesce through
//! [`merge_actions`], so the log never holds more than one entry per
//! entity and never ships a create-then-delete pair.
//!
//! Entries are persisted in the reserved `_ebb.pending` namespace and
//! mirrored in memory for O(1) merges. Every mutation is committed
//! together with a caller-supplied [`WriteBatch`], which is how a cache
//! write and its log entry become one durable unit.

use crate::codec;
use crate::error::CoreResult;
use chrono::{DateTime, Utc};
use ebb_storage::{DocumentBackend, WriteBatch};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

const NAMESPACE: &str = "_ebb.pending";
const KEY_SEPARATOR: char = '\u{1f}';

/// The mutation owed to the remote for one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PendingAction {
    /// The remote has never seen this entity.
    Create,
    /// The remote holds an older version.
    Update,
    /// The remote holds an entity that was deleted locally.
    Delete,
}

impl std::fmt::Display for PendingAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PendingAction::Create => "create",
            PendingAction::Update => "update",
            PendingAction::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// Coalesces an incoming action with the entity's existing one.
///
/// Returns `None` when the two cancel out (a local create deleted before
/// it was ever pushed).
pub fn merge_actions(
    existing: Option<PendingAction>,
    incoming: PendingAction,
) -> Option<PendingAction> {
    use PendingAction::{Create, Delete, Update};

    match (existing, incoming) {
        (None, action) => Some(action),
        (Some(Create), Create | Update) => Some(Create),
        (Some(Create), Delete) => None,
        (Some(Update), Create | Update) => Some(Update),
        (Some(Update), Delete) => Some(Delete),
        (Some(Delete), Create | Update) => Some(Update),
        (Some(Delete), Delete) => Some(Delete),
    }
}

/// One outstanding mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingWriteAction {
    /// Collection of the entity.
    pub collection: String,
    /// Entity id.
    pub entity_id: String,
    /// Coalesced action.
    pub action: PendingAction,
    /// When the entity first entered the log.
    pub enqueued_at: DateTime<Utc>,
    /// Enqueue order, kept across merges.
    pub sequence: u64,
    /// Changes on every merge; lets a push tell whether the entry moved
    /// while its remote call was in flight.
    pub revision: u64,
}

/// What an enqueue did to the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// A new entry was created.
    Inserted(PendingAction),
    /// An existing entry was merged.
    Merged {
        /// Action before the merge.
        from: PendingAction,
        /// Action after the merge.
        to: PendingAction,
    },
    /// The existing entry was cancelled and removed.
    Cancelled,
}

type EntryKey = (String, String);

#[derive(Default)]
struct LogState {
    entries: HashMap<EntryKey, PendingWriteAction>,
    next_sequence: u64,
    next_revision: u64,
}

impl LogState {
    fn revision(&mut self) -> u64 {
        self.next_revision += 1;
        self.next_revision
    }

    fn sequence(&mut self) -> u64 {
        self.next_sequence += 1;
        self.next_sequence
    }
}

fn storage_key(collection: &str, entity_id: &str) -> String {
    format!("{collection}{KEY_SEPARATOR}{entity_id}")
}

fn entry_key(collection: &str, entity_id: &str) -> EntryKey {
    (collection.to_string(), entity_id.to_string())
}

/// The persistent, coalescing pending write log.
pub struct PendingWriteLog {
    backend: Arc<dyn DocumentBackend>,
    state: Mutex<LogState>,
}

impl PendingWriteLog {
    /// Opens the log stored in `backend`, loading persisted entries.
    pub fn open(backend: Arc<dyn DocumentBackend>) -> CoreResult<Self> {
        let mut state = LogState::default();
        for (_, bytes) in backend.scan(NAMESPACE)? {
            let entry: PendingWriteAction = codec::decode(&bytes)?;
            state.next_sequence = state.next_sequence.max(entry.sequence);
            state.next_revision = state.next_revision.max(entry.revision);
            state
                .entries
                .insert(entry_key(&entry.collection, &entry.entity_id), entry);
        }
        tracing::debug!(entries = state.entries.len(), "pending write log opened");

        Ok(Self {
            backend,
            state: Mutex::new(state),
        })
    }

    /// Enqueues an action on its own.
    pub fn enqueue(
        &self,
        collection: &str,
        entity_id: &str,
        action: PendingAction,
    ) -> CoreResult<EnqueueOutcome> {
        self.enqueue_with(WriteBatch::new(), collection, entity_id, action)
    }

    /// Merges an action into the log and commits it together with `batch`.
    ///
    /// The in-memory log only changes once the combined batch is durable.
    pub fn enqueue_with(
        &self,
        mut batch: WriteBatch,
        collection: &str,
        entity_id: &str,
        action: PendingAction,
    ) -> CoreResult<EnqueueOutcome> {
        let mut state = self.state.lock();
        let key = entry_key(collection, entity_id);
        let existing = state.entries.get(&key).cloned();
        let merged = merge_actions(existing.as_ref().map(|e| e.action), action);

        let (outcome, next) = match (existing, merged) {
            (_, None) => (EnqueueOutcome::Cancelled, None),
            (None, Some(action)) => {
                let entry = PendingWriteAction {
                    collection: collection.to_string(),
                    entity_id: entity_id.to_string(),
                    action,
                    enqueued_at: Utc::now(),
                    sequence: state.sequence(),
                    revision: state.revision(),
                };
                (EnqueueOutcome::Inserted(action), Some(entry))
            }
            (Some(previous), Some(action)) => {
                let from = previous.action;
                let entry = PendingWriteAction {
                    action,
                    revision: state.revision(),
                    ..previous
                };
                (EnqueueOutcome::Merged { from, to: action }, Some(entry))
            }
        };

        let storage = storage_key(collection, entity_id);
        match &next {
            Some(entry) => batch.put(NAMESPACE, storage, codec::encode(entry)?),
            None => batch.delete(NAMESPACE, storage),
        }
        self.backend.apply(batch)?;

        match next {
            Some(entry) => {
                state.entries.insert(key, entry);
            }
            None => {
                state.entries.remove(&key);
            }
        }
        tracing::trace!(collection, entity_id, ?outcome, "pending write enqueued");
        Ok(outcome)
    }

    /// Returns the oldest entry of a collection.
    pub fn peek(&self, collection: &str) -> Option<PendingWriteAction> {
        self.state
            .lock()
            .entries
            .values()
            .filter(|e| e.collection == collection)
            .min_by_key(|e| e.sequence)
            .cloned()
    }

    /// Returns the entry of one entity.
    pub fn get(&self, collection: &str, entity_id: &str) -> Option<PendingWriteAction> {
        self.state
            .lock()
            .entries
            .get(&entry_key(collection, entity_id))
            .cloned()
    }

    /// Returns a collection's entries in enqueue order.
    pub fn get_all(&self, collection: &str) -> Vec<PendingWriteAction> {
        let mut entries: Vec<_> = self
            .state
            .lock()
            .entries
            .values()
            .filter(|e| e.collection == collection)
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.sequence);
        entries
    }

    /// Returns every entry in enqueue order.
    pub fn get_all_collections(&self) -> Vec<PendingWriteAction> {
        let mut entries: Vec<_> = self.state.lock().entries.values().cloned().collect();
        entries.sort_by_key(|e| e.sequence);
        entries
    }

    /// Counts entries of `collection`, or of every collection.
    pub fn count(&self, collection: &str, include_all_collections: bool) -> usize {
        let state = self.state.lock();
        if include_all_collections {
            state.entries.len()
        } else {
            state
                .entries
                .values()
                .filter(|e| e.collection == collection)
                .count()
        }
    }

    /// Removes one entry on its own.
    pub fn remove(&self, collection: &str, entity_id: &str) -> CoreResult<Option<PendingWriteAction>> {
        self.remove_with(WriteBatch::new(), collection, entity_id)
    }

    /// Removes one entry, committing together with `batch`.
    pub fn remove_with(
        &self,
        batch: WriteBatch,
        collection: &str,
        entity_id: &str,
    ) -> CoreResult<Option<PendingWriteAction>> {
        let mut removed = self.remove_many_with(batch, collection, &[entity_id.to_string()])?;
        Ok(removed.pop())
    }

    /// Removes several entries of a collection, committing together with
    /// `batch`. Returns the removed entries.
    pub fn remove_many_with(
        &self,
        mut batch: WriteBatch,
        collection: &str,
        entity_ids: &[String],
    ) -> CoreResult<Vec<PendingWriteAction>> {
        let mut state = self.state.lock();
        let present: Vec<&String> = entity_ids
            .iter()
            .filter(|id| state.entries.contains_key(&entry_key(collection, id)))
            .collect();
        for id in &present {
            batch.delete(NAMESPACE, storage_key(collection, id));
        }
        self.backend.apply(batch)?;

        Ok(present
            .into_iter()
            .filter_map(|id| state.entries.remove(&entry_key(collection, id)))
            .collect())
    }

    /// Moves an entry to a new entity id with a new action, committing
    /// together with `batch`. The enqueue order is kept.
    ///
    /// Returns `false` (committing only `batch`) if no entry exists for
    /// `old_id`.
    pub fn rekey_with(
        &self,
        mut batch: WriteBatch,
        collection: &str,
        old_id: &str,
        new_id: &str,
        action: PendingAction,
    ) -> CoreResult<bool> {
        let mut state = self.state.lock();
        let old_key = entry_key(collection, old_id);
        let Some(previous) = state.entries.get(&old_key).cloned() else {
            self.backend.apply(batch)?;
            return Ok(false);
        };

        let entry = PendingWriteAction {
            entity_id: new_id.to_string(),
            action,
            revision: state.revision(),
            ..previous
        };
        batch.delete(NAMESPACE, storage_key(collection, old_id));
        batch.put(NAMESPACE, storage_key(collection, new_id), codec::encode(&entry)?);
        self.backend.apply(batch)?;

        state.entries.remove(&old_key);
        state.entries.insert(entry_key(collection, new_id), entry);
        Ok(true)
    }
}

impl std::fmt::Debug for PendingWriteLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingWriteLog")
            .field("entries", &self.state.lock().entries.len())
            .finish_non_exhaustive()
    }
}
