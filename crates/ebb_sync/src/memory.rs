//! In-memory remote service.
//!
//! [`InMemoryRemote`] is a complete [`RemoteAdapter`]: it assigns ids,
//! stamps metadata from a strictly monotonic clock, keeps tombstones for
//! delta pulls and can be taken offline, slowed down or told to refuse
//! specific entities. Tests and demos use it in place of a real service.

use crate::error::{RemoteError, RemoteResult};
use crate::remote::{DeltaResponse, RemoteAdapter};
use async_trait::async_trait;
use chrono::{DateTime, Duration as TimeDelta, Utc};
use ebb_core::{aggregate, AggregateResult, AggregateSpec, Filter, Record, RemoteQuery};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct Stored {
    record: Record,
    changed_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct ServerState {
    collections: HashMap<String, BTreeMap<String, Stored>>,
    tombstones: HashMap<String, BTreeMap<String, DateTime<Utc>>>,
    clock: Option<DateTime<Utc>>,
    rejected_ids: HashSet<(String, String)>,
    rejected_filters: Vec<(String, Filter)>,
    calls: HashMap<&'static str, usize>,
}

impl ServerState {
    fn tick(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let next = match self.clock {
            Some(last) if now <= last => last + TimeDelta::microseconds(1),
            _ => now,
        };
        self.clock = Some(next);
        next
    }

    fn records(&self, collection: &str) -> Vec<Record> {
        self.collections
            .get(collection)
            .map(|c| c.values().map(|s| s.record.clone()).collect())
            .unwrap_or_default()
    }

    fn matching(&self, collection: &str, filter: Option<&Filter>) -> Vec<Record> {
        let mut records = self.records(collection);
        if let Some(filter) = filter {
            records.retain(|r| filter.matches(r));
        }
        records
    }

    fn is_rejected(&self, collection: &str, record: &Record) -> bool {
        let by_id = record.id().is_some_and(|id| {
            self.rejected_ids
                .contains(&(collection.to_string(), id.to_string()))
        });
        by_id
            || self
                .rejected_filters
                .iter()
                .any(|(c, f)| c == collection && f.matches(record))
    }

    fn remove(&mut self, collection: &str, id: &str) -> bool {
        let removed = self
            .collections
            .get_mut(collection)
            .and_then(|c| c.remove(id))
            .is_some();
        if removed {
            let at = self.tick();
            self.tombstones
                .entry(collection.to_string())
                .or_default()
                .insert(id.to_string(), at);
        }
        removed
    }

    fn store(&mut self, collection: &str, record: &Record) -> Record {
        let now = self.tick();
        let id = record
            .id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let entities = self.collections.entry(collection.to_string()).or_default();

        let mut stored = record.clone();
        stored.id = Some(id.clone());
        stored.metadata.entity_creation_time = entities
            .get(&id)
            .and_then(|s| s.record.metadata.entity_creation_time)
            .or(Some(now));
        stored.metadata.last_modified = Some(now);

        entities.insert(
            id.clone(),
            Stored {
                record: stored.clone(),
                changed_at: now,
            },
        );
        if let Some(tombstones) = self.tombstones.get_mut(collection) {
            tombstones.remove(&id);
        }
        stored
    }
}

/// A remote service living in process memory.
#[derive(Debug)]
pub struct InMemoryRemote {
    state: Mutex<ServerState>,
    online: AtomicBool,
    latency: Mutex<Option<Duration>>,
}

impl Default for InMemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRemote {
    /// Creates an empty, reachable service.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ServerState::default()),
            online: AtomicBool::new(true),
            latency: Mutex::new(None),
        }
    }

    /// Makes the service reachable or unreachable.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Returns true if the service is reachable.
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Delays every call by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock() = latency;
    }

    /// Refuses saves and removals of one entity.
    pub fn reject_entity(&self, collection: &str, id: &str) {
        self.state
            .lock()
            .rejected_ids
            .insert((collection.to_string(), id.to_string()));
    }

    /// Refuses saves of records matching `filter`.
    pub fn reject_matching(&self, collection: &str, filter: Filter) {
        self.state
            .lock()
            .rejected_filters
            .push((collection.to_string(), filter));
    }

    /// Lifts every rejection.
    pub fn accept_all(&self) {
        let mut state = self.state.lock();
        state.rejected_ids.clear();
        state.rejected_filters.clear();
    }

    /// Stores a record out of band, as another client would.
    pub fn insert(&self, collection: &str, record: Record) -> Record {
        self.state.lock().store(collection, &record)
    }

    /// Deletes a record out of band.
    pub fn delete(&self, collection: &str, id: &str) -> bool {
        self.state.lock().remove(collection, id)
    }

    /// Reads a record directly.
    pub fn get(&self, collection: &str, id: &str) -> Option<Record> {
        self.state
            .lock()
            .collections
            .get(collection)
            .and_then(|c| c.get(id))
            .map(|s| s.record.clone())
    }

    /// Returns every record of a collection, ordered by id.
    pub fn records(&self, collection: &str) -> Vec<Record> {
        self.state.lock().records(collection)
    }

    /// Number of records in a collection.
    pub fn len(&self, collection: &str) -> usize {
        self.state
            .lock()
            .collections
            .get(collection)
            .map_or(0, BTreeMap::len)
    }

    /// Returns true if a collection holds no records.
    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    /// Number of calls made to an adapter operation (`"find"`, `"save"`,
    /// ...), including refused ones.
    pub fn calls(&self, operation: &str) -> usize {
        self.state.lock().calls.get(operation).copied().unwrap_or(0)
    }

    async fn enter(&self, operation: &'static str) -> RemoteResult<()> {
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        *self.state.lock().calls.entry(operation).or_insert(0) += 1;

        if self.is_online() {
            Ok(())
        } else {
            Err(RemoteError::unreachable(format!(
                "{operation}: remote service is offline"
            )))
        }
    }
}

#[async_trait]
impl RemoteAdapter for InMemoryRemote {
    async fn find(&self, collection: &str, query: &RemoteQuery) -> RemoteResult<Vec<Record>> {
        self.enter("find").await?;
        let records = self.state.lock().records(collection);
        Ok(query.apply(records))
    }

    async fn find_by_id(&self, collection: &str, id: &str) -> RemoteResult<Record> {
        self.enter("find_by_id").await?;
        self.get(collection, id)
            .ok_or_else(|| RemoteError::not_found(collection, id))
    }

    async fn count(&self, collection: &str, filter: Option<&Filter>) -> RemoteResult<u64> {
        self.enter("count").await?;
        Ok(self.state.lock().matching(collection, filter).len() as u64)
    }

    async fn save(&self, collection: &str, record: &Record) -> RemoteResult<Record> {
        self.enter("save").await?;
        let mut state = self.state.lock();
        if state.is_rejected(collection, record) {
            return Err(RemoteError::rejected(format!(
                "save of {} refused",
                record.id().unwrap_or("new entity")
            )));
        }
        Ok(state.store(collection, record))
    }

    async fn remove_by_id(&self, collection: &str, id: &str) -> RemoteResult<u64> {
        self.enter("remove").await?;
        let mut state = self.state.lock();
        if state
            .rejected_ids
            .contains(&(collection.to_string(), id.to_string()))
        {
            return Err(RemoteError::rejected(format!("removal of {id} refused")));
        }
        if state.remove(collection, id) {
            Ok(1)
        } else {
            Err(RemoteError::not_found(collection, id))
        }
    }

    async fn remove_by_filter(&self, collection: &str, filter: &Filter) -> RemoteResult<u64> {
        self.enter("remove").await?;
        let mut state = self.state.lock();
        let ids: Vec<String> = state
            .matching(collection, Some(filter))
            .into_iter()
            .filter_map(|r| r.id)
            .collect();
        let mut removed = 0;
        for id in ids {
            if state.remove(collection, &id) {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn aggregate(
        &self,
        collection: &str,
        spec: &AggregateSpec,
        filter: Option<&Filter>,
    ) -> RemoteResult<Vec<AggregateResult>> {
        self.enter("aggregate").await?;
        let records = self.state.lock().matching(collection, filter);
        Ok(aggregate(&records, spec))
    }

    async fn pull(
        &self,
        collection: &str,
        filter: Option<&Filter>,
        since: Option<DateTime<Utc>>,
    ) -> RemoteResult<DeltaResponse> {
        self.enter("pull").await?;
        let mut state = self.state.lock();
        let server_time = state.tick();

        let Some(since) = since else {
            return Ok(DeltaResponse {
                changed: state.matching(collection, filter),
                deleted_ids: Vec::new(),
                server_time,
            });
        };

        let changed = state
            .collections
            .get(collection)
            .map(|c| {
                c.values()
                    .filter(|s| s.changed_at > since)
                    .filter(|s| filter.is_none_or(|f| f.matches(&s.record)))
                    .map(|s| s.record.clone())
                    .collect()
            })
            .unwrap_or_default();
        let deleted_ids = state
            .tombstones
            .get(collection)
            .map(|t| {
                t.iter()
                    .filter(|(_, at)| **at > since)
                    .map(|(id, _)| id.clone())
                    .collect()
            })
            .unwrap_or_default();

        Ok(DeltaResponse {
            changed,
            deleted_ids,
            server_time,
        })
    }
}
