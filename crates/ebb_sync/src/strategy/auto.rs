//! AUTO mode: remote first, cache when the remote cannot be reached.
//!
//! Only network failures fall back. Not-found answers and everything
//! rejected before the call surface unchanged.

use super::local::LocalStrategy;
use super::network::NetworkStrategy;
use crate::error::{SyncError, SyncResult};
use ebb_core::{is_local_id, AggregateResult, AggregateSpec, Filter, Record, RemoteQuery};

#[derive(Clone)]
pub(crate) struct AutoStrategy {
    network: NetworkStrategy,
    local: LocalStrategy,
    refresh_cache: bool,
    collection: String,
}

fn fall_back(collection: &str, operation: &str, err: &SyncError) {
    tracing::warn!(
        collection,
        operation,
        error = %err,
        "remote unreachable, using local cache"
    );
}

impl AutoStrategy {
    pub(crate) fn new(
        network: NetworkStrategy,
        local: LocalStrategy,
        refresh_cache: bool,
        collection: String,
    ) -> Self {
        Self {
            network,
            local,
            refresh_cache,
            collection,
        }
    }

    pub(crate) async fn find(&self, query: &RemoteQuery) -> SyncResult<Vec<Record>> {
        match self.network.find(query).await {
            Ok(records) => {
                if self.refresh_cache && !query.is_projected() {
                    self.local.refresh(&records)?;
                }
                Ok(records)
            }
            Err(err) if err.is_network() => {
                fall_back(&self.collection, "find", &err);
                self.local.find(query)
            }
            Err(err) => Err(err),
        }
    }

    pub(crate) async fn find_by_id(&self, id: &str) -> SyncResult<Option<Record>> {
        if is_local_id(id) {
            return self.local.find_by_id(id);
        }
        match self.network.find_by_id(id).await {
            Ok(found) => {
                if self.refresh_cache {
                    if let Some(record) = &found {
                        self.local.refresh(std::slice::from_ref(record))?;
                    }
                }
                Ok(found)
            }
            Err(err) if err.is_network() => {
                fall_back(&self.collection, "find_by_id", &err);
                self.local.find_by_id(id)
            }
            Err(err) => Err(err),
        }
    }

    pub(crate) async fn count(&self, filter: Option<&Filter>) -> SyncResult<u64> {
        match self.network.count(filter).await {
            Err(err) if err.is_network() => {
                fall_back(&self.collection, "count", &err);
                self.local.count(filter)
            }
            other => other,
        }
    }

    pub(crate) async fn aggregate(
        &self,
        spec: &AggregateSpec,
        filter: Option<&Filter>,
    ) -> SyncResult<Vec<AggregateResult>> {
        match self.network.aggregate(spec, filter).await {
            Err(err) if err.is_network() => {
                fall_back(&self.collection, "aggregate", &err);
                self.local.aggregate(spec, filter)
            }
            other => other,
        }
    }

    pub(crate) async fn save(&self, record: Record) -> SyncResult<Record> {
        let local_id = record.id.clone();
        let seen = self.local.pending_revision(local_id.as_deref());

        match self.network.save(&record).await {
            Ok(saved) => {
                self.local.mirror_save(local_id.as_deref(), seen, &saved)?;
                Ok(saved)
            }
            Err(err) if err.is_network() => {
                fall_back(&self.collection, "save", &err);
                self.local.save(record)
            }
            Err(err) => Err(err),
        }
    }

    pub(crate) async fn remove(&self, id: &str) -> SyncResult<u64> {
        let seen = self.local.pending_revision(Some(id));
        if is_local_id(id) {
            return self.local.remove(id);
        }

        match self.network.remove(id).await {
            Ok(removed) => {
                self.local.mirror_remove(id, seen)?;
                Ok(removed)
            }
            Err(err) if err.is_network() => {
                fall_back(&self.collection, "remove", &err);
                self.local.remove(id)
            }
            // Only ever created locally: settle it in the log.
            Err(err) if err.is_not_found() && seen.is_some() => self.local.remove(id),
            Err(err) => Err(err),
        }
    }

    pub(crate) async fn remove_by_filter(&self, filter: &Filter) -> SyncResult<u64> {
        match self.network.remove_by_filter(filter).await {
            Ok(removed) => {
                self.local.mirror_remove_matching(filter)?;
                Ok(removed)
            }
            Err(err) if err.is_network() => {
                fall_back(&self.collection, "remove_by_filter", &err);
                self.local.remove_by_filter(filter)
            }
            Err(err) => Err(err),
        }
    }
}
