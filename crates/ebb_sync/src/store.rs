//! The per-collection store façade.

use crate::client::StoreContext;
use crate::config::{StoreConfig, StoreMode};
use crate::error::SyncResult;
use crate::pull;
use crate::push;
use crate::result::{DeleteResult, PullResult, PushResult, SyncReport};
use crate::strategy::Strategy;
use ebb_core::{
    require_predicate, translate, AggregateResult, AggregateSpec, PendingWriteAction, Query,
    Record, RemoteQuery,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A handle on one collection in one mode.
///
/// Every query is validated before the cache or the remote is touched, so
/// validation errors surface in every mode and never trigger an AUTO
/// fallback. Handles are cheap to clone; clones share the delta switch.
#[derive(Clone)]
pub struct DataStore {
    ctx: Arc<StoreContext>,
    strategy: Strategy,
    mode: StoreMode,
    delta: Arc<AtomicBool>,
}

impl DataStore {
    pub(crate) fn new(ctx: Arc<StoreContext>, config: &StoreConfig) -> Self {
        Self {
            strategy: Strategy::for_config(&ctx, config),
            ctx,
            mode: config.mode,
            delta: Arc::new(AtomicBool::new(config.delta_set_fetching)),
        }
    }

    /// Collection name.
    pub fn collection(&self) -> &str {
        &self.ctx.collection
    }

    /// Access mode.
    pub fn mode(&self) -> StoreMode {
        self.mode
    }

    /// Turns delta-set fetching on or off for this handle.
    pub fn set_delta_set_fetching(&self, enabled: bool) {
        self.delta.store(enabled, Ordering::SeqCst);
    }

    /// Returns true if pulls fetch incrementally.
    pub fn delta_set_fetching_enabled(&self) -> bool {
        self.delta.load(Ordering::SeqCst)
    }

    /// Returns the records matching `query`; all records without one.
    pub async fn find(&self, query: Option<&Query>) -> SyncResult<Vec<Record>> {
        let query = translate(query)?;
        self.strategy.find(&query).await
    }

    /// Returns one record.
    ///
    /// The cache answers `None` for an unknown id; the remote answers with
    /// a not-found error.
    pub async fn find_by_id(&self, id: &str) -> SyncResult<Option<Record>> {
        self.strategy.find_by_id(id).await
    }

    /// Creates or replaces a record and returns it as stored.
    pub async fn save(&self, record: Record) -> SyncResult<Record> {
        self.strategy.save(record).await
    }

    /// Removes one record.
    pub async fn remove(&self, id: &str) -> SyncResult<DeleteResult> {
        Ok(DeleteResult::new(self.strategy.remove(id).await?))
    }

    /// Removes every record matching `query`, which must filter.
    pub async fn remove_by_query(&self, query: Option<&Query>) -> SyncResult<DeleteResult> {
        let filter = require_predicate(query)?;
        Ok(DeleteResult::new(
            self.strategy.remove_by_filter(&filter).await?,
        ))
    }

    /// Counts every record.
    pub async fn get_count(&self) -> SyncResult<u64> {
        self.strategy.count(None).await
    }

    /// Counts the records matching `query`, which must filter.
    pub async fn get_count_by_query(&self, query: Option<&Query>) -> SyncResult<u64> {
        let filter = require_predicate(query)?;
        self.strategy.count(Some(&filter)).await
    }

    /// Groups and reduces records, optionally restricted by `query`.
    ///
    /// A query given here must filter.
    pub async fn group_and_aggregate(
        &self,
        spec: &AggregateSpec,
        query: Option<&Query>,
    ) -> SyncResult<Vec<AggregateResult>> {
        let filter = match query {
            Some(_) => Some(require_predicate(query)?),
            None => None,
        };
        self.strategy.aggregate(spec, filter.as_ref()).await
    }

    /// Sends every pending write of the collection to the remote.
    ///
    /// # Errors
    ///
    /// Fails with [`SyncError::Push`](crate::SyncError::Push) if any entity
    /// was not accepted; accepted ones are acknowledged regardless.
    pub async fn push(&self) -> SyncResult<PushResult> {
        let _gate = self.ctx.locks.sync_gate.lock().await;
        push::push(&self.ctx).await
    }

    /// Fetches remote changes for `query` into the cache.
    ///
    /// # Errors
    ///
    /// Fails with [`SyncError::PendingWrites`](crate::SyncError::PendingWrites)
    /// while the collection has unpushed writes.
    pub async fn pull(&self, query: Option<&Query>) -> SyncResult<PullResult> {
        let query = pull_query(query)?;
        let _gate = self.ctx.locks.sync_gate.lock().await;
        pull::pull(&self.ctx, &query, self.delta_set_fetching_enabled()).await
    }

    /// Pushes, then pulls `query`. A failed push skips the pull.
    pub async fn sync(&self, query: Option<&Query>) -> SyncResult<SyncReport> {
        let query = pull_query(query)?;
        let _gate = self.ctx.locks.sync_gate.lock().await;
        let push = push::push(&self.ctx).await?;
        let pull = pull::pull(&self.ctx, &query, self.delta_set_fetching_enabled()).await?;
        Ok(SyncReport { push, pull })
    }

    /// Pending writes of this collection, or of every collection.
    pub fn sync_count(&self, all_collections: bool) -> usize {
        self.ctx.log.count(&self.ctx.collection, all_collections)
    }

    /// This collection's pending writes in enqueue order.
    pub fn pending_writes(&self) -> Vec<PendingWriteAction> {
        self.ctx.log.get_all(&self.ctx.collection)
    }

    /// Discards pending writes whose cached entity matches `query` (all of
    /// them without one). The cache is left alone. Returns how many were
    /// discarded.
    pub async fn purge(&self, query: Option<&Query>) -> SyncResult<usize> {
        let query = translate(query)?;
        let _gate = self.ctx.locks.sync_gate.lock().await;
        let _guard = self.ctx.locks.write.lock();

        let collection = self.collection();
        let mut ids = Vec::new();
        for entry in self.ctx.log.get_all(collection) {
            let selected = match &query.filter {
                None => true,
                Some(filter) => self
                    .ctx
                    .cache
                    .get(collection, &entry.entity_id)?
                    .is_some_and(|record| filter.matches(&record)),
            };
            if selected {
                ids.push(entry.entity_id);
            }
        }

        let purged = self
            .ctx
            .log
            .remove_many_with(Default::default(), collection, &ids)?
            .len();
        tracing::info!(collection, purged, "pending writes purged");
        Ok(purged)
    }

    /// Removes cached records matching `query` (all without one) together
    /// with their pending writes, and resets the collection's delta
    /// cursors.
    pub async fn clear_cache(&self, query: Option<&Query>) -> SyncResult<DeleteResult> {
        let query = translate(query)?;
        let _gate = self.ctx.locks.sync_gate.lock().await;
        let _guard = self.ctx.locks.write.lock();

        let collection = self.collection();
        let ids: Vec<String> = self
            .ctx
            .cache
            .matching(collection, query.filter.as_ref())?
            .into_iter()
            .filter_map(|record| record.id)
            .collect();

        let mut batch = ebb_core::WriteBatch::new();
        for id in &ids {
            self.ctx.cache.stage_delete(&mut batch, collection, id);
        }
        self.ctx.tracker.stage_reset(&mut batch, collection);
        if query.filter.is_none() {
            // Pending deletes have no cached record to match.
            let pending: Vec<String> = self
                .ctx
                .log
                .get_all(collection)
                .into_iter()
                .map(|entry| entry.entity_id)
                .collect();
            self.ctx.log.remove_many_with(batch, collection, &pending)?;
        } else {
            self.ctx.log.remove_many_with(batch, collection, &ids)?;
        }
        self.ctx.tracker.commit_reset(collection);

        tracing::info!(collection, cleared = ids.len(), "cache cleared");
        Ok(DeleteResult::new(ids.len() as u64))
    }
}

/// Pull never projects; the cache keeps whole records.
fn pull_query(query: Option<&Query>) -> SyncResult<RemoteQuery> {
    let mut query = translate(query)?;
    query.fields = None;
    Ok(query)
}

impl std::fmt::Debug for DataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataStore")
            .field("collection", &self.ctx.collection)
            .field("mode", &self.mode)
            .field("delta_set_fetching", &self.delta_set_fetching_enabled())
            .finish_non_exhaustive()
    }
}
