//! SYNC mode: the local cache and pending write log.
//!
//! Every mutation here is one unit under the collection's write guard:
//! the cache change is staged into a batch and committed together with
//! the log merge.

use crate::client::StoreContext;
use crate::error::SyncResult;
use chrono::Utc;
use ebb_core::{
    aggregate, generate_local_id, is_local_id, AggregateResult, AggregateSpec, Filter,
    PendingAction, Record, RemoteQuery, WriteBatch,
};
use std::sync::Arc;

#[derive(Clone)]
pub(crate) struct LocalStrategy {
    ctx: Arc<StoreContext>,
}

impl LocalStrategy {
    pub(crate) fn new(ctx: Arc<StoreContext>) -> Self {
        Self { ctx }
    }

    fn collection(&self) -> &str {
        &self.ctx.collection
    }

    pub(crate) fn find(&self, query: &RemoteQuery) -> SyncResult<Vec<Record>> {
        Ok(self.ctx.cache.find(self.collection(), query)?)
    }

    pub(crate) fn find_by_id(&self, id: &str) -> SyncResult<Option<Record>> {
        Ok(self.ctx.cache.get(self.collection(), id)?)
    }

    pub(crate) fn count(&self, filter: Option<&Filter>) -> SyncResult<u64> {
        Ok(self.ctx.cache.count(self.collection(), filter)?)
    }

    pub(crate) fn aggregate(
        &self,
        spec: &AggregateSpec,
        filter: Option<&Filter>,
    ) -> SyncResult<Vec<AggregateResult>> {
        let records = self.ctx.cache.matching(self.collection(), filter)?;
        Ok(aggregate(&records, spec))
    }

    /// Writes the record to the cache and merges a create or update into
    /// the log. Records without an id get a local one.
    pub(crate) fn save(&self, mut record: Record) -> SyncResult<Record> {
        let collection = self.collection();
        let _guard = self.ctx.locks.write.lock();

        let id = match record.id.clone() {
            Some(id) => id,
            None => {
                let id = generate_local_id();
                record.id = Some(id.clone());
                id
            }
        };
        let action = if is_local_id(&id) || !self.ctx.cache.contains(collection, &id)? {
            PendingAction::Create
        } else {
            PendingAction::Update
        };
        record.touch(Utc::now());

        let mut batch = WriteBatch::new();
        self.ctx.cache.stage_put(&mut batch, collection, &record)?;
        let outcome = self.ctx.log.enqueue_with(batch, collection, &id, action)?;
        tracing::debug!(collection, id = %id, ?outcome, "saved locally");
        Ok(record)
    }

    /// Removes the entity from the cache and merges a delete into the log.
    pub(crate) fn remove(&self, id: &str) -> SyncResult<u64> {
        let _guard = self.ctx.locks.write.lock();
        self.remove_locked(id)
    }

    pub(crate) fn remove_by_filter(&self, filter: &Filter) -> SyncResult<u64> {
        let _guard = self.ctx.locks.write.lock();
        let mut removed = 0;
        for record in self.ctx.cache.matching(self.collection(), Some(filter))? {
            if let Some(id) = record.id() {
                removed += self.remove_locked(id)?;
            }
        }
        Ok(removed)
    }

    fn remove_locked(&self, id: &str) -> SyncResult<u64> {
        let collection = self.collection();
        let cached = self.ctx.cache.contains(collection, id)?;
        let pending = self.ctx.log.get(collection, id);
        if !cached && pending.is_none() {
            return Ok(0);
        }

        let mut batch = WriteBatch::new();
        if cached {
            self.ctx.cache.stage_delete(&mut batch, collection, id);
        }
        if is_local_id(id) && pending.is_none() {
            self.ctx.cache.apply(batch)?;
        } else {
            let outcome = self
                .ctx
                .log
                .enqueue_with(batch, collection, id, PendingAction::Delete)?;
            tracing::debug!(collection, id, ?outcome, "removed locally");
        }
        Ok(u64::from(cached))
    }

    /// Upserts remote read results. Entities with pending writes keep
    /// their local version. Returns how many were written.
    pub(crate) fn refresh(&self, records: &[Record]) -> SyncResult<usize> {
        let collection = self.collection();
        let _guard = self.ctx.locks.write.lock();

        let mut batch = WriteBatch::new();
        let mut written = 0;
        for record in records {
            let Some(id) = record.id() else { continue };
            if self.ctx.log.get(collection, id).is_some() {
                continue;
            }
            self.ctx.cache.stage_put(&mut batch, collection, record)?;
            written += 1;
        }
        self.ctx.cache.apply(batch)?;
        Ok(written)
    }

    /// Revision of the entity's pending entry, if any.
    pub(crate) fn pending_revision(&self, id: Option<&str>) -> Option<u64> {
        id.and_then(|id| self.ctx.log.get(self.collection(), id))
            .map(|entry| entry.revision)
    }

    /// Mirrors a save the remote accepted directly.
    ///
    /// See [`settle_saved`]; `seen_revision` is the revision of the
    /// entity's pending entry when the call was made.
    pub(crate) fn mirror_save(
        &self,
        local_id: Option<&str>,
        seen_revision: Option<u64>,
        saved: &Record,
    ) -> SyncResult<()> {
        settle_saved(&self.ctx, local_id, seen_revision, saved)
    }

    /// Mirrors a removal the remote performed directly.
    pub(crate) fn mirror_remove(&self, id: &str, seen_revision: Option<u64>) -> SyncResult<()> {
        let collection = self.collection();
        let _guard = self.ctx.locks.write.lock();
        if self.pending_revision(Some(id)) != seen_revision {
            return Ok(());
        }

        let mut batch = WriteBatch::new();
        self.ctx.cache.stage_delete(&mut batch, collection, id);
        if seen_revision.is_some() {
            self.ctx.log.remove_with(batch, collection, id)?;
        } else {
            self.ctx.cache.apply(batch)?;
        }
        Ok(())
    }

    /// Mirrors a removal by filter the remote performed directly.
    pub(crate) fn mirror_remove_matching(&self, filter: &Filter) -> SyncResult<usize> {
        let collection = self.collection();
        let _guard = self.ctx.locks.write.lock();

        let ids: Vec<String> = self
            .ctx
            .cache
            .matching(collection, Some(filter))?
            .into_iter()
            .filter_map(|record| record.id)
            .collect();
        let mut batch = WriteBatch::new();
        for id in &ids {
            self.ctx.cache.stage_delete(&mut batch, collection, id);
        }
        self.ctx.log.remove_many_with(batch, collection, &ids)?;
        Ok(ids.len())
    }
}

/// Brings the cache and log in line with a save the remote accepted.
///
/// `local_id` is the id the entity had locally when the call was made and
/// `seen_revision` the revision of its pending entry at that time. The
/// cache takes the remote version, re-keyed to the server id. An entry
/// untouched since the call is dropped. An entry that moved while the
/// call was in flight is kept and re-keyed; since the remote now holds
/// the entity, it is owed an update, or a delete if it was removed.
pub(crate) fn settle_saved(
    ctx: &StoreContext,
    local_id: Option<&str>,
    seen_revision: Option<u64>,
    saved: &Record,
) -> SyncResult<()> {
    let collection = ctx.collection.as_str();
    let Some(server_id) = saved.id().or(local_id).map(str::to_string) else {
        return Ok(());
    };
    let mut saved = saved.clone();
    saved.id = Some(server_id.clone());
    let stale = local_id.filter(|old| *old != server_id);

    let _guard = ctx.locks.write.lock();
    let current = local_id.and_then(|id| ctx.log.get(collection, id));
    let mut batch = WriteBatch::new();

    match (current, local_id) {
        (Some(current), Some(old)) if Some(current.revision) == seen_revision => {
            if let Some(stale) = stale {
                ctx.cache.stage_delete(&mut batch, collection, stale);
            }
            ctx.cache.stage_put(&mut batch, collection, &saved)?;
            ctx.log.remove_with(batch, collection, old)?;
        }
        (Some(current), Some(old)) => {
            let action = match current.action {
                PendingAction::Delete => PendingAction::Delete,
                PendingAction::Create | PendingAction::Update => PendingAction::Update,
            };
            if let Some(stale) = stale {
                if let Some(mut local) = ctx.cache.get(collection, stale)? {
                    ctx.cache.stage_delete(&mut batch, collection, stale);
                    local.id = Some(server_id.clone());
                    ctx.cache.stage_put(&mut batch, collection, &local)?;
                }
            }
            ctx.log
                .rekey_with(batch, collection, old, &server_id, action)?;
            tracing::debug!(collection, local_id = old, server_id = %server_id, %action, "entity changed while saving remotely");
        }
        _ => {
            // Nothing pending now. Without an entry at call time this is a
            // plain mirror; otherwise the entry was purged or cleared in
            // flight and only a still-cached copy is refreshed.
            let cached = match local_id {
                Some(id) => ctx.cache.contains(collection, id)?,
                None => false,
            };
            if seen_revision.is_none() || cached {
                if let Some(stale) = stale {
                    ctx.cache.stage_delete(&mut batch, collection, stale);
                }
                ctx.cache.stage_put(&mut batch, collection, &saved)?;
                ctx.cache.apply(batch)?;
            }
        }
    }
    Ok(())
}
