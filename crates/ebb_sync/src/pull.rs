//! Fetching remote changes into the cache.

use crate::client::StoreContext;
use crate::error::{SyncError, SyncResult};
use crate::result::PullResult;
use ebb_core::{Record, RemoteQuery, WriteBatch};
use std::collections::HashSet;

/// Pulls the entities selected by `query` into the cache.
///
/// The caller holds the collection's sync gate. Requires a clean pending
/// log. Paged queries go through `find` and neither evict nor move a
/// cursor; everything else uses the remote pull, incremental when
/// `delta` is set and a cursor exists for the query's fingerprint.
pub(crate) async fn pull(ctx: &StoreContext, query: &RemoteQuery, delta: bool) -> SyncResult<PullResult> {
    let collection = ctx.collection.as_str();
    let pending = ctx.log.count(collection, false);
    if pending > 0 {
        return Err(SyncError::PendingWrites {
            collection: collection.to_string(),
            pending,
        });
    }

    if query.is_paged() {
        let records = ctx.remote.find(collection, query).await?;
        let result = apply_page(ctx, records)?;
        tracing::info!(collection, count = result.count, "paged pull finished");
        return Ok(result);
    }

    let fingerprint = query.fingerprint();
    let since = if delta {
        ctx.tracker.cursor(collection, &fingerprint)
    } else {
        None
    };
    tracing::debug!(collection, %fingerprint, incremental = since.is_some(), "pull started");

    let response = ctx
        .remote
        .pull(collection, query.filter.as_ref(), since)
        .await?;

    let _guard = ctx.locks.write.lock();
    let mut batch = WriteBatch::new();
    let mut result = PullResult::default();

    let mut seen = HashSet::new();
    for record in response.changed {
        let Some(id) = record.id.clone() else { continue };
        seen.insert(id.clone());
        if ctx.log.get(collection, &id).is_some() {
            continue;
        }
        if ctx.cache.get(collection, &id)?.as_ref() == Some(&record) {
            continue;
        }
        ctx.cache.stage_put(&mut batch, collection, &record)?;
        result.count += 1;
        result.entities.push(record);
    }

    for id in &response.deleted_ids {
        if ctx.log.get(collection, id).is_none() && ctx.cache.contains(collection, id)? {
            ctx.cache.stage_delete(&mut batch, collection, id);
            result.count += 1;
        }
    }

    if since.is_none() {
        // A full answer: anything cached that matches but was not sent
        // is gone remotely.
        for cached in ctx.cache.matching(collection, query.filter.as_ref())? {
            let Some(id) = cached.id() else { continue };
            if !seen.contains(id) && ctx.log.get(collection, id).is_none() {
                ctx.cache.stage_delete(&mut batch, collection, id);
                result.count += 1;
            }
        }
    }

    let advanced = ctx
        .tracker
        .stage_advance(&mut batch, collection, &fingerprint, response.server_time)?;
    ctx.cache.apply(batch)?;
    if advanced {
        ctx.tracker
            .commit_advance(collection, &fingerprint, response.server_time);
    }

    tracing::info!(collection, count = result.count, "pull finished");
    Ok(result)
}

fn apply_page(ctx: &StoreContext, records: Vec<Record>) -> SyncResult<PullResult> {
    let collection = ctx.collection.as_str();
    let _guard = ctx.locks.write.lock();
    let mut batch = WriteBatch::new();
    let mut result = PullResult::default();

    for record in records {
        let Some(id) = record.id() else { continue };
        if ctx.log.get(collection, id).is_some() {
            continue;
        }
        if ctx.cache.get(collection, id)?.as_ref() == Some(&record) {
            continue;
        }
        ctx.cache.stage_put(&mut batch, collection, &record)?;
        result.count += 1;
        result.entities.push(record);
    }
    ctx.cache.apply(batch)?;
    Ok(result)
}
