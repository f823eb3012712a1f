//! Draining the pending write log.
//!
//! Entries are pushed one by one in enqueue order. Each remote call is
//! followed by a settle step under the collection's write guard, so a
//! cancelled push leaves every entity either fully acknowledged or still
//! pending. An entry that changed while its call was in flight (its
//! revision moved) is kept and re-targeted instead of being dropped.

use crate::client::StoreContext;
use crate::error::{PushError, PushFailure, SyncResult};
use crate::result::PushResult;
use crate::strategy::settle_saved;
use ebb_core::{PendingAction, PendingWriteAction, WriteBatch};

/// Pushes every pending entry of the context's collection.
///
/// The caller holds the collection's sync gate.
pub(crate) async fn push(ctx: &StoreContext) -> SyncResult<PushResult> {
    let collection = ctx.collection.as_str();
    let entries = ctx.log.get_all(collection);
    if entries.is_empty() {
        return Ok(PushResult::default());
    }
    tracing::debug!(collection, entries = entries.len(), "push started");

    let mut result = PushResult::default();
    for entry in entries {
        let outcome = match entry.action {
            PendingAction::Create | PendingAction::Update => push_save(ctx, &entry).await,
            PendingAction::Delete => push_delete(ctx, &entry).await,
        };
        match outcome {
            Ok(Settled::Pushed) => result.count += 1,
            Ok(Settled::Discarded) => result.discarded += 1,
            Err(failure) => {
                tracing::warn!(
                    collection,
                    entity_id = %failure.entity_id,
                    action = %failure.action,
                    error = %failure.error,
                    "push failed for entity"
                );
                result.errors.push(failure);
            }
        }
    }

    tracing::info!(
        collection,
        pushed = result.count,
        discarded = result.discarded,
        failed = result.errors.len(),
        "push finished"
    );
    if result.is_complete() {
        Ok(result)
    } else {
        Err(PushError { result }.into())
    }
}

enum Settled {
    Pushed,
    Discarded,
}

type EntityOutcome = Result<Settled, PushFailure>;

fn failure(entry: &PendingWriteAction, error: crate::RemoteError) -> PushFailure {
    PushFailure {
        entity_id: entry.entity_id.clone(),
        action: entry.action,
        error,
    }
}

/// A local failure while settling is reported against the entity; the
/// entry stays in the log.
fn local_failure(entry: &PendingWriteAction, err: &crate::SyncError) -> PushFailure {
    failure(
        entry,
        crate::RemoteError::transport(format!("local settle failed: {err}")),
    )
}

async fn push_save(ctx: &StoreContext, entry: &PendingWriteAction) -> EntityOutcome {
    let collection = ctx.collection.as_str();
    let record = match ctx.cache.get(collection, &entry.entity_id) {
        Ok(Some(record)) => record,
        Ok(None) => {
            // Nothing left to send; the entry is stale.
            tracing::warn!(collection, entity_id = %entry.entity_id, "pending entity missing from cache");
            return settle_stale(ctx, entry)
                .map(|()| Settled::Discarded)
                .map_err(|e| local_failure(entry, &e));
        }
        Err(err) => return Err(local_failure(entry, &err.into())),
    };

    let saved = ctx
        .remote
        .save(collection, &record.for_remote())
        .await
        .map_err(|e| failure(entry, e))?;
    settle_saved(ctx, Some(&entry.entity_id), Some(entry.revision), &saved)
        .map(|()| Settled::Pushed)
        .map_err(|e| local_failure(entry, &e))
}

async fn push_delete(ctx: &StoreContext, entry: &PendingWriteAction) -> EntityOutcome {
    match ctx
        .remote
        .remove_by_id(&ctx.collection, &entry.entity_id)
        .await
    {
        Ok(_) => {}
        Err(err) if err.is_not_found() => {
            tracing::debug!(entity_id = %entry.entity_id, "already absent remotely");
        }
        Err(err) => return Err(failure(entry, err)),
    }
    settle_stale(ctx, entry)
        .map(|()| Settled::Pushed)
        .map_err(|e| local_failure(entry, &e))
}

/// Drops the entry if it has not moved since it was read.
fn settle_stale(ctx: &StoreContext, entry: &PendingWriteAction) -> SyncResult<()> {
    let _guard = ctx.locks.write.lock();
    let current = ctx.log.get(&ctx.collection, &entry.entity_id);
    if current.is_some_and(|c| c.revision == entry.revision) {
        ctx.log
            .remove_with(WriteBatch::new(), &ctx.collection, &entry.entity_id)?;
    }
    Ok(())
}
