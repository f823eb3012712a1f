//! Delta-set cursors.
//!
//! A cursor remembers, per `(collection, query fingerprint)`, the server
//! time of the last pull that completed for exactly that query. Cursors
//! live in the reserved `_ebb.delta` namespace and only ever move forward.

use crate::codec;
use crate::error::CoreResult;
use crate::filter::Fingerprint;
use chrono::{DateTime, Utc};
use ebb_storage::{DocumentBackend, WriteBatch};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

const NAMESPACE: &str = "_ebb.delta";
const KEY_SEPARATOR: char = '\u{1f}';

/// A stored delta cursor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaCursor {
    /// Collection the cursor belongs to.
    pub collection: String,
    /// Fingerprint of the query's filter.
    pub fingerprint: Fingerprint,
    /// Server time reported by the last successful pull.
    pub last_request_time: DateTime<Utc>,
}

type CursorKey = (String, Fingerprint);

fn storage_key(collection: &str, fingerprint: &Fingerprint) -> String {
    format!("{collection}{KEY_SEPARATOR}{fingerprint}")
}

/// Tracks delta cursors for every collection.
pub struct DeltaSetTracker {
    backend: Arc<dyn DocumentBackend>,
    cursors: RwLock<HashMap<CursorKey, DateTime<Utc>>>,
}

impl DeltaSetTracker {
    /// Opens the tracker stored in `backend`.
    pub fn open(backend: Arc<dyn DocumentBackend>) -> CoreResult<Self> {
        let mut cursors = HashMap::new();
        for (_, bytes) in backend.scan(NAMESPACE)? {
            let cursor: DeltaCursor = codec::decode(&bytes)?;
            cursors.insert(
                (cursor.collection, cursor.fingerprint),
                cursor.last_request_time,
            );
        }

        Ok(Self {
            backend,
            cursors: RwLock::new(cursors),
        })
    }

    /// Returns the cursor of a query, if one was recorded.
    pub fn cursor(&self, collection: &str, fingerprint: &Fingerprint) -> Option<DateTime<Utc>> {
        self.cursors
            .read()
            .get(&(collection.to_string(), fingerprint.clone()))
            .copied()
    }

    /// Stages a cursor move into `batch`.
    ///
    /// Returns false, staging nothing, if `time` is not newer than the
    /// current cursor. Follow a successful commit of the batch with
    /// [`DeltaSetTracker::commit_advance`].
    pub fn stage_advance(
        &self,
        batch: &mut WriteBatch,
        collection: &str,
        fingerprint: &Fingerprint,
        time: DateTime<Utc>,
    ) -> CoreResult<bool> {
        if self
            .cursor(collection, fingerprint)
            .is_some_and(|current| current >= time)
        {
            return Ok(false);
        }

        let cursor = DeltaCursor {
            collection: collection.to_string(),
            fingerprint: fingerprint.clone(),
            last_request_time: time,
        };
        batch.put(
            NAMESPACE,
            storage_key(collection, fingerprint),
            codec::encode(&cursor)?,
        );
        Ok(true)
    }

    /// Records a cursor move whose batch has been committed.
    pub fn commit_advance(&self, collection: &str, fingerprint: &Fingerprint, time: DateTime<Utc>) {
        let mut cursors = self.cursors.write();
        let slot = cursors
            .entry((collection.to_string(), fingerprint.clone()))
            .or_insert(time);
        if *slot < time {
            *slot = time;
        }
        tracing::debug!(collection, %fingerprint, %time, "delta cursor advanced");
    }

    /// Moves a cursor forward on its own. Returns true if it moved.
    pub fn advance(
        &self,
        collection: &str,
        fingerprint: &Fingerprint,
        time: DateTime<Utc>,
    ) -> CoreResult<bool> {
        let mut batch = WriteBatch::new();
        if !self.stage_advance(&mut batch, collection, fingerprint, time)? {
            return Ok(false);
        }
        self.backend.apply(batch)?;
        self.commit_advance(collection, fingerprint, time);
        Ok(true)
    }

    /// Drops every cursor of a collection. Returns how many were dropped.
    pub fn reset(&self, collection: &str) -> CoreResult<usize> {
        let mut batch = WriteBatch::new();
        let dropped = self.stage_reset(&mut batch, collection);
        if dropped == 0 {
            return Ok(0);
        }
        self.backend.apply(batch)?;
        self.commit_reset(collection);
        Ok(dropped)
    }

    /// Stages the deletion of every cursor of a collection into `batch`.
    ///
    /// Returns how many cursors were staged. Follow a successful commit of
    /// the batch with [`DeltaSetTracker::commit_reset`].
    pub fn stage_reset(&self, batch: &mut WriteBatch, collection: &str) -> usize {
        let cursors = self.cursors.read();
        let mut staged = 0;
        for (c, fingerprint) in cursors.keys().filter(|(c, _)| c == collection) {
            batch.delete(NAMESPACE, storage_key(c, fingerprint));
            staged += 1;
        }
        staged
    }

    /// Forgets every cursor of a collection whose deletion was committed.
    pub fn commit_reset(&self, collection: &str) {
        let mut cursors = self.cursors.write();
        let before = cursors.len();
        cursors.retain(|(c, _), _| c != collection);
        tracing::debug!(collection, dropped = before - cursors.len(), "delta cursors reset");
    }

    /// Returns every cursor of a collection.
    pub fn cursors(&self, collection: &str) -> Vec<DeltaCursor> {
        let mut cursors: Vec<DeltaCursor> = self
            .cursors
            .read()
            .iter()
            .filter(|((c, _), _)| c == collection)
            .map(|((c, fingerprint), time)| DeltaCursor {
                collection: c.clone(),
                fingerprint: fingerprint.clone(),
                last_request_time: *time,
            })
            .collect();
        cursors.sort_by(|a, b| a.fingerprint.cmp(&b.fingerprint));
        cursors
    }
}

impl std::fmt::Debug for DeltaSetTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeltaSetTracker")
            .field("cursors", &self.cursors.read().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::translate_predicate;
    use crate::query::Predicate;
    use chrono::Duration;
    use ebb_storage::InMemoryBackend;

    fn filtered() -> Fingerprint {
        Fingerprint::of(Some(&translate_predicate(&Predicate::eq("a", 1)).unwrap()))
    }

    #[test]
    fn cursor_only_moves_forward() {
        let tracker = DeltaSetTracker::open(Arc::new(InMemoryBackend::new())).unwrap();
        let all = Fingerprint::of(None);
        let t0 = Utc::now();

        assert!(tracker.cursor("c", &all).is_none());
        assert!(tracker.advance("c", &all, t0).unwrap());
        assert!(!tracker.advance("c", &all, t0 - Duration::seconds(1)).unwrap());
        assert!(!tracker.advance("c", &all, t0).unwrap());
        assert_eq!(tracker.cursor("c", &all), Some(t0));

        let t1 = t0 + Duration::seconds(1);
        assert!(tracker.advance("c", &all, t1).unwrap());
        assert_eq!(tracker.cursor("c", &all), Some(t1));
    }

    #[test]
    fn fingerprints_are_independent() {
        let tracker = DeltaSetTracker::open(Arc::new(InMemoryBackend::new())).unwrap();
        let all = Fingerprint::of(None);
        let t0 = Utc::now();

        tracker.advance("c", &all, t0).unwrap();
        assert!(tracker.cursor("c", &filtered()).is_none());
        assert!(tracker.cursor("other", &all).is_none());

        tracker
            .advance("c", &filtered(), t0 + Duration::seconds(3))
            .unwrap();
        assert_eq!(tracker.cursor("c", &all), Some(t0));
        assert_eq!(tracker.cursors("c").len(), 2);
    }

    #[test]
    fn reset_and_reopen() {
        let backend: Arc<dyn DocumentBackend> = Arc::new(InMemoryBackend::new());
        let t0 = Utc::now();
        {
            let tracker = DeltaSetTracker::open(Arc::clone(&backend)).unwrap();
            tracker.advance("c", &Fingerprint::of(None), t0).unwrap();
            tracker.advance("c", &filtered(), t0).unwrap();
            tracker.advance("d", &filtered(), t0).unwrap();
            assert_eq!(tracker.reset("c").unwrap(), 2);
            assert_eq!(tracker.reset("c").unwrap(), 0);
        }

        let reopened = DeltaSetTracker::open(backend).unwrap();
        assert!(reopened.cursors("c").is_empty());
        assert_eq!(reopened.cursor("d", &filtered()), Some(t0));
    }

    #[test]
    fn staged_advance_waits_for_commit() {
        let tracker = DeltaSetTracker::open(Arc::new(InMemoryBackend::new())).unwrap();
        let all = Fingerprint::of(None);
        let mut batch = WriteBatch::new();

        assert!(tracker
            .stage_advance(&mut batch, "c", &all, Utc::now())
            .unwrap());
        assert_eq!(batch.len(), 1);
        assert!(tracker.cursor("c", &all).is_none());
    }

    #[test]
    fn staged_reset_waits_for_commit() {
        let backend: Arc<dyn DocumentBackend> = Arc::new(InMemoryBackend::new());
        let tracker = DeltaSetTracker::open(Arc::clone(&backend)).unwrap();
        let all = Fingerprint::of(None);
        tracker.advance("c", &all, Utc::now()).unwrap();
        tracker.advance("d", &all, Utc::now()).unwrap();

        let mut batch = WriteBatch::new();
        batch.delete("c", "some-record");
        assert_eq!(tracker.stage_reset(&mut batch, "c"), 1);
        assert_eq!(batch.len(), 2);
        assert!(tracker.cursor("c", &all).is_some());

        backend.apply(batch).unwrap();
        tracker.commit_reset("c");
        assert!(tracker.cursor("c", &all).is_none());
        assert!(tracker.cursor("d", &all).is_some());
        assert!(DeltaSetTracker::open(backend).unwrap().cursors("c").is_empty());
    }
}
