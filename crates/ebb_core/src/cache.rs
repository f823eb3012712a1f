//! Local entity cache.
//!
//! Each collection maps to one backend namespace holding CBOR-encoded
//! [`Record`]s keyed by id. Mutations can be staged into a caller-owned
//! [`WriteBatch`] so that a cache write and the matching pending-log or
//! cursor update commit together.

use crate::codec;
use crate::error::{CoreError, CoreResult};
use crate::filter::{Filter, RemoteQuery};
use crate::record::Record;
use ebb_storage::{DocumentBackend, WriteBatch};
use std::sync::Arc;

/// Namespace prefix reserved for engine bookkeeping.
pub const RESERVED_PREFIX: &str = "_ebb";

/// Checks that `name` can be used as a collection name.
///
/// # Errors
///
/// Returns [`CoreError::InvalidCollection`] if the name is empty, contains
/// control characters or uses the reserved prefix.
pub fn validate_collection(name: &str) -> CoreResult<()> {
    if name.is_empty() {
        return Err(CoreError::invalid_collection(name, "name is empty"));
    }
    if name.chars().any(char::is_control) {
        return Err(CoreError::invalid_collection(
            name,
            "name contains control characters",
        ));
    }
    if name.starts_with(RESERVED_PREFIX) {
        return Err(CoreError::invalid_collection(
            name,
            format!("prefix {RESERVED_PREFIX:?} is reserved"),
        ));
    }
    Ok(())
}

/// Persistent per-collection store of entities.
#[derive(Clone)]
pub struct LocalCache {
    backend: Arc<dyn DocumentBackend>,
}

impl LocalCache {
    /// Creates a cache over a backend.
    pub fn new(backend: Arc<dyn DocumentBackend>) -> Self {
        Self { backend }
    }

    /// Returns the underlying backend.
    pub fn backend(&self) -> &Arc<dyn DocumentBackend> {
        &self.backend
    }

    /// Reads one entity.
    pub fn get(&self, collection: &str, id: &str) -> CoreResult<Option<Record>> {
        self.backend
            .get(collection, id)?
            .map(|bytes| codec::decode(&bytes))
            .transpose()
    }

    /// Returns true if the entity is cached.
    pub fn contains(&self, collection: &str, id: &str) -> CoreResult<bool> {
        Ok(self.backend.get(collection, id)?.is_some())
    }

    /// Returns every cached entity of a collection, ordered by id.
    pub fn all(&self, collection: &str) -> CoreResult<Vec<Record>> {
        self.backend
            .scan(collection)?
            .into_iter()
            .map(|(_, bytes)| codec::decode(&bytes))
            .collect()
    }

    /// Evaluates a translated query against the cache.
    pub fn find(&self, collection: &str, query: &RemoteQuery) -> CoreResult<Vec<Record>> {
        Ok(query.apply(self.all(collection)?))
    }

    /// Returns every cached entity matching an optional filter.
    pub fn matching(&self, collection: &str, filter: Option<&Filter>) -> CoreResult<Vec<Record>> {
        let mut records = self.all(collection)?;
        if let Some(filter) = filter {
            records.retain(|r| filter.matches(r));
        }
        Ok(records)
    }

    /// Counts cached entities matching an optional filter.
    pub fn count(&self, collection: &str, filter: Option<&Filter>) -> CoreResult<u64> {
        match filter {
            None => Ok(self.backend.count(collection)? as u64),
            Some(_) => Ok(self.matching(collection, filter)?.len() as u64),
        }
    }

    /// Stages an upsert.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MissingId`] if the record has no id.
    pub fn stage_put(
        &self,
        batch: &mut WriteBatch,
        collection: &str,
        record: &Record,
    ) -> CoreResult<()> {
        let id = record.id().ok_or_else(|| CoreError::MissingId {
            collection: collection.to_string(),
        })?;
        batch.put(collection, id, codec::encode(record)?);
        Ok(())
    }

    /// Stages a removal.
    pub fn stage_delete(&self, batch: &mut WriteBatch, collection: &str, id: &str) {
        batch.delete(collection, id);
    }

    /// Upserts one entity.
    pub fn put(&self, collection: &str, record: &Record) -> CoreResult<()> {
        let mut batch = WriteBatch::new();
        self.stage_put(&mut batch, collection, record)?;
        self.apply(batch)
    }

    /// Upserts several entities in one batch.
    pub fn upsert_all(&self, collection: &str, records: &[Record]) -> CoreResult<()> {
        let mut batch = WriteBatch::new();
        for record in records {
            self.stage_put(&mut batch, collection, record)?;
        }
        self.apply(batch)
    }

    /// Removes one entity. Returns true if it was cached.
    pub fn delete(&self, collection: &str, id: &str) -> CoreResult<bool> {
        if !self.contains(collection, id)? {
            return Ok(false);
        }
        self.backend.delete(collection, id)?;
        Ok(true)
    }

    /// Commits a staged batch.
    pub fn apply(&self, batch: WriteBatch) -> CoreResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        self.backend.apply(batch)?;
        Ok(())
    }
}

impl std::fmt::Debug for LocalCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalCache").finish_non_exhaustive()
    }
}
