//! Document backend trait definition.

use crate::batch::WriteBatch;
use crate::error::StorageResult;

/// A keyed document store underneath the ebb local cache.
///
/// Backends are **opaque byte stores** addressed by `(namespace, key)`.
/// The cache uses one namespace per collection and reserves a few
/// namespaces (prefixed `_ebb`) for its own bookkeeping.
///
/// # Invariants
///
/// - `get` returns exactly the bytes last written for that key
/// - `apply` is atomic: all operations of the batch or none
/// - `scan` returns the namespace's entries ordered by key
/// - Backends must be `Send + Sync` for concurrent access
///
/// # Implementors
///
/// - [`super::InMemoryBackend`] - For testing
/// - [`super::FileBackend`] - For durable storage
pub trait DocumentBackend: Send + Sync {
    /// Reads the value stored under `key` in `namespace`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn get(&self, namespace: &str, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Returns every `(key, value)` pair of a namespace, ordered by key.
    ///
    /// An unknown namespace yields an empty vector.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn scan(&self, namespace: &str) -> StorageResult<Vec<(String, Vec<u8>)>>;

    /// Applies a batch of mutations atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if the batch cannot be made durable. In that case
    /// none of its operations are visible.
    fn apply(&self, batch: WriteBatch) -> StorageResult<()>;

    /// Flushes pending writes to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush operation fails.
    fn flush(&self) -> StorageResult<()>;

    /// Stores a single value.
    ///
    /// # Errors
    ///
    /// See [`DocumentBackend::apply`].
    fn put(&self, namespace: &str, key: &str, value: Vec<u8>) -> StorageResult<()> {
        let mut batch = WriteBatch::new();
        batch.put(namespace, key, value);
        self.apply(batch)
    }

    /// Removes a single value.
    ///
    /// # Errors
    ///
    /// See [`DocumentBackend::apply`].
    fn delete(&self, namespace: &str, key: &str) -> StorageResult<()> {
        let mut batch = WriteBatch::new();
        batch.delete(namespace, key);
        self.apply(batch)
    }

    /// Returns the number of keys in a namespace.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn count(&self, namespace: &str) -> StorageResult<usize> {
        Ok(self.scan(namespace)?.len())
    }
}
