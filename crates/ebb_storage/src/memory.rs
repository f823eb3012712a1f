//! In-memory document backend for testing.

use crate::backend::DocumentBackend;
use crate::batch::{BatchOp, WriteBatch};
use crate::error::StorageResult;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

pub(crate) type Namespaces = HashMap<String, BTreeMap<String, Vec<u8>>>;

/// Applies a batch to an in-memory namespace map.
pub(crate) fn apply_ops(namespaces: &mut Namespaces, ops: Vec<BatchOp>) {
    for op in ops {
        match op {
            BatchOp::Put {
                namespace,
                key,
                value,
            } => {
                namespaces.entry(namespace).or_default().insert(key, value);
            }
            BatchOp::Delete { namespace, key } => {
                if let Some(entries) = namespaces.get_mut(&namespace) {
                    entries.remove(&key);
                    if entries.is_empty() {
                        namespaces.remove(&namespace);
                    }
                }
            }
        }
    }
}

/// An in-memory document backend.
///
/// This backend keeps everything in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Caches that don't need to survive a restart
///
/// # Example
///
/// ```rust
/// use ebb_storage::{DocumentBackend, InMemoryBackend};
///
/// let backend = InMemoryBackend::new();
/// backend.put("notes", "n1", vec![1, 2, 3]).unwrap();
/// assert_eq!(backend.count("notes").unwrap(), 1);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    namespaces: RwLock<Namespaces>,
}

impl InMemoryBackend {
    /// Creates a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the names of all non-empty namespaces, sorted.
    #[must_use]
    pub fn namespaces(&self) -> Vec<String> {
        let mut names: Vec<String> = self.namespaces.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Removes everything.
    pub fn clear(&self) {
        self.namespaces.write().clear();
    }
}

impl DocumentBackend for InMemoryBackend {
    fn get(&self, namespace: &str, key: &str) -> StorageResult<Option<Vec<u8>>> {
        Ok(self
            .namespaces
            .read()
            .get(namespace)
            .and_then(|entries| entries.get(key))
            .cloned())
    }

    fn scan(&self, namespace: &str) -> StorageResult<Vec<(String, Vec<u8>)>> {
        Ok(self
            .namespaces
            .read()
            .get(namespace)
            .map(|entries| {
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    fn apply(&self, batch: WriteBatch) -> StorageResult<()> {
        apply_ops(&mut self.namespaces.write(), batch.into_ops());
        Ok(())
    }

    fn flush(&self) -> StorageResult<()> {
        Ok(())
    }

    fn count(&self, namespace: &str) -> StorageResult<usize> {
        Ok(self
            .namespaces
            .read()
            .get(namespace)
            .map_or(0, BTreeMap::len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_new_is_empty() {
        let backend = InMemoryBackend::new();
        assert!(backend.namespaces().is_empty());
        assert_eq!(backend.count("anything").unwrap(), 0);
        assert!(backend.scan("anything").unwrap().is_empty());
    }

    #[test]
    fn memory_put_then_get() {
        let backend = InMemoryBackend::new();
        backend.put("books", "b1", b"dune".to_vec()).unwrap();

        assert_eq!(backend.get("books", "b1").unwrap(), Some(b"dune".to_vec()));
        assert_eq!(backend.get("books", "b2").unwrap(), None);
        assert_eq!(backend.get("films", "b1").unwrap(), None);
    }

    #[test]
    fn memory_scan_is_ordered_by_key() {
        let backend = InMemoryBackend::new();
        backend.put("n", "c", vec![3]).unwrap();
        backend.put("n", "a", vec![1]).unwrap();
        backend.put("n", "b", vec![2]).unwrap();

        let keys: Vec<String> = backend.scan("n").unwrap().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    #[test]
    fn memory_batch_last_write_wins() {
        let backend = InMemoryBackend::new();
        let mut batch = WriteBatch::new();
        batch.put("n", "k", vec![1]);
        batch.delete("n", "k");
        batch.put("n", "k", vec![2]);
        backend.apply(batch).unwrap();

        assert_eq!(backend.get("n", "k").unwrap(), Some(vec![2]));
    }

    #[test]
    fn memory_delete_drops_empty_namespace() {
        let backend = InMemoryBackend::new();
        backend.put("n", "k", vec![1]).unwrap();
        backend.delete("n", "k").unwrap();
        backend.delete("n", "missing").unwrap();

        assert!(backend.namespaces().is_empty());
    }

    #[test]
    fn memory_clear() {
        let backend = InMemoryBackend::new();
        backend.put("a", "1", vec![1]).unwrap();
        backend.put("b", "2", vec![2]).unwrap();
        backend.clear();
        assert!(backend.namespaces().is_empty());
    }
}
