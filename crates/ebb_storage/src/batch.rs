//! Atomic write batches.

use serde::{Deserialize, Serialize};

/// A single mutation inside a [`WriteBatch`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchOp {
    /// Insert or replace a value.
    Put {
        /// Namespace (collection) of the key.
        namespace: String,
        /// Key within the namespace.
        key: String,
        /// Encoded value.
        value: Vec<u8>,
    },
    /// Remove a value. Removing an absent key is a no-op.
    Delete {
        /// Namespace (collection) of the key.
        namespace: String,
        /// Key within the namespace.
        key: String,
    },
}

impl BatchOp {
    /// Returns the namespace this operation touches.
    pub fn namespace(&self) -> &str {
        match self {
            BatchOp::Put { namespace, .. } | BatchOp::Delete { namespace, .. } => namespace,
        }
    }
}

/// An ordered group of mutations applied as one unit.
///
/// Backends guarantee that either every operation of a batch becomes
/// visible (and, for durable backends, survives a restart) or none does.
/// Later operations on the same key win.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    /// Creates an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages a put.
    pub fn put(&mut self, namespace: impl Into<String>, key: impl Into<String>, value: Vec<u8>) {
        self.ops.push(BatchOp::Put {
            namespace: namespace.into(),
            key: key.into(),
            value,
        });
    }

    /// Stages a delete.
    pub fn delete(&mut self, namespace: impl Into<String>, key: impl Into<String>) {
        self.ops.push(BatchOp::Delete {
            namespace: namespace.into(),
            key: key.into(),
        });
    }

    /// Appends all operations of `other` after the operations of `self`.
    pub fn extend(&mut self, other: WriteBatch) {
        self.ops.extend(other.ops);
    }

    /// Returns the staged operations in order.
    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    /// Consumes the batch, returning its operations.
    pub fn into_ops(self) -> Vec<BatchOp> {
        self.ops
    }

    /// Returns the number of staged operations.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Returns true if nothing is staged.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}
