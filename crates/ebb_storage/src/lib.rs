//! # Ebb Storage
//!
//! Keyed document backends for the ebb offline cache.
//!
//! This crate provides the lowest-level storage abstraction for ebb.
//! Backends are **opaque document stores** - they map `(namespace, key)`
//! pairs to byte values and do not interpret the values they hold.
//!
//! ## Design Principles
//!
//! - Values are addressed by namespace (a collection name) and key (an entity id)
//! - Multi-key writes go through a [`WriteBatch`] and are applied atomically
//! - Must be `Send + Sync` for concurrent access
//! - The cache layer owns all record encoding
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - For testing and ephemeral stores
//! - [`FileBackend`] - Durable append-only journal, replayed on open
//!
//! ## Example
//!
//! ```rust
//! use ebb_storage::{DocumentBackend, InMemoryBackend, WriteBatch};
//!
//! let backend = InMemoryBackend::new();
//! let mut batch = WriteBatch::new();
//! batch.put("books", "b1", b"moby dick".to_vec());
//! backend.apply(batch).unwrap();
//! assert_eq!(backend.get("books", "b1").unwrap().as_deref(), Some(&b"moby dick"[..]));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod batch;
mod error;
mod file;
mod memory;

pub use backend::DocumentBackend;
pub use batch::{BatchOp, WriteBatch};
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
