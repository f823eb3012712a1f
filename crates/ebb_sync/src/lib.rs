//! # Ebb Sync
//!
//! The offline-first half of ebb: per-collection stores that read and
//! write through a local cache, a remote service, or both, and reconcile
//! the two with push, pull and sync.
//!
//! ## Modes
//!
//! - [`StoreMode::Network`]: every call goes to the [`RemoteAdapter`]
//! - [`StoreMode::Sync`]: every call works on the local cache; mutations
//!   are queued in the pending write log until [`DataStore::push`]
//! - [`StoreMode::Auto`]: remote first, falling back to the cache when the
//!   remote is unreachable
//!
//! ## Example
//!
//! ```rust,no_run
//! use ebb_core::{Predicate, Query, Record};
//! use ebb_sync::{InMemoryRemote, StoreConfig, SyncClient};
//! use std::sync::Arc;
//!
//! # async fn demo() -> ebb_sync::SyncResult<()> {
//! let remote = Arc::new(InMemoryRemote::new());
//! let client = SyncClient::in_memory(remote)?;
//! let tasks = client.store("tasks", StoreConfig::sync())?;
//!
//! tasks.save(Record::with_id("t1").field("done", false)).await?;
//! tasks.save(Record::with_id("t2").field("done", true)).await?;
//!
//! let open = Query::new().filter(Predicate::eq("done", false));
//! assert_eq!(tasks.get_count_by_query(Some(&open)).await?, 1);
//!
//! let report = tasks.sync(None).await?;
//! assert_eq!(report.push.count, 2);
//! # Ok(())
//! # }
//! ```
//!
//! ## Concurrency
//!
//! Push, pull and sync on one collection are serialized; every cache
//! write and its pending-log entry commit as one batch. Locks are shared
//! between all handles a [`SyncClient`] gives out for a collection.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod client;
mod config;
mod error;
mod memory;
mod pull;
mod push;
mod remote;
mod result;
mod store;
mod strategy;

pub use client::SyncClient;
pub use config::{StoreConfig, StoreMode};
pub use error::{
    PushError, PushFailure, RemoteError, RemoteErrorKind, RemoteResult, SyncError, SyncResult,
};
pub use memory::InMemoryRemote;
pub use remote::{DeltaResponse, RemoteAdapter};
pub use result::{DeleteResult, PullResult, PushResult, SyncReport};
pub use store::DataStore;

pub use ebb_core::{
    AggregateResult, AggregateSpec, PendingAction, PendingWriteAction, Predicate, Query, Record,
    ReduceFunction, Value,
};
