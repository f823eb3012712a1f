//! # Ebb Core
//!
//! The local half of the ebb offline-first engine.
//!
//! This crate provides:
//! - [`Value`] and [`Record`], the document model
//! - [`Query`] and [`Predicate`], the serializable query model
//! - The query translator/validator producing a remote-compatible [`Filter`]
//! - [`LocalCache`], per-collection entity storage over a document backend
//! - [`PendingWriteLog`], the coalescing per-entity mutation queue
//! - [`DeltaSetTracker`], per-query cursors for incremental fetch
//! - Group/aggregate reduction over records
//!
//! Nothing in this crate talks to the network; `ebb_sync` binds these
//! pieces to a remote service.
//!
//! ## Key Invariants
//!
//! - At most one pending write exists per `(collection, entity id)`
//! - A delta cursor only moves forward
//! - Cache mutations and their pending-log entries commit in one batch

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod aggregate;
mod cache;
mod codec;
mod delta;
mod error;
mod filter;
mod pending;
mod query;
mod record;
mod value;

pub use aggregate::{aggregate, AggregateResult, AggregateSpec, ReduceFunction};
pub use cache::{validate_collection, LocalCache, RESERVED_PREFIX};
pub use delta::{DeltaCursor, DeltaSetTracker};
pub use error::{CoreError, CoreResult, QueryError, QueryResult};
pub use filter::{require_predicate, translate, translate_predicate, Fingerprint, Filter, RemoteQuery};
pub use pending::{merge_actions, EnqueueOutcome, PendingAction, PendingWriteAction, PendingWriteLog};
pub use query::{CompareOp, Predicate, Query, SortDirection, SortKey};
pub use record::{generate_local_id, is_local_id, Metadata, Record, LOCAL_ID_PREFIX};
pub use value::Value;

pub use ebb_storage::{DocumentBackend, FileBackend, InMemoryBackend, WriteBatch};
