//! Remote adapter contract.

use crate::error::RemoteResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ebb_core::{AggregateResult, AggregateSpec, Filter, Record, RemoteQuery};

/// Answer to a [`RemoteAdapter::pull`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeltaResponse {
    /// Entities created or changed since the cursor (all matching
    /// entities when no cursor was given).
    pub changed: Vec<Record>,
    /// Entities deleted since the cursor. Empty without a cursor.
    pub deleted_ids: Vec<String>,
    /// Server time the response reflects; becomes the next cursor.
    pub server_time: DateTime<Utc>,
}

/// The remote data service.
///
/// Implementations own transport, authentication, cancellation and retry
/// policy. Filters arrive already validated; [`Filter::to_json`] gives
/// their wire representation.
#[async_trait]
pub trait RemoteAdapter: Send + Sync {
    /// Returns the entities matching a query.
    async fn find(&self, collection: &str, query: &RemoteQuery) -> RemoteResult<Vec<Record>>;

    /// Returns one entity, or a not-found error.
    async fn find_by_id(&self, collection: &str, id: &str) -> RemoteResult<Record>;

    /// Counts the entities matching a filter.
    async fn count(&self, collection: &str, filter: Option<&Filter>) -> RemoteResult<u64>;

    /// Creates or replaces an entity. A record without an id gets one
    /// assigned. Returns the stored entity with server metadata.
    async fn save(&self, collection: &str, record: &Record) -> RemoteResult<Record>;

    /// Removes one entity, or fails with not-found.
    async fn remove_by_id(&self, collection: &str, id: &str) -> RemoteResult<u64>;

    /// Removes every entity matching a filter.
    async fn remove_by_filter(&self, collection: &str, filter: &Filter) -> RemoteResult<u64>;

    /// Groups and reduces the entities matching a filter.
    async fn aggregate(
        &self,
        collection: &str,
        spec: &AggregateSpec,
        filter: Option<&Filter>,
    ) -> RemoteResult<Vec<AggregateResult>>;

    /// Returns what changed since `since`, or every matching entity when
    /// `since` is `None`.
    async fn pull(
        &self,
        collection: &str,
        filter: Option<&Filter>,
        since: Option<DateTime<Utc>>,
    ) -> RemoteResult<DeltaResponse>;
}
