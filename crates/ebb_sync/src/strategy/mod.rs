//! Mode strategies.
//!
//! The three store modes share one operation set. SYNC is the local
//! strategy, NETWORK the remote one, and AUTO composes both with its
//! fallback policy. Queries reach a strategy already validated.

mod auto;
mod local;
mod network;

pub(crate) use auto::AutoStrategy;
pub(crate) use local::{settle_saved, LocalStrategy};
pub(crate) use network::NetworkStrategy;

use crate::client::StoreContext;
use crate::config::{StoreConfig, StoreMode};
use crate::error::SyncResult;
use ebb_core::{AggregateResult, AggregateSpec, Filter, Record, RemoteQuery};
use std::sync::Arc;

#[derive(Clone)]
pub(crate) enum Strategy {
    Network(NetworkStrategy),
    Local(LocalStrategy),
    Auto(AutoStrategy),
}

impl Strategy {
    pub(crate) fn for_config(ctx: &Arc<StoreContext>, config: &StoreConfig) -> Self {
        match config.mode {
            StoreMode::Network => Strategy::Network(NetworkStrategy::new(Arc::clone(ctx))),
            StoreMode::Sync => Strategy::Local(LocalStrategy::new(Arc::clone(ctx))),
            StoreMode::Auto => Strategy::Auto(AutoStrategy::new(
                NetworkStrategy::new(Arc::clone(ctx)),
                LocalStrategy::new(Arc::clone(ctx)),
                config.refresh_cache_on_read,
                ctx.collection.clone(),
            )),
        }
    }

    pub(crate) async fn find(&self, query: &RemoteQuery) -> SyncResult<Vec<Record>> {
        match self {
            Strategy::Network(s) => s.find(query).await,
            Strategy::Local(s) => s.find(query),
            Strategy::Auto(s) => s.find(query).await,
        }
    }

    pub(crate) async fn find_by_id(&self, id: &str) -> SyncResult<Option<Record>> {
        match self {
            Strategy::Network(s) => s.find_by_id(id).await,
            Strategy::Local(s) => s.find_by_id(id),
            Strategy::Auto(s) => s.find_by_id(id).await,
        }
    }

    pub(crate) async fn save(&self, record: Record) -> SyncResult<Record> {
        match self {
            Strategy::Network(s) => s.save(&record).await,
            Strategy::Local(s) => s.save(record),
            Strategy::Auto(s) => s.save(record).await,
        }
    }

    pub(crate) async fn remove(&self, id: &str) -> SyncResult<u64> {
        match self {
            Strategy::Network(s) => s.remove(id).await,
            Strategy::Local(s) => s.remove(id),
            Strategy::Auto(s) => s.remove(id).await,
        }
    }

    pub(crate) async fn remove_by_filter(&self, filter: &Filter) -> SyncResult<u64> {
        match self {
            Strategy::Network(s) => s.remove_by_filter(filter).await,
            Strategy::Local(s) => s.remove_by_filter(filter),
            Strategy::Auto(s) => s.remove_by_filter(filter).await,
        }
    }

    pub(crate) async fn count(&self, filter: Option<&Filter>) -> SyncResult<u64> {
        match self {
            Strategy::Network(s) => s.count(filter).await,
            Strategy::Local(s) => s.count(filter),
            Strategy::Auto(s) => s.count(filter).await,
        }
    }

    pub(crate) async fn aggregate(
        &self,
        spec: &AggregateSpec,
        filter: Option<&Filter>,
    ) -> SyncResult<Vec<AggregateResult>> {
        match self {
            Strategy::Network(s) => s.aggregate(spec, filter).await,
            Strategy::Local(s) => s.aggregate(spec, filter),
            Strategy::Auto(s) => s.aggregate(spec, filter).await,
        }
    }
}
