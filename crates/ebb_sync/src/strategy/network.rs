//! NETWORK mode: straight to the remote.

use crate::client::StoreContext;
use crate::error::SyncResult;
use ebb_core::{AggregateResult, AggregateSpec, Filter, Record, RemoteQuery};
use std::sync::Arc;

#[derive(Clone)]
pub(crate) struct NetworkStrategy {
    ctx: Arc<StoreContext>,
}

impl NetworkStrategy {
    pub(crate) fn new(ctx: Arc<StoreContext>) -> Self {
        Self { ctx }
    }

    pub(crate) async fn find(&self, query: &RemoteQuery) -> SyncResult<Vec<Record>> {
        Ok(self.ctx.remote.find(&self.ctx.collection, query).await?)
    }

    /// A missing entity is an error here, never `None`.
    pub(crate) async fn find_by_id(&self, id: &str) -> SyncResult<Option<Record>> {
        Ok(Some(self.ctx.remote.find_by_id(&self.ctx.collection, id).await?))
    }

    pub(crate) async fn save(&self, record: &Record) -> SyncResult<Record> {
        Ok(self
            .ctx
            .remote
            .save(&self.ctx.collection, &record.for_remote())
            .await?)
    }

    pub(crate) async fn remove(&self, id: &str) -> SyncResult<u64> {
        Ok(self.ctx.remote.remove_by_id(&self.ctx.collection, id).await?)
    }

    pub(crate) async fn remove_by_filter(&self, filter: &Filter) -> SyncResult<u64> {
        Ok(self
            .ctx
            .remote
            .remove_by_filter(&self.ctx.collection, filter)
            .await?)
    }

    pub(crate) async fn count(&self, filter: Option<&Filter>) -> SyncResult<u64> {
        Ok(self.ctx.remote.count(&self.ctx.collection, filter).await?)
    }

    pub(crate) async fn aggregate(
        &self,
        spec: &AggregateSpec,
        filter: Option<&Filter>,
    ) -> SyncResult<Vec<AggregateResult>> {
        Ok(self
            .ctx
            .remote
            .aggregate(&self.ctx.collection, spec, filter)
            .await?)
    }
}
