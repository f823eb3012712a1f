//! Operation outcomes.

use crate::error::PushFailure;
use ebb_core::Record;

/// Outcome of draining the pending write log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushResult {
    /// Entities the remote accepted.
    pub count: usize,
    /// Stale entries dropped without a remote call, their record being
    /// gone from the cache.
    pub discarded: usize,
    /// Entities the remote did not accept; they stay in the log.
    pub errors: Vec<PushFailure>,
}

impl PushResult {
    /// Returns true if every attempted entity was pushed.
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Outcome of a remote fetch merged into the cache.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullResult {
    /// Entities created, updated or deleted locally.
    pub count: usize,
    /// Entities created or updated locally.
    pub entities: Vec<Record>,
}

/// Outcome of a push followed by a pull.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Push half.
    pub push: PushResult,
    /// Pull half.
    pub pull: PullResult,
}

/// Outcome of a removal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteResult {
    /// Entities removed.
    pub count: u64,
}

impl DeleteResult {
    /// Wraps a count.
    pub fn new(count: u64) -> Self {
        Self { count }
    }
}
