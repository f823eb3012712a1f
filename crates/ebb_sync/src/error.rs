//! Error types for the sync façade.

use crate::result::PushResult;
use ebb_core::{CoreError, QueryError};
use std::fmt;
use thiserror::Error;

/// Result type for remote adapter calls.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Result type for store operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Classification of a remote failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteErrorKind {
    /// The remote could not be reached at all.
    Unreachable,
    /// The connection failed mid-request.
    Transport,
    /// The remote answered with a non-success status.
    Server {
        /// Status code reported by the remote.
        status: u16,
    },
    /// The requested entity does not exist remotely.
    NotFound,
    /// The remote refused the entity.
    Rejected,
}

impl fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteErrorKind::Unreachable => f.write_str("unreachable"),
            RemoteErrorKind::Transport => f.write_str("transport failure"),
            RemoteErrorKind::Server { status } => write!(f, "server error {status}"),
            RemoteErrorKind::NotFound => f.write_str("not found"),
            RemoteErrorKind::Rejected => f.write_str("rejected"),
        }
    }
}

/// A failure reported by a [`RemoteAdapter`](crate::RemoteAdapter).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("remote {kind}: {message}")]
pub struct RemoteError {
    /// What went wrong.
    pub kind: RemoteErrorKind,
    /// Human-readable detail.
    pub message: String,
}

impl RemoteError {
    /// Creates an error of the given kind.
    pub fn new(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// The remote is unreachable.
    pub fn unreachable(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Unreachable, message)
    }

    /// A transport failure.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Transport, message)
    }

    /// A non-success server response.
    pub fn server(status: u16, message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Server { status }, message)
    }

    /// A missing entity.
    pub fn not_found(collection: &str, id: &str) -> Self {
        Self::new(
            RemoteErrorKind::NotFound,
            format!("entity {id} not found in {collection}"),
        )
    }

    /// A refused entity.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Rejected, message)
    }

    /// Returns true for a missing entity.
    pub fn is_not_found(&self) -> bool {
        self.kind == RemoteErrorKind::NotFound
    }

    /// Returns true for failures that make AUTO stores fall back to the
    /// cache. Everything except a not-found answer qualifies.
    pub fn is_network(&self) -> bool {
        !self.is_not_found()
    }
}

/// One pending entity the remote did not accept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushFailure {
    /// Entity id as known locally.
    pub entity_id: String,
    /// Action that was attempted.
    pub action: ebb_core::PendingAction,
    /// Remote error.
    pub error: RemoteError,
}

impl fmt::Display for PushFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.action, self.entity_id, self.error)
    }
}

/// Aggregate push failure, carrying what did succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushError {
    /// Partial outcome.
    pub result: PushResult,
}

impl PushError {
    /// Returns the per-entity failures.
    pub fn failures(&self) -> &[PushFailure] {
        &self.result.errors
    }
}

impl fmt::Display for PushError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "push failed for {} entities ({} pushed)",
            self.result.errors.len(),
            self.result.count
        )?;
        for (i, failure) in self.result.errors.iter().enumerate() {
            f.write_str(if i == 0 { ": " } else { "; " })?;
            write!(f, "{failure}")?;
        }
        Ok(())
    }
}

impl std::error::Error for PushError {}

/// Errors surfaced by a [`DataStore`](crate::DataStore).
#[derive(Debug, Error)]
pub enum SyncError {
    /// The query was rejected before any cache or remote access.
    #[error(transparent)]
    Query(#[from] QueryError),

    /// Local cache, log or storage failure.
    #[error("local store error: {0}")]
    Core(#[source] CoreError),

    /// Remote failure.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// Pull attempted while local writes are unacknowledged.
    #[error("pull only on clean queue: {pending} pending writes in {collection}")]
    PendingWrites {
        /// Collection that was pulled.
        collection: String,
        /// Pending entries found.
        pending: usize,
    },

    /// One or more pending entities failed to push.
    #[error(transparent)]
    Push(#[from] PushError),
}

impl From<CoreError> for SyncError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Query(query) => SyncError::Query(query),
            other => SyncError::Core(other),
        }
    }
}

impl From<ebb_storage::StorageError> for SyncError {
    fn from(err: ebb_storage::StorageError) -> Self {
        SyncError::Core(CoreError::from(err))
    }
}

impl SyncError {
    /// Returns true for client-side validation failures.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            SyncError::Query(_) | SyncError::Core(CoreError::InvalidCollection { .. })
        )
    }

    /// Returns true if AUTO stores fall back to the cache on this error.
    pub fn is_network(&self) -> bool {
        matches!(self, SyncError::Remote(err) if err.is_network())
    }

    /// Returns true if the remote reported a missing entity.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SyncError::Remote(err) if err.is_not_found())
    }

    /// Returns the remote error, if this is one.
    pub fn as_remote(&self) -> Option<&RemoteError> {
        match self {
            SyncError::Remote(err) => Some(err),
            _ => None,
        }
    }
}
