//! Error types for ebb core.

use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Result type for query translation and validation.
pub type QueryResult<T> = Result<T, QueryError>;

/// Client-side query validation failures.
///
/// These are raised before any cache or remote access and are never
/// treated as connectivity problems.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// An operation that filters by predicate was given no query at all.
    #[error("null query: this operation requires a query")]
    NullQuery,

    /// The query carries only sort/skip/limit/projection, no filter.
    #[error("predicate required: this operation needs a query with a filter")]
    PredicateRequired,

    /// The predicate uses an operation the remote cannot express.
    #[error("predicate not supported: {reason}")]
    UnsupportedPredicate {
        /// What was rejected.
        reason: String,
    },
}

impl QueryError {
    /// Creates an unsupported predicate error.
    pub fn unsupported(reason: impl Into<String>) -> Self {
        Self::UnsupportedPredicate {
            reason: reason.into(),
        }
    }
}

/// Errors that can occur in ebb core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] ebb_storage::StorageError),

    /// A stored value could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),

    /// Query validation failed.
    #[error(transparent)]
    Query(#[from] QueryError),

    /// A record reached the cache without an id.
    #[error("record in collection {collection} has no id")]
    MissingId {
        /// Collection the record was destined for.
        collection: String,
    },

    /// Collection name is empty or reserved.
    #[error("invalid collection name {name:?}: {reason}")]
    InvalidCollection {
        /// The rejected name.
        name: String,
        /// Why it was rejected.
        reason: String,
    },
}

impl CoreError {
    /// Creates a codec error.
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec(message.into())
    }

    /// Creates an invalid collection error.
    pub fn invalid_collection(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidCollection {
            name: name.into(),
            reason: reason.into(),
        }
    }
}
