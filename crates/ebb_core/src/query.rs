//! The query model.
//!
//! A [`Query`] is plain data: a predicate tree, sort keys, skip/limit and
//! an optional projection. Nothing here executes; the translator in
//! [`crate::translate`] validates a query and turns it into a [`Filter`]
//! that both the local cache and the remote service evaluate.
//!
//! [`Filter`]: crate::Filter

use crate::value::Value;
use serde::{Deserialize, Serialize};

/// Comparison operator of a [`Predicate::Compare`] node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareOp {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `>`
    Gt,
    /// `>=`
    Gte,
    /// `<`
    Lt,
    /// `<=`
    Lte,
}

impl CompareOp {
    /// Returns the remote operator name (`$gt`, ...). `Eq` has none.
    pub fn operator(&self) -> Option<&'static str> {
        match self {
            CompareOp::Eq => None,
            CompareOp::Ne => Some("$ne"),
            CompareOp::Gt => Some("$gt"),
            CompareOp::Gte => Some("$gte"),
            CompareOp::Lt => Some("$lt"),
            CompareOp::Lte => Some("$lte"),
        }
    }
}

/// A node of the predicate tree.
///
/// The tree can express more than the remote service understands
/// (substring containment, suffix match, constant expressions); such
/// nodes are rejected by the translator rather than being unrepresentable,
/// so callers building queries dynamically get a precise error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Predicate {
    /// `field <op> value`.
    Compare {
        /// Field path.
        field: String,
        /// Operator.
        op: CompareOp,
        /// Literal operand.
        value: Value,
    },
    /// Text field starts with `prefix`.
    StartsWith {
        /// Field path.
        field: String,
        /// Required prefix.
        prefix: String,
    },
    /// Boolean field is `true`.
    IsTrue {
        /// Field path.
        field: String,
    },
    /// Text field contains `needle` anywhere. Not supported remotely.
    Contains {
        /// Field path.
        field: String,
        /// Substring.
        needle: String,
    },
    /// Text field ends with `suffix`. Not supported remotely.
    EndsWith {
        /// Field path.
        field: String,
        /// Required suffix.
        suffix: String,
    },
    /// A constant with no field reference. Not supported remotely.
    Constant(bool),
    /// All children hold.
    And(Vec<Predicate>),
    /// At least one child holds.
    Or(Vec<Predicate>),
}

impl Predicate {
    fn compare(field: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        Predicate::Compare {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    /// `field == value`
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Eq, value)
    }

    /// `field != value`
    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Ne, value)
    }

    /// `field > value`
    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Gt, value)
    }

    /// `field >= value`
    pub fn gte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Gte, value)
    }

    /// `field < value`
    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Lt, value)
    }

    /// `field <= value`
    pub fn lte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Lte, value)
    }

    /// Text field starts with `prefix`.
    pub fn starts_with(field: impl Into<String>, prefix: impl Into<String>) -> Self {
        Predicate::StartsWith {
            field: field.into(),
            prefix: prefix.into(),
        }
    }

    /// Boolean field is `true`.
    pub fn is_true(field: impl Into<String>) -> Self {
        Predicate::IsTrue {
            field: field.into(),
        }
    }

    /// Text field contains `needle`.
    pub fn contains(field: impl Into<String>, needle: impl Into<String>) -> Self {
        Predicate::Contains {
            field: field.into(),
            needle: needle.into(),
        }
    }

    /// Text field ends with `suffix`.
    pub fn ends_with(field: impl Into<String>, suffix: impl Into<String>) -> Self {
        Predicate::EndsWith {
            field: field.into(),
            suffix: suffix.into(),
        }
    }

    /// `self AND other`
    #[must_use]
    pub fn and(self, other: Predicate) -> Self {
        Predicate::And(vec![self, other])
    }

    /// `self OR other`
    #[must_use]
    pub fn or(self, other: Predicate) -> Self {
        Predicate::Or(vec![self, other])
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortDirection {
    /// Smallest first.
    Ascending,
    /// Largest first.
    Descending,
}

/// One sort key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortKey {
    /// Field path.
    pub field: String,
    /// Direction.
    pub direction: SortDirection,
}

/// A request for a subset of a collection.
///
/// Built with consuming builder methods; repeated [`Query::filter`]
/// calls are ANDed together.
///
/// ```rust
/// use ebb_core::{Predicate, Query};
///
/// let query = Query::new()
///     .filter(Predicate::gte("age", 18))
///     .filter(Predicate::starts_with("name", "A"))
///     .sort_desc("age")
///     .limit(10);
/// assert!(query.has_predicate());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    predicate: Option<Predicate>,
    sort: Vec<SortKey>,
    skip: Option<u32>,
    limit: Option<u32>,
    fields: Option<Vec<String>>,
}

impl Query {
    /// Creates a query matching the whole collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a filter; ANDed with any existing one.
    #[must_use]
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(match self.predicate.take() {
            None => predicate,
            Some(existing) => existing.and(predicate),
        });
        self
    }

    /// Appends an ascending sort key.
    #[must_use]
    pub fn sort_asc(mut self, field: impl Into<String>) -> Self {
        self.sort.push(SortKey {
            field: field.into(),
            direction: SortDirection::Ascending,
        });
        self
    }

    /// Appends a descending sort key.
    #[must_use]
    pub fn sort_desc(mut self, field: impl Into<String>) -> Self {
        self.sort.push(SortKey {
            field: field.into(),
            direction: SortDirection::Descending,
        });
        self
    }

    /// Skips the first `n` matches.
    #[must_use]
    pub fn skip(mut self, n: u32) -> Self {
        self.skip = Some(n);
        self
    }

    /// Returns at most `n` matches.
    #[must_use]
    pub fn limit(mut self, n: u32) -> Self {
        self.limit = Some(n);
        self
    }

    /// Restricts returned fields.
    #[must_use]
    pub fn select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Returns the predicate tree, if any.
    pub fn predicate(&self) -> Option<&Predicate> {
        self.predicate.as_ref()
    }

    /// Returns true if the query filters.
    pub fn has_predicate(&self) -> bool {
        self.predicate.is_some()
    }

    /// Returns the sort keys.
    pub fn sort_keys(&self) -> &[SortKey] {
        &self.sort
    }

    /// Returns the skip count.
    pub fn skip_count(&self) -> Option<u32> {
        self.skip
    }

    /// Returns the limit.
    pub fn limit_count(&self) -> Option<u32> {
        self.limit
    }

    /// Returns the projection.
    pub fn fields(&self) -> Option<&[String]> {
        self.fields.as_deref()
    }
}
