//! Query translation and validation.
//!
//! [`translate_predicate`] turns a [`Predicate`] tree into a [`Filter`], the
//! subset of predicates the remote service understands, or rejects it with
//! a [`QueryError`]. Translation is purely client-side: it never touches the
//! cache or the network, so its errors are never mistaken for connectivity
//! failures.
//!
//! Filters are normalized on the way out (nested `And`/`Or` flattened,
//! single-child groups collapsed, children sorted) so that equivalent
//! predicates share one [`Fingerprint`].

use crate::error::{QueryError, QueryResult};
use crate::query::{CompareOp, Predicate, Query, SortDirection, SortKey};
use crate::record::Record;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;

/// A validated, remote-compatible filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Filter {
    /// `field <op> value`.
    Compare {
        /// Field path.
        field: String,
        /// Operator.
        op: CompareOp,
        /// Operand.
        value: Value,
    },
    /// Text field starts with `prefix`.
    Prefix {
        /// Field path.
        field: String,
        /// Required prefix.
        prefix: String,
    },
    /// Every child holds. Always has at least two children.
    And(Vec<Filter>),
    /// At least one child holds. Always has at least two children.
    Or(Vec<Filter>),
}

impl Filter {
    /// Evaluates the filter against a record.
    ///
    /// A missing field reads as `null`. Range operators only hold between
    /// values of the same kind.
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Filter::Compare { field, op, value } => {
                let actual = record
                    .resolve(field)
                    .unwrap_or(Cow::Owned(Value::Null));
                let actual = actual.as_ref();
                match op {
                    CompareOp::Eq => actual == value,
                    CompareOp::Ne => actual != value,
                    CompareOp::Gt => actual.compare(value) == Some(Ordering::Greater),
                    CompareOp::Gte => matches!(
                        actual.compare(value),
                        Some(Ordering::Greater | Ordering::Equal)
                    ),
                    CompareOp::Lt => actual.compare(value) == Some(Ordering::Less),
                    CompareOp::Lte => matches!(
                        actual.compare(value),
                        Some(Ordering::Less | Ordering::Equal)
                    ),
                }
            }
            Filter::Prefix { field, prefix } => record
                .resolve(field)
                .is_some_and(|v| v.as_text().is_some_and(|s| s.starts_with(prefix.as_str()))),
            Filter::And(children) => children.iter().all(|c| c.matches(record)),
            Filter::Or(children) => children.iter().any(|c| c.matches(record)),
        }
    }

    /// Renders the remote representation.
    ///
    /// ```rust
    /// use ebb_core::{translate_predicate, Predicate};
    ///
    /// let filter = translate_predicate(&Predicate::gt("age", 30)).unwrap();
    /// assert_eq!(filter.to_json().to_string(), r#"{"age":{"$gt":30}}"#);
    /// ```
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Filter::Compare { field, op, value } => {
                let operand = match op.operator() {
                    None => value.to_json(),
                    Some(name) => single(name, value.to_json()),
                };
                single(field, operand)
            }
            Filter::Prefix { field, prefix } => single(
                field,
                single("$regex", serde_json::Value::String(anchored_prefix(prefix))),
            ),
            Filter::And(children) => single(
                "$and",
                serde_json::Value::Array(children.iter().map(Filter::to_json).collect()),
            ),
            Filter::Or(children) => single(
                "$or",
                serde_json::Value::Array(children.iter().map(Filter::to_json).collect()),
            ),
        }
    }

    fn canonical(&self) -> String {
        self.to_json().to_string()
    }
}

fn single(key: &str, value: serde_json::Value) -> serde_json::Value {
    let mut object = serde_json::Map::new();
    object.insert(key.to_string(), value);
    serde_json::Value::Object(object)
}

fn anchored_prefix(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    pattern.push('^');
    for c in prefix.chars() {
        if "\\.^$|?*+()[]{}".contains(c) {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern
}

/// Translates a predicate tree into a [`Filter`].
///
/// # Errors
///
/// Returns [`QueryError::UnsupportedPredicate`] for substring containment,
/// suffix matching, constant expressions, empty logical groups and empty
/// field names.
pub fn translate_predicate(predicate: &Predicate) -> QueryResult<Filter> {
    Ok(normalize(translate_node(predicate)?))
}

fn checked_field(field: &str) -> QueryResult<String> {
    if field.is_empty() {
        return Err(QueryError::unsupported("empty field name"));
    }
    Ok(field.to_string())
}

fn translate_node(predicate: &Predicate) -> QueryResult<Filter> {
    match predicate {
        Predicate::Compare { field, op, value } => Ok(Filter::Compare {
            field: checked_field(field)?,
            op: *op,
            value: value.clone(),
        }),
        Predicate::StartsWith { field, prefix } => Ok(Filter::Prefix {
            field: checked_field(field)?,
            prefix: prefix.clone(),
        }),
        Predicate::IsTrue { field } => Ok(Filter::Compare {
            field: checked_field(field)?,
            op: CompareOp::Eq,
            value: Value::Bool(true),
        }),
        Predicate::Contains { field, .. } => Err(QueryError::unsupported(format!(
            "substring containment on field {field:?}"
        ))),
        Predicate::EndsWith { field, .. } => Err(QueryError::unsupported(format!(
            "suffix match on field {field:?}"
        ))),
        Predicate::Constant(value) => Err(QueryError::unsupported(format!(
            "constant expression {value} has no field reference"
        ))),
        Predicate::And(children) => {
            if children.is_empty() {
                return Err(QueryError::unsupported("empty AND group"));
            }
            Ok(Filter::And(
                children.iter().map(translate_node).collect::<QueryResult<_>>()?,
            ))
        }
        Predicate::Or(children) => {
            if children.is_empty() {
                return Err(QueryError::unsupported("empty OR group"));
            }
            Ok(Filter::Or(
                children.iter().map(translate_node).collect::<QueryResult<_>>()?,
            ))
        }
    }
}

fn normalize(filter: Filter) -> Filter {
    match filter {
        Filter::And(children) => group(children, true),
        Filter::Or(children) => group(children, false),
        leaf => leaf,
    }
}

fn group(children: Vec<Filter>, conjunction: bool) -> Filter {
    let mut flat = Vec::with_capacity(children.len());
    for child in children.into_iter().map(normalize) {
        match child {
            Filter::And(inner) if conjunction => flat.extend(inner),
            Filter::Or(inner) if !conjunction => flat.extend(inner),
            other => flat.push(other),
        }
    }

    let mut keyed: Vec<(String, Filter)> = flat.into_iter().map(|f| (f.canonical(), f)).collect();
    keyed.sort_by(|a, b| a.0.cmp(&b.0));
    keyed.dedup_by(|a, b| a.0 == b.0);
    let mut children: Vec<Filter> = keyed.into_iter().map(|(_, f)| f).collect();

    if children.len() == 1 {
        if let Some(only) = children.pop() {
            return only;
        }
    }
    if conjunction {
        Filter::And(children)
    } else {
        Filter::Or(children)
    }
}

/// Normalized identity of a query's filter, keying delta cursors.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint of a query without a predicate.
    pub const UNFILTERED: &'static str = "*";

    /// Computes the fingerprint of an optional filter.
    pub fn of(filter: Option<&Filter>) -> Self {
        match filter {
            None => Fingerprint(Self::UNFILTERED.to_string()),
            Some(filter) => {
                let digest = Sha256::digest(filter.canonical().as_bytes());
                Fingerprint(digest.iter().map(|b| format!("{b:02x}")).collect())
            }
        }
    }

    /// Returns the fingerprint text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A translated query: what is sent to the remote and evaluated locally.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteQuery {
    /// Filter, if the query had a predicate.
    pub filter: Option<Filter>,
    /// Sort keys, applied in order.
    pub sort: Vec<SortKey>,
    /// Number of leading matches to skip.
    pub skip: Option<u32>,
    /// Maximum number of matches.
    pub limit: Option<u32>,
    /// Projection.
    pub fields: Option<Vec<String>>,
}

impl RemoteQuery {
    /// A query for the whole collection.
    pub fn all() -> Self {
        Self::default()
    }

    /// A query for everything matching `filter`.
    pub fn filtered(filter: Option<Filter>) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }

    /// Returns the fingerprint of the filter.
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(self.filter.as_ref())
    }

    /// Returns true if skip or limit restricts the result to a page.
    pub fn is_paged(&self) -> bool {
        self.skip.is_some() || self.limit.is_some()
    }

    /// Returns true if the query projects fields.
    pub fn is_projected(&self) -> bool {
        self.fields.is_some()
    }

    /// Returns true if `record` passes the filter.
    pub fn matches(&self, record: &Record) -> bool {
        self.filter.as_ref().is_none_or(|f| f.matches(record))
    }

    /// Evaluates the query over a set of records: filter, stable sort,
    /// skip, limit, then projection.
    pub fn apply(&self, records: Vec<Record>) -> Vec<Record> {
        let mut matched: Vec<Record> = records.into_iter().filter(|r| self.matches(r)).collect();

        if !self.sort.is_empty() {
            matched.sort_by(|a, b| compare_by(&self.sort, a, b));
        }

        let skip = self.skip.map_or(0, |n| n as usize);
        let limit = self.limit.map_or(usize::MAX, |n| n as usize);
        let page = matched.into_iter().skip(skip).take(limit);

        match &self.fields {
            Some(fields) => page.map(|r| r.project(fields)).collect(),
            None => page.collect(),
        }
    }
}

fn compare_by(keys: &[SortKey], a: &Record, b: &Record) -> Ordering {
    for key in keys {
        let left = a.resolve(&key.field).unwrap_or(Cow::Owned(Value::Null));
        let right = b.resolve(&key.field).unwrap_or(Cow::Owned(Value::Null));
        let ordering = match key.direction {
            SortDirection::Ascending => left.cmp(&right),
            SortDirection::Descending => right.cmp(&left),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Translates an optional query for a browsing operation (find, pull).
///
/// No query, or a query without a predicate, selects the whole
/// collection.
///
/// # Errors
///
/// Returns [`QueryError::UnsupportedPredicate`] if the predicate cannot be
/// translated.
pub fn translate(query: Option<&Query>) -> QueryResult<RemoteQuery> {
    let Some(query) = query else {
        return Ok(RemoteQuery::all());
    };
    Ok(RemoteQuery {
        filter: query.predicate().map(translate_predicate).transpose()?,
        sort: query.sort_keys().to_vec(),
        skip: query.skip_count(),
        limit: query.limit_count(),
        fields: query.fields().map(<[String]>::to_vec),
    })
}

/// Translates the predicate of a query for an operation that mutates or
/// counts by predicate.
///
/// # Errors
///
/// Returns [`QueryError::NullQuery`] when no query is given,
/// [`QueryError::PredicateRequired`] when the query has no filter, and
/// [`QueryError::UnsupportedPredicate`] when the filter cannot be
/// translated.
pub fn require_predicate(query: Option<&Query>) -> QueryResult<Filter> {
    let query = query.ok_or(QueryError::NullQuery)?;
    let predicate = query.predicate().ok_or(QueryError::PredicateRequired)?;
    translate_predicate(predicate)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person(id: &str, name: &str, age: i64) -> Record {
        Record::with_id(id).field("name", name).field("age", age)
    }

    #[test]
    fn supported_predicates_translate() {
        let predicate = Predicate::gte("age", 18)
            .and(Predicate::starts_with("name", "A").or(Predicate::is_true("active")));
        let filter = translate_predicate(&predicate).unwrap();

        assert!(matches!(filter, Filter::And(ref c) if c.len() == 2));
    }

    #[test]
    fn unsupported_predicates_are_rejected() {
        for predicate in [
            Predicate::contains("name", "li"),
            Predicate::ends_with("name", "e"),
            Predicate::Constant(true),
            Predicate::And(vec![]),
            Predicate::eq("", 1),
            Predicate::eq("a", 1).and(Predicate::contains("b", "x")),
        ] {
            let err = translate_predicate(&predicate).unwrap_err();
            assert!(
                matches!(err, QueryError::UnsupportedPredicate { .. }),
                "{predicate:?}"
            );
        }
    }

    #[test]
    fn predicate_required_gate() {
        assert_eq!(require_predicate(None), Err(QueryError::NullQuery));
        assert_eq!(
            require_predicate(Some(&Query::new().sort_asc("a").limit(3).skip(1))),
            Err(QueryError::PredicateRequired)
        );
        assert!(require_predicate(Some(&Query::new().filter(Predicate::eq("a", 1)))).is_ok());
    }

    #[test]
    fn browsing_accepts_missing_predicate() {
        let remote = translate(Some(&Query::new().limit(2))).unwrap();
        assert!(remote.filter.is_none());
        assert!(remote.is_paged());
        assert_eq!(translate(None).unwrap(), RemoteQuery::all());
    }

    #[test]
    fn json_rendering() {
        let filter = translate_predicate(
            &Predicate::lt("age", 40).and(Predicate::starts_with("name", "a.b")),
        )
        .unwrap();
        assert_eq!(
            filter.to_json().to_string(),
            r#"{"$and":[{"age":{"$lt":40}},{"name":{"$regex":"^a\\.b"}}]}"#
        );

        let eq = translate_predicate(&Predicate::is_true("done")).unwrap();
        assert_eq!(eq.to_json().to_string(), r#"{"done":true}"#);
    }

    #[test]
    fn equivalent_predicates_share_fingerprint() {
        let a = Predicate::eq("x", 1).and(Predicate::eq("y", 2).and(Predicate::eq("z", 3)));
        let b = Predicate::eq("z", 3)
            .and(Predicate::eq("x", 1))
            .and(Predicate::eq("y", 2));
        let fa = Fingerprint::of(Some(&translate_predicate(&a).unwrap()));
        let fb = Fingerprint::of(Some(&translate_predicate(&b).unwrap()));

        assert_eq!(fa, fb);
        assert_eq!(fa.as_str().len(), 64);
        assert_ne!(fa, Fingerprint::of(None));
        assert_eq!(Fingerprint::of(None).as_str(), Fingerprint::UNFILTERED);
    }

    #[test]
    fn single_child_group_collapses() {
        let filter = translate_predicate(&Predicate::And(vec![Predicate::eq("a", 1)])).unwrap();
        assert!(matches!(filter, Filter::Compare { .. }));
    }

    #[test]
    fn matching_semantics() {
        let alice = person("1", "Alice", 30);

        let check = |p: Predicate| translate_predicate(&p).unwrap().matches(&alice);
        assert!(check(Predicate::eq("name", "Alice")));
        assert!(check(Predicate::ne("name", "Bob")));
        assert!(check(Predicate::gt("age", 29)));
        assert!(check(Predicate::gte("age", 30)));
        assert!(!check(Predicate::lt("age", 30)));
        assert!(check(Predicate::lte("age", 30)));
        assert!(check(Predicate::starts_with("name", "Al")));
        assert!(!check(Predicate::starts_with("age", "3")));
        assert!(!check(Predicate::gt("age", "29")));
        assert!(check(Predicate::eq("missing", ())));
        assert!(check(Predicate::eq("_id", "1")));
        assert!(check(Predicate::eq("name", "Bob").or(Predicate::eq("age", 30))));
    }

    #[test]
    fn float_fields_filter_and_sort() {
        let records = vec![
            Record::with_id("a").field("score", 2.5),
            Record::with_id("b").field("score", -1.0),
            Record::with_id("c").field("score", 10.75),
            Record::with_id("d").field("score", 3),
        ];

        let query = translate(Some(
            &Query::new()
                .filter(Predicate::gt("score", 0.0))
                .sort_asc("score"),
        ))
        .unwrap();
        let ids: Vec<_> = query
            .apply(records.clone())
            .into_iter()
            .map(|r| r.id.unwrap())
            .collect();
        // The integer 3 is another kind, so the range never holds for it.
        assert_eq!(ids, ["a", "c"]);

        let everything = translate(Some(&Query::new().sort_desc("score"))).unwrap();
        let ids: Vec<_> = everything
            .apply(records)
            .into_iter()
            .map(|r| r.id.unwrap())
            .collect();
        assert_eq!(ids, ["c", "a", "b", "d"]);

        let eq = translate_predicate(&Predicate::eq("score", 2.5)).unwrap();
        assert_eq!(eq.to_json().to_string(), r#"{"score":2.5}"#);
    }

    #[test]
    fn apply_sorts_pages_and_projects() {
        let records = vec![
            person("1", "Cara", 25),
            person("2", "Alice", 30),
            person("3", "Bob", 30),
            Record::with_id("4").field("name", "Dan"),
        ];

        let query = translate(Some(
            &Query::new()
                .filter(Predicate::gte("age", 0))
                .sort_desc("age")
                .sort_asc("name"),
        ))
        .unwrap();
        let ids: Vec<_> = query
            .apply(records.clone())
            .into_iter()
            .map(|r| r.id.unwrap())
            .collect();
        assert_eq!(ids, ["2", "3", "1"]);

        let page = translate(Some(&Query::new().sort_asc("name").skip(1).limit(2).select(["age"])))
            .unwrap()
            .apply(records);
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].id(), Some("3"));
        assert!(page[0].get("name").is_none());
        assert_eq!(page[0].get("age"), Some(&Value::Integer(30)));
    }
}
