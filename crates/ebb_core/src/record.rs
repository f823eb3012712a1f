//! Records and their change-tracking metadata.

use crate::value::Value;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Prefix of ids assigned locally to records saved without one.
///
/// Such a record has never reached the remote; the id is replaced by the
/// server-assigned one when the record is pushed.
pub const LOCAL_ID_PREFIX: &str = "temp_";

/// Field path that resolves to the record id in filters and sorts.
const ID_FIELD: &str = "_id";

/// Generates a fresh local id.
pub fn generate_local_id() -> String {
    format!("{LOCAL_ID_PREFIX}{}", Uuid::new_v4().simple())
}

/// Returns true if `id` was assigned locally.
pub fn is_local_id(id: &str) -> bool {
    id.starts_with(LOCAL_ID_PREFIX)
}

/// Change-tracking metadata, owned by the remote service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    /// Time of the last modification.
    #[serde(default)]
    pub last_modified: Option<DateTime<Utc>>,
    /// Time the entity was first created.
    #[serde(default)]
    pub entity_creation_time: Option<DateTime<Utc>>,
}

/// One application document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Entity id, unique within its collection. `None` until saved.
    #[serde(default)]
    pub id: Option<String>,
    /// Application fields.
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,
    /// Change-tracking metadata.
    #[serde(default)]
    pub metadata: Metadata,
}

impl Record {
    /// Creates an empty record without an id.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty record with the given id.
    #[must_use]
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    /// Sets a field, builder style.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Sets a field in place.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(name.into(), value.into());
    }

    /// Removes a field.
    pub fn unset(&mut self, name: &str) -> Option<Value> {
        self.fields.remove(name)
    }

    /// Returns a top-level field.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Returns the id, if any.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Returns true if the record carries a locally assigned id.
    pub fn has_local_id(&self) -> bool {
        self.id().is_some_and(is_local_id)
    }

    /// Resolves a field path.
    ///
    /// `_id` resolves to the record id; dotted paths descend into map
    /// values (`address.city`).
    pub fn resolve(&self, path: &str) -> Option<Cow<'_, Value>> {
        if path == ID_FIELD {
            return self.id.as_ref().map(|id| Cow::Owned(Value::Text(id.clone())));
        }

        let mut segments = path.split('.');
        let mut current = self.fields.get(segments.next()?)?;
        for segment in segments {
            current = current.get(segment)?;
        }
        Some(Cow::Borrowed(current))
    }

    /// Returns a copy keeping only the listed fields (id and metadata are
    /// always kept).
    #[must_use]
    pub fn project(&self, fields: &[String]) -> Record {
        Record {
            id: self.id.clone(),
            fields: self
                .fields
                .iter()
                .filter(|(name, _)| fields.iter().any(|f| f == *name))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            metadata: self.metadata.clone(),
        }
    }

    /// Stamps local modification metadata.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.metadata.last_modified = Some(now);
        if self.metadata.entity_creation_time.is_none() {
            self.metadata.entity_creation_time = Some(now);
        }
    }

    /// Returns a copy without a local id, ready to send to the remote.
    #[must_use]
    pub fn for_remote(&self) -> Record {
        let mut copy = self.clone();
        if copy.has_local_id() {
            copy.id = None;
        }
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_ids() {
        let id = generate_local_id();
        assert!(is_local_id(&id));
        assert!(!is_local_id("abc"));
        assert_ne!(generate_local_id(), id);

        assert!(Record::with_id(id).has_local_id());
        assert!(!Record::new().has_local_id());
    }

    #[test]
    fn resolve_paths() {
        let record = Record::with_id("r1")
            .field("title", "Dune")
            .field("address", Value::map([("city", Value::from("Oslo"))]));

        assert_eq!(record.resolve("_id").as_deref(), Some(&Value::from("r1")));
        assert_eq!(record.resolve("title").as_deref(), Some(&Value::from("Dune")));
        assert_eq!(
            record.resolve("address.city").as_deref(),
            Some(&Value::from("Oslo"))
        );
        assert!(record.resolve("address.zip").is_none());
        assert!(record.resolve("title.length").is_none());
        assert!(Record::new().resolve("_id").is_none());
    }

    #[test]
    fn project_keeps_id_and_selected_fields() {
        let record = Record::with_id("r1")
            .field("a", 1)
            .field("b", 2)
            .field("c", 3);

        let projected = record.project(&["a".into(), "c".into()]);
        assert_eq!(projected.id(), Some("r1"));
        assert_eq!(projected.fields.len(), 2);
        assert!(projected.get("b").is_none());
    }

    #[test]
    fn touch_sets_creation_once() {
        let mut record = Record::new();
        let first = Utc::now();
        record.touch(first);
        let later = first + chrono::Duration::seconds(5);
        record.touch(later);

        assert_eq!(record.metadata.entity_creation_time, Some(first));
        assert_eq!(record.metadata.last_modified, Some(later));
    }

    #[test]
    fn for_remote_strips_local_id() {
        let local = Record::with_id(generate_local_id()).field("x", 1);
        assert_eq!(local.for_remote().id, None);

        let known = Record::with_id("server-1");
        assert_eq!(known.for_remote().id(), Some("server-1"));
    }
}
