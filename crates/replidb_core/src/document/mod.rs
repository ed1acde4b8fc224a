//! Documents and their reserved fields.

mod id;

pub use id::DocId;

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field holding the document id.
pub const DOC_ID: &str = "_id";
/// Field holding the local revision counter.
pub const DOC_REVISION: &str = "_revision";
/// Field holding the sequence value of the last local write.
pub const DOC_MODIFIED: &str = "_modified";
/// Field holding the provenance of the document.
pub const DOC_SOURCE: &str = "_source";
/// Provenance marker for documents written by the replicator.
pub const REPLICATOR: &str = "replicator";

/// An ordered mapping from field names to JSON values.
///
/// Field order is insertion order. Values can be scalars, nested objects
/// or arrays. The fields starting with an underscore listed above are
/// reserved and maintained by the store.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document {
    fields: Map<String, Value>,
}

impl Document {
    /// Creates an empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a document from a JSON value, which must be an object.
    pub fn from_value(value: Value) -> CoreResult<Self> {
        match value {
            Value::Object(fields) => {
                let doc = Self { fields };
                doc.validate()?;
                Ok(doc)
            }
            other => Err(CoreError::invalid_document(format!(
                "expected a JSON object, got {other}"
            ))),
        }
    }

    /// Builder-style field setter.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.put(key, value);
        self
    }

    /// Sets a field, returning the previous value.
    pub fn put(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(key.into(), value.into())
    }

    /// Gets a field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Removes a field, keeping the order of the others.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.fields.shift_remove(key)
    }

    /// Returns true if the field is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Number of fields, reserved ones included.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if the document has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterates over fields in order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    /// Returns the id, if one has been assigned.
    pub fn id(&self) -> Option<DocId> {
        self.fields
            .get(DOC_ID)
            .and_then(Value::as_i64)
            .map(DocId::from_value)
    }

    /// Sets the id.
    pub fn set_id(&mut self, id: DocId) {
        self.fields.insert(DOC_ID.into(), Value::from(id.value()));
    }

    /// Returns the local revision, 0 if never stored.
    pub fn revision(&self) -> u64 {
        self.fields
            .get(DOC_REVISION)
            .and_then(Value::as_u64)
            .unwrap_or(0)
    }

    /// Returns the sequence value of the last local write.
    pub fn modified(&self) -> Option<i64> {
        self.fields.get(DOC_MODIFIED).and_then(Value::as_i64)
    }

    /// Returns the provenance marker.
    pub fn source(&self) -> Option<&str> {
        self.fields.get(DOC_SOURCE).and_then(Value::as_str)
    }

    /// Sets the provenance marker.
    pub fn set_source(&mut self, source: impl Into<String>) {
        self.fields
            .insert(DOC_SOURCE.into(), Value::String(source.into()));
    }

    /// Returns true if the document was written locally by the replicator.
    pub fn is_replicated(&self) -> bool {
        self.source() == Some(REPLICATOR)
    }

    /// Returns the fields as a JSON object.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Consumes the document into a JSON value.
    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }

    /// Checks the reserved fields have the expected types.
    pub fn validate(&self) -> CoreResult<()> {
        if let Some(id) = self.fields.get(DOC_ID) {
            if id.as_i64().is_none() {
                return Err(CoreError::invalid_document(format!(
                    "{DOC_ID} must be a 64-bit integer, got {id}"
                )));
            }
        }
        if let Some(source) = self.fields.get(DOC_SOURCE) {
            if !source.is_string() {
                return Err(CoreError::invalid_document(format!(
                    "{DOC_SOURCE} must be a string, got {source}"
                )));
            }
        }
        Ok(())
    }

    pub(crate) fn stamp_local(&mut self, revision: u64, modified: i64) {
        self.fields.shift_remove(DOC_SOURCE);
        self.fields
            .insert(DOC_REVISION.into(), Value::from(revision));
        self.fields
            .insert(DOC_MODIFIED.into(), Value::from(modified));
    }
}

impl From<Map<String, Value>> for Document {
    fn from(fields: Map<String, Value>) -> Self {
        Self { fields }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builder_and_accessors() {
        let doc = Document::new().with("name", "ada").with("age", 36);
        assert_eq!(doc.get("name").unwrap(), "ada");
        assert_eq!(doc.get("age").unwrap(), 36);
        assert_eq!(doc.len(), 2);
        assert!(doc.id().is_none());
        assert_eq!(doc.revision(), 0);
    }

    #[test]
    fn preserves_field_order() {
        let mut doc = Document::new().with("z", 1).with("a", 2).with("m", 3);
        doc.remove("a");
        let keys: Vec<_> = doc.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, ["z", "m"]);
    }

    #[test]
    fn from_value_requires_object() {
        assert!(Document::from_value(json!([1, 2])).is_err());
        let doc = Document::from_value(json!({"_id": 5, "x": {"y": [1, 2]}})).unwrap();
        assert_eq!(doc.id(), Some(DocId::from_value(5)));
    }

    #[test]
    fn rejects_non_integer_id() {
        let err = Document::from_value(json!({"_id": "abc"})).unwrap_err();
        assert!(matches!(err, CoreError::InvalidDocument { .. }));
    }

    #[test]
    fn source_marker() {
        let mut doc = Document::new();
        assert!(!doc.is_replicated());
        doc.set_source(REPLICATOR);
        assert!(doc.is_replicated());
        doc.stamp_local(2, 100);
        assert!(doc.source().is_none());
        assert_eq!(doc.revision(), 2);
        assert_eq!(doc.modified(), Some(100));
    }

    #[test]
    fn serializes_as_plain_object() {
        let mut doc = Document::new().with("a", 1);
        doc.set_id(DocId::from_value(9));
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json, json!({"a": 1, "_id": 9}));
    }
}
