//! Storage adapter: a thin capability over a named document collection.
//!
//! Handlers never talk to DynamoDB directly, they receive a `&dyn Collection`
//! for images and one for projects and go through the primitives below.

pub mod dynamo;
pub mod memory;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

pub use dynamo::DynamoCollection;
pub use memory::MemoryCollection;

/// A stored record. Always an object carrying a string `id` field.
pub type Document = Map<String, Value>;

/// Name of the identifier field every document carries.
pub const ID_FIELD: &str = "id";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{collection}: backend error: {message}")]
    Backend { collection: String, message: String },

    #[error("{collection}: document '{id}' already exists")]
    Duplicate { collection: String, id: String },

    #[error("{collection}: document has no string 'id' field")]
    MissingId { collection: String },

    #[error("document conversion failed: {0}")]
    Conversion(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Equality filter: every clause must match. An empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    clauses: Vec<(String, Value)>,
    consistent: bool,
}

impl Filter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::all().and_eq(field, value)
    }

    pub fn and_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.clauses.push((field.into(), value.into()));
        self
    }

    /// Require a strongly consistent read. Backends skip eventually
    /// consistent secondary indexes for such filters.
    pub fn consistent(mut self) -> Self {
        self.consistent = true;
        self
    }

    pub fn is_consistent(&self) -> bool {
        self.consistent
    }

    pub fn clauses(&self) -> &[(String, Value)] {
        &self.clauses
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Evaluate the filter against an in-memory document. A missing field
    /// only matches a `null` clause.
    pub fn matches(&self, doc: &Document) -> bool {
        self.clauses
            .iter()
            .all(|(field, value)| doc.get(field).unwrap_or(&Value::Null) == value)
    }
}

#[async_trait]
pub trait Collection: Send + Sync {
    /// Collection name, used in logs and errors.
    fn name(&self) -> &str;

    /// Cheap round trip proving the backend is reachable and the collection exists.
    async fn ping(&self) -> StoreResult<()>;

    /// Insert a new document. Fails with `Duplicate` if the id is taken.
    async fn insert_one(&self, doc: Document) -> StoreResult<()>;

    async fn find_by_id(&self, id: &str) -> StoreResult<Option<Document>>;

    async fn find(&self, filter: &Filter) -> StoreResult<Vec<Document>>;

    /// Set the given fields on an existing document. Returns `false` when the
    /// document does not exist; never creates one. The `id` field is ignored.
    async fn update_by_id(&self, id: &str, fields: Document) -> StoreResult<bool>;

    /// Returns `false` when there was nothing to delete.
    async fn delete_by_id(&self, id: &str) -> StoreResult<bool>;
}

/// Serialize a record into a document.
pub fn to_document<T: Serialize>(record: &T) -> StoreResult<Document> {
    match serde_json::to_value(record).map_err(|e| StoreError::Conversion(e.to_string()))? {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::Conversion(format!(
            "expected an object, got {other}"
        ))),
    }
}

/// Deserialize a document back into a record.
pub fn from_document<T: DeserializeOwned>(doc: Document) -> StoreResult<T> {
    serde_json::from_value(Value::Object(doc)).map_err(|e| StoreError::Conversion(e.to_string()))
}

pub(crate) fn document_id<'a>(collection: &str, doc: &'a Document) -> StoreResult<&'a str> {
    doc.get(ID_FIELD)
        .and_then(Value::as_str)
        .ok_or_else(|| StoreError::MissingId {
            collection: collection.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert!(Filter::all().matches(&doc(json!({"id": "a"}))));
    }

    #[test]
    fn filter_requires_every_clause() {
        let d = doc(json!({"id": "a", "projectId": "p1", "size": 3}));
        assert!(Filter::eq("projectId", "p1").matches(&d));
        assert!(Filter::eq("projectId", "p1").and_eq("size", 3).matches(&d));
        assert!(!Filter::eq("projectId", "p1").and_eq("size", 4).matches(&d));
    }

    #[test]
    fn missing_field_matches_null_only() {
        let d = doc(json!({"id": "a"}));
        assert!(Filter::eq("projectId", Value::Null).matches(&d));
        assert!(!Filter::eq("projectId", "p1").matches(&d));
    }

    #[test]
    fn to_document_rejects_non_objects() {
        assert!(to_document(&vec![1, 2]).is_err());
        assert!(document_id("images", &doc(json!({"name": "x"}))).is_err());
    }
}
