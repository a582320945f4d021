use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{document_id, Collection, Document, Filter, StoreError, StoreResult, ID_FIELD};

/// In-process collection. Used by the test suites and by `memory://` database URIs.
#[derive(Default)]
pub struct MemoryCollection {
    name: String,
    documents: RwLock<HashMap<String, Document>>,
}

impl MemoryCollection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            documents: RwLock::default(),
        }
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }
}

#[async_trait]
impl Collection for MemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn insert_one(&self, doc: Document) -> StoreResult<()> {
        let id = document_id(&self.name, &doc)?.to_string();
        let mut documents = self.documents.write().await;
        if documents.contains_key(&id) {
            return Err(StoreError::Duplicate {
                collection: self.name.clone(),
                id,
            });
        }
        documents.insert(id, doc);
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> StoreResult<Option<Document>> {
        Ok(self.documents.read().await.get(id).cloned())
    }

    async fn find(&self, filter: &Filter) -> StoreResult<Vec<Document>> {
        Ok(self
            .documents
            .read()
            .await
            .values()
            .filter(|doc| filter.matches(doc))
            .cloned()
            .collect())
    }

    async fn update_by_id(&self, id: &str, fields: Document) -> StoreResult<bool> {
        let mut documents = self.documents.write().await;
        let Some(doc) = documents.get_mut(id) else {
            return Ok(false);
        };
        for (field, value) in fields {
            if field == ID_FIELD {
                continue;
            }
            if value.is_null() {
                doc.remove(&field);
            } else {
                doc.insert(field, value);
            }
        }
        Ok(true)
    }

    async fn delete_by_id(&self, id: &str) -> StoreResult<bool> {
        Ok(self.documents.write().await.remove(id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_ids() {
        let images = MemoryCollection::new("images");
        images.insert_one(doc(json!({"id": "a"}))).await.unwrap();

        let err = images.insert_one(doc(json!({"id": "a"}))).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { .. }));
        assert_eq!(images.len().await, 1);
    }

    #[tokio::test]
    async fn update_is_partial_and_never_creates() {
        let images = MemoryCollection::new("images");
        images
            .insert_one(doc(json!({"id": "a", "filename": "a.png", "projectId": null})))
            .await
            .unwrap();

        let updated = images
            .update_by_id("a", doc(json!({"projectId": "p1", "id": "hijack"})))
            .await
            .unwrap();
        assert!(updated);

        let stored = images.find_by_id("a").await.unwrap().unwrap();
        assert_eq!(stored["filename"], "a.png");
        assert_eq!(stored["projectId"], "p1");
        assert_eq!(stored["id"], "a");

        assert!(!images.update_by_id("missing", doc(json!({"x": 1}))).await.unwrap());
        assert!(images.find_by_id("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn null_update_unsets_the_field() {
        let images = MemoryCollection::new("images");
        images
            .insert_one(doc(json!({"id": "a", "projectId": "p1"})))
            .await
            .unwrap();

        assert!(images.update_by_id("a", doc(json!({"projectId": null}))).await.unwrap());

        let stored = images.find_by_id("a").await.unwrap().unwrap();
        assert!(!stored.contains_key("projectId"));
        assert_eq!(images.find(&Filter::eq("projectId", Value::Null)).await.unwrap().len(), 1);
        assert!(images.find(&Filter::eq("projectId", "p1")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn find_and_delete() {
        let images = MemoryCollection::new("images");
        for (id, project) in [("a", "p1"), ("b", "p2"), ("c", "p1")] {
            images
                .insert_one(doc(json!({"id": id, "projectId": project})))
                .await
                .unwrap();
        }

        let mut ids: Vec<String> = images
            .find(&Filter::eq("projectId", "p1"))
            .await
            .unwrap()
            .into_iter()
            .map(|d| d["id"].as_str().unwrap().to_string())
            .collect();
        ids.sort();
        assert_eq!(ids, ["a", "c"]);

        assert!(images.delete_by_id("a").await.unwrap());
        assert!(!images.delete_by_id("a").await.unwrap());
        assert_eq!(images.find(&Filter::all()).await.unwrap().len(), 2);
    }
}
