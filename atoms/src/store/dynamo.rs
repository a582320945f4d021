use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client as DynamoClient;
use serde_json::{Number, Value};

use super::{document_id, Collection, Document, Filter, StoreError, StoreResult, ID_FIELD};

type Item = HashMap<String, AttributeValue>;

/// One DynamoDB table per collection, partition key `id` (string).
#[derive(Clone)]
pub struct DynamoCollection {
    client: DynamoClient,
    table_name: String,
    /// Optional GSI: (attribute, index name). Equality lookups on the
    /// attribute are served by a Query on the index instead of a Scan.
    index: Option<(String, String)>,
}

impl DynamoCollection {
    pub fn new(client: DynamoClient, table_name: impl Into<String>) -> Self {
        Self {
            client,
            table_name: table_name.into(),
            index: None,
        }
    }

    pub fn with_index(mut self, field: impl Into<String>, index_name: impl Into<String>) -> Self {
        self.index = Some((field.into(), index_name.into()));
        self
    }

    fn backend_error(&self, op: &str, e: impl std::fmt::Display) -> StoreError {
        StoreError::Backend {
            collection: self.table_name.clone(),
            message: format!("DynamoDB {op} error: {e}"),
        }
    }

    fn key(id: &str) -> Item {
        HashMap::from([(ID_FIELD.to_string(), AttributeValue::S(id.to_string()))])
    }

    /// The index that can serve this filter, if any.
    fn index_for<'a>(&'a self, filter: &'a Filter) -> Option<(&'a str, &'a str, &'a Value)> {
        let (field, index_name) = self.index.as_ref()?;
        match filter.clauses() {
            _ if filter.is_consistent() => None,
            [(clause_field, value)] if clause_field == field && (value.is_string() || value.is_number()) => {
                Some((field.as_str(), index_name.as_str(), value))
            }
            _ => None,
        }
    }

    async fn scan(&self, filter: &Filter) -> StoreResult<Vec<Document>> {
        let expression = FilterExpression::build(filter);
        let mut documents = Vec::new();
        let mut start_key: Option<Item> = None;

        loop {
            let mut builder = self
                .client
                .scan()
                .table_name(&self.table_name)
                .consistent_read(true)
                .set_exclusive_start_key(start_key.take());

            if let Some(expression) = &expression {
                builder = builder
                    .filter_expression(expression.expression.clone())
                    .set_expression_attribute_names(Some(expression.names.clone()))
                    .set_expression_attribute_values(Some(expression.values.clone()));
            }

            let output = builder.send().await.map_err(|e| self.backend_error("scan", e))?;
            documents.extend(output.items().iter().map(item_to_document));

            match output.last_evaluated_key() {
                Some(key) if !key.is_empty() => start_key = Some(key.clone()),
                _ => break,
            }
        }

        Ok(documents)
    }

    async fn query_index(&self, field: &str, index_name: &str, value: &Value) -> StoreResult<Vec<Document>> {
        let mut documents = Vec::new();
        let mut start_key: Option<Item> = None;

        loop {
            let output = self
                .client
                .query()
                .table_name(&self.table_name)
                .index_name(index_name)
                .key_condition_expression("#k = :k")
                .expression_attribute_names("#k", field)
                .expression_attribute_values(":k", to_attribute(value))
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .map_err(|e| self.backend_error("query", e))?;

            documents.extend(output.items().iter().map(item_to_document));

            match output.last_evaluated_key() {
                Some(key) if !key.is_empty() => start_key = Some(key.clone()),
                _ => break,
            }
        }

        Ok(documents)
    }
}

#[async_trait]
impl Collection for DynamoCollection {
    fn name(&self) -> &str {
        &self.table_name
    }

    async fn ping(&self) -> StoreResult<()> {
        self.client
            .describe_table()
            .table_name(&self.table_name)
            .send()
            .await
            .map_err(|e| self.backend_error("describe_table", e))?;
        Ok(())
    }

    async fn insert_one(&self, doc: Document) -> StoreResult<()> {
        let id = document_id(&self.table_name, &doc)?.to_string();

        let result = self
            .client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(document_to_item(&doc)))
            .condition_expression("attribute_not_exists(#id)")
            .expression_attribute_names("#id", ID_FIELD)
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e)
                if e.as_service_error()
                    .is_some_and(|se| se.is_conditional_check_failed_exception()) =>
            {
                Err(StoreError::Duplicate {
                    collection: self.table_name.clone(),
                    id,
                })
            }
            Err(e) => Err(self.backend_error("put_item", e)),
        }
    }

    async fn find_by_id(&self, id: &str) -> StoreResult<Option<Document>> {
        let output = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .set_key(Some(Self::key(id)))
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| self.backend_error("get_item", e))?;

        Ok(output.item().map(item_to_document))
    }

    async fn find(&self, filter: &Filter) -> StoreResult<Vec<Document>> {
        match self.index_for(filter) {
            Some((field, index_name, value)) => self.query_index(field, index_name, value).await,
            None => self.scan(filter).await,
        }
    }

    async fn update_by_id(&self, id: &str, fields: Document) -> StoreResult<bool> {
        let Some(update) = UpdateExpression::build(&fields) else {
            return Ok(self.find_by_id(id).await?.is_some());
        };

        let result = self
            .client
            .update_item()
            .table_name(&self.table_name)
            .set_key(Some(Self::key(id)))
            .update_expression(update.expression)
            .condition_expression("attribute_exists(#id)")
            .set_expression_attribute_names(Some(update.names))
            .set_expression_attribute_values((!update.values.is_empty()).then_some(update.values))
            .send()
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(e)
                if e.as_service_error()
                    .is_some_and(|se| se.is_conditional_check_failed_exception()) =>
            {
                Ok(false)
            }
            Err(e) => Err(self.backend_error("update_item", e)),
        }
    }

    async fn delete_by_id(&self, id: &str) -> StoreResult<bool> {
        let result = self
            .client
            .delete_item()
            .table_name(&self.table_name)
            .set_key(Some(Self::key(id)))
            .condition_expression("attribute_exists(#id)")
            .expression_attribute_names("#id", ID_FIELD)
            .send()
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(e)
                if e.as_service_error()
                    .is_some_and(|se| se.is_conditional_check_failed_exception()) =>
            {
                Ok(false)
            }
            Err(e) => Err(self.backend_error("delete_item", e)),
        }
    }
}

/// `#f0 = :v0 AND ...` with the matching placeholder maps.
struct FilterExpression {
    expression: String,
    names: HashMap<String, String>,
    values: HashMap<String, AttributeValue>,
}

impl FilterExpression {
    fn build(filter: &Filter) -> Option<Self> {
        if filter.is_empty() {
            return None;
        }

        let mut parts = Vec::new();
        let mut names = HashMap::new();
        let mut values = HashMap::new();

        for (i, (field, value)) in filter.clauses().iter().enumerate() {
            names.insert(format!("#f{i}"), field.clone());
            if value.is_null() {
                // A null clause also matches documents that never had the field.
                values.insert(format!(":t{i}"), AttributeValue::S("NULL".to_string()));
                parts.push(format!("(attribute_not_exists(#f{i}) OR attribute_type(#f{i}, :t{i}))"));
            } else {
                values.insert(format!(":v{i}"), to_attribute(value));
                parts.push(format!("#f{i} = :v{i}"));
            }
        }

        Some(Self {
            expression: parts.join(" AND "),
            names,
            values,
        })
    }
}

/// `SET #f0 = :v0, ... REMOVE #f1, ...` for a partial update. Null fields are
/// removed rather than stored, matching [`document_to_item`].
struct UpdateExpression {
    expression: String,
    names: HashMap<String, String>,
    values: HashMap<String, AttributeValue>,
}

impl UpdateExpression {
    fn build(fields: &Document) -> Option<Self> {
        let mut sets = Vec::new();
        let mut removes = Vec::new();
        let mut names = HashMap::from([("#id".to_string(), ID_FIELD.to_string())]);
        let mut values = HashMap::new();

        for (i, (field, value)) in fields.iter().filter(|(f, _)| f.as_str() != ID_FIELD).enumerate() {
            names.insert(format!("#f{i}"), field.clone());
            if value.is_null() {
                removes.push(format!("#f{i}"));
            } else {
                sets.push(format!("#f{i} = :v{i}"));
                values.insert(format!(":v{i}"), to_attribute(value));
            }
        }

        let mut clauses = Vec::new();
        if !sets.is_empty() {
            clauses.push(format!("SET {}", sets.join(", ")));
        }
        if !removes.is_empty() {
            clauses.push(format!("REMOVE {}", removes.join(", ")));
        }
        if clauses.is_empty() {
            return None;
        }

        Some(Self {
            expression: clauses.join(" "),
            names,
            values,
        })
    }
}

/// Top-level nulls are left out of the item. An index key attribute must be
/// absent, not NULL, and a missing field reads back as null anyway.
pub fn document_to_item(doc: &Document) -> Item {
    doc.iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| (k.clone(), to_attribute(v)))
        .collect()
}

pub fn item_to_document(item: &Item) -> Document {
    item.iter().map(|(k, v)| (k.clone(), from_attribute(v))).collect()
}

pub fn to_attribute(value: &Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null(true),
        Value::Bool(b) => AttributeValue::Bool(*b),
        Value::Number(n) => AttributeValue::N(n.to_string()),
        Value::String(s) => AttributeValue::S(s.clone()),
        Value::Array(items) => AttributeValue::L(items.iter().map(to_attribute).collect()),
        Value::Object(map) => AttributeValue::M(
            map.iter().map(|(k, v)| (k.clone(), to_attribute(v))).collect(),
        ),
    }
}

pub fn from_attribute(attr: &AttributeValue) -> Value {
    match attr {
        AttributeValue::Null(_) => Value::Null,
        AttributeValue::Bool(b) => Value::Bool(*b),
        AttributeValue::N(n) => parse_number(n),
        AttributeValue::S(s) => Value::String(s.clone()),
        AttributeValue::L(items) => Value::Array(items.iter().map(from_attribute).collect()),
        AttributeValue::M(map) => Value::Object(
            map.iter().map(|(k, v)| (k.clone(), from_attribute(v))).collect(),
        ),
        AttributeValue::Ss(items) => Value::Array(items.iter().cloned().map(Value::String).collect()),
        AttributeValue::Ns(items) => Value::Array(items.iter().map(|n| parse_number(n)).collect()),
        // Binary attributes are never written by this service.
        _ => Value::Null,
    }
}

fn parse_number(n: &str) -> Value {
    if let Ok(i) = n.parse::<i64>() {
        return Value::from(i);
    }
    if let Ok(u) = n.parse::<u64>() {
        return Value::from(u);
    }
    n.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(n.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nested_ground_truth_survives_conversion() {
        let value = json!({
            "annotations": [
                {"label": "ក", "bbox": [1, 2.5, -3, 4]},
                {"label": "ខ", "confidence": null, "verified": true}
            ],
            "meta": {"tool": "annotator", "lang": "khm"}
        });

        assert_eq!(from_attribute(&to_attribute(&value)), value);
    }

    #[test]
    fn numbers_keep_integer_and_float_kinds() {
        assert_eq!(parse_number("42"), json!(42));
        assert_eq!(parse_number("-7"), json!(-7));
        assert_eq!(parse_number("18446744073709551615"), json!(u64::MAX));
        assert_eq!(parse_number("0.25"), json!(0.25));
    }

    #[test]
    fn string_sets_become_arrays() {
        let attr = AttributeValue::Ss(vec!["a".into(), "b".into()]);
        assert_eq!(from_attribute(&attr), json!(["a", "b"]));
    }

    #[test]
    fn filter_expression_uses_placeholders() {
        let filter = Filter::eq("projectId", "p1").and_eq("size", 10);
        let expr = FilterExpression::build(&filter).unwrap();

        assert_eq!(expr.expression, "#f0 = :v0 AND #f1 = :v1");
        assert_eq!(expr.names["#f0"], "projectId");
        assert_eq!(expr.values[":v0"], AttributeValue::S("p1".into()));
        assert_eq!(expr.values[":v1"], AttributeValue::N("10".into()));
        assert!(FilterExpression::build(&Filter::all()).is_none());
    }

    #[test]
    fn null_clause_matches_missing_attribute() {
        let expr = FilterExpression::build(&Filter::eq("projectId", Value::Null)).unwrap();
        assert_eq!(
            expr.expression,
            "(attribute_not_exists(#f0) OR attribute_type(#f0, :t0))"
        );
    }

    #[test]
    fn unset_fields_are_left_out_of_items() {
        let doc = json!({
            "id": "img-1",
            "projectId": null,
            "groundTruth": {"meta": null}
        });
        let item = document_to_item(doc.as_object().unwrap());

        assert!(!item.contains_key("projectId"));
        assert_eq!(item["id"], AttributeValue::S("img-1".into()));
        assert_eq!(from_attribute(&item["groundTruth"]), json!({"meta": null}));
    }

    #[test]
    fn null_fields_are_removed_on_update() {
        let fields = json!({"id": "ignored", "name": "Batch", "projectId": null});
        let update = UpdateExpression::build(fields.as_object().unwrap()).unwrap();

        assert_eq!(update.expression, "SET #f0 = :v0 REMOVE #f1");
        assert_eq!(update.names["#f0"], "name");
        assert_eq!(update.names["#f1"], "projectId");
        assert_eq!(update.values.len(), 1);
        assert!(!update.names.values().any(|f| f == "ignored"));
        assert_eq!(update.names["#id"], "id");
    }

    #[test]
    fn detaching_only_removes() {
        let fields = json!({"projectId": null});
        let update = UpdateExpression::build(fields.as_object().unwrap()).unwrap();

        assert_eq!(update.expression, "REMOVE #f0");
        assert!(update.values.is_empty());
        assert!(UpdateExpression::build(json!({"id": "x"}).as_object().unwrap()).is_none());
    }

    fn offline_collection() -> DynamoCollection {
        use aws_sdk_dynamodb::config::{BehaviorVersion, Region};

        let config = aws_sdk_dynamodb::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .build();
        DynamoCollection::new(DynamoClient::from_conf(config), "annotator.images")
            .with_index("projectId", "projectId-index")
    }

    #[test]
    fn consistent_filters_skip_the_index() {
        let images = offline_collection();

        let indexed = Filter::eq("projectId", "p1");
        assert_eq!(
            images.index_for(&indexed).map(|(_, index, _)| index),
            Some("projectId-index")
        );
        assert!(images.index_for(&indexed.consistent()).is_none());
        assert!(images.index_for(&Filter::eq("projectId", Value::Null)).is_none());
    }
}
