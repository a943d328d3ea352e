use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};

/// One record returned from a query, with its id alongside the data.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    pub data: Value,
}

#[derive(Debug, Clone)]
pub enum Filter {
    Eq(String, Value),
}

/// A query against one collection: equality filters, an optional order field
/// with range bounds on it, and a result cap. Range bounds are how prefix
/// searches are expressed (`start_at(q)` / `end_at(q + '\u{f8ff}')`).
#[derive(Debug, Clone, Default)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order_by: Option<String>,
    pub start_at: Option<Value>,
    pub end_at: Option<Value>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter_eq(mut self, field: impl Into<String>, value: Value) -> Self {
        self.filters.push(Filter::Eq(field.into(), value));
        self
    }

    pub fn order_by(mut self, field: impl Into<String>) -> Self {
        self.order_by = Some(field.into());
        self
    }

    pub fn start_at(mut self, value: Value) -> Self {
        self.start_at = Some(value);
        self
    }

    pub fn end_at(mut self, value: Value) -> Self {
        self.end_at = Some(value);
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>>;

    async fn set(&self, collection: &str, id: &str, value: Value) -> Result<()>;

    /// Merge `fields` into an existing record. Errors if the record is absent.
    async fn update(&self, collection: &str, id: &str, fields: Map<String, Value>) -> Result<()>;

    async fn delete(&self, collection: &str, id: &str) -> Result<()>;

    async fn query(&self, collection: &str, query: Query) -> Result<Vec<Document>>;
}

/// Upper bound for a prefix range query: everything that starts with `prefix`
/// sorts between `prefix` and this.
pub fn prefix_end(prefix: &str) -> String {
    format!("{}\u{f8ff}", prefix)
}
