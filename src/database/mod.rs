pub mod collection;
pub mod memory;
pub mod models;
pub mod postgres;

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::audit::AuditRecord;

pub use collection::Collection;
pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Errors from the persistence bridge
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{collection} '{id}' not found")]
    NotFound { collection: &'static str, id: String },

    #[error("{collection} '{id}' already exists")]
    AlreadyExists { collection: &'static str, id: String },

    #[error("{collection} with {field} '{value}' already exists")]
    Duplicate {
        collection: &'static str,
        field: &'static str,
        value: String,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Equality filters on top-level document fields, compared as text.
/// Handlers forward query parameters here verbatim.
pub type Filter = BTreeMap<String, String>;

/// Document persistence for the admin resources. Collections are flat
/// id-to-JSON-object maps.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: &'static str, id: &str) -> Result<Option<Value>, StoreError>;

    /// Documents matching `filter`, oldest first.
    async fn list(&self, collection: &'static str, filter: &Filter) -> Result<Vec<Value>, StoreError>;

    /// Fails with `AlreadyExists` when `id` is taken, and with `Duplicate`
    /// when the collection's unique field is already in use.
    async fn insert(&self, collection: &'static str, id: &str, document: Value) -> Result<(), StoreError>;

    /// Shallow-merge `patch` into an existing document and return the result.
    async fn update(
        &self,
        collection: &'static str,
        id: &str,
        patch: Map<String, Value>,
    ) -> Result<Value, StoreError>;

    /// Insert or replace.
    async fn put(&self, collection: &'static str, id: &str, document: Value) -> Result<(), StoreError>;

    async fn delete(&self, collection: &'static str, id: &str) -> Result<(), StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

/// Query over stored audit records, used by the reporting endpoint only.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub user_id: Option<String>,
    pub resource: Option<String>,
    pub action: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl AuditFilter {
    pub fn matches(&self, record: &AuditRecord) -> bool {
        self.user_id.as_deref().map_or(true, |v| record.user_id == v)
            && self.resource.as_deref().map_or(true, |v| record.resource == v)
            && self.action.as_deref().map_or(true, |v| record.action == v)
            && self.start.map_or(true, |start| record.timestamp >= start)
            && self.end.map_or(true, |end| record.timestamp <= end)
    }
}

/// Append-only audit storage.
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn append(&self, record: &AuditRecord) -> Result<(), StoreError>;

    /// Matching records, newest first.
    async fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditRecord>, StoreError>;
}

/// Text form of a document field for filter comparison.
pub(crate) fn field_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub(crate) fn matches_filter(document: &Value, filter: &Filter) -> bool {
    filter.iter().all(|(field, expected)| {
        document
            .get(field)
            .map_or(false, |actual| field_text(actual) == *expected)
    })
}
