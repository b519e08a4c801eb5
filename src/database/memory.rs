use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use super::models::collections;
use super::{field_text, matches_filter, AuditFilter, AuditStore, DocumentStore, Filter, StoreError};
use crate::audit::AuditRecord;

#[derive(Default)]
struct Documents {
    next_seq: u64,
    // collection -> id -> (insertion sequence, document)
    collections: HashMap<&'static str, BTreeMap<String, (u64, Value)>>,
}

/// Process-local store used when no database is configured, and in tests.
#[derive(Clone, Default)]
pub struct MemoryStore {
    documents: Arc<RwLock<Documents>>,
    audit: Arc<RwLock<Vec<AuditRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of audit records appended so far.
    pub async fn audit_len(&self) -> usize {
        self.audit.read().await.len()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &'static str, id: &str) -> Result<Option<Value>, StoreError> {
        let documents = self.documents.read().await;
        Ok(documents
            .collections
            .get(collection)
            .and_then(|c| c.get(id))
            .map(|(_, doc)| doc.clone()))
    }

    async fn list(&self, collection: &'static str, filter: &Filter) -> Result<Vec<Value>, StoreError> {
        let documents = self.documents.read().await;
        let mut rows: Vec<&(u64, Value)> = documents
            .collections
            .get(collection)
            .map(|c| c.values().filter(|(_, doc)| matches_filter(doc, filter)).collect())
            .unwrap_or_default();
        rows.sort_by_key(|(seq, _)| *seq);
        Ok(rows.into_iter().map(|(_, doc)| doc.clone()).collect())
    }

    async fn insert(&self, collection: &'static str, id: &str, document: Value) -> Result<(), StoreError> {
        let mut guard = self.documents.write().await;
        let documents = &mut *guard;
        let seq = documents.next_seq;
        let entries = documents.collections.entry(collection).or_default();
        if entries.contains_key(id) {
            return Err(StoreError::AlreadyExists { collection, id: id.to_string() });
        }
        if let Some(field) = collections::unique_field(collection) {
            if let Some(value) = document.get(field) {
                if entries.values().any(|(_, doc)| doc.get(field) == Some(value)) {
                    return Err(StoreError::Duplicate { collection, field, value: field_text(value) });
                }
            }
        }
        entries.insert(id.to_string(), (seq, document));
        documents.next_seq += 1;
        Ok(())
    }

    async fn update(
        &self,
        collection: &'static str,
        id: &str,
        patch: Map<String, Value>,
    ) -> Result<Value, StoreError> {
        let mut documents = self.documents.write().await;
        let (_, document) = documents
            .collections
            .get_mut(collection)
            .and_then(|c| c.get_mut(id))
            .ok_or_else(|| StoreError::NotFound { collection, id: id.to_string() })?;

        let object = document
            .as_object_mut()
            .ok_or_else(|| StoreError::Unavailable(format!("{collection} '{id}' is not an object")))?;
        for (key, value) in patch {
            object.insert(key, value);
        }
        Ok(document.clone())
    }

    async fn put(&self, collection: &'static str, id: &str, document: Value) -> Result<(), StoreError> {
        let mut guard = self.documents.write().await;
        let documents = &mut *guard;
        let seq = documents.next_seq;
        let entries = documents.collections.entry(collection).or_default();
        match entries.get_mut(id) {
            Some((_, existing)) => *existing = document,
            None => {
                entries.insert(id.to_string(), (seq, document));
                documents.next_seq += 1;
            }
        }
        Ok(())
    }

    async fn delete(&self, collection: &'static str, id: &str) -> Result<(), StoreError> {
        let mut documents = self.documents.write().await;
        documents
            .collections
            .get_mut(collection)
            .and_then(|c| c.remove(id))
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound { collection, id: id.to_string() })
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[async_trait]
impl AuditStore for MemoryStore {
    async fn append(&self, record: &AuditRecord) -> Result<(), StoreError> {
        self.audit.write().await.push(record.clone());
        Ok(())
    }

    async fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditRecord>, StoreError> {
        let records = self.audit.read().await;
        Ok(records.iter().rev().filter(|r| filter.matches(r)).cloned().collect())
    }
}
