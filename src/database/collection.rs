use std::marker::PhantomData;
use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};

use super::{DocumentStore, Filter, StoreError};

/// Typed view over one collection of a [`DocumentStore`].
pub struct Collection<T> {
    name: &'static str,
    store: Arc<dyn DocumentStore>,
    _phantom: PhantomData<T>,
}

impl<T> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            store: self.store.clone(),
            _phantom: PhantomData,
        }
    }
}

impl<T> Collection<T>
where
    T: Serialize + DeserializeOwned + Send,
{
    pub fn new(name: &'static str, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            name,
            store,
            _phantom: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub async fn find(&self, id: &str) -> Result<Option<T>, StoreError> {
        match self.store.get(self.name, id).await? {
            Some(doc) => Ok(Some(serde_json::from_value(doc)?)),
            None => Ok(None),
        }
    }

    pub async fn get_404(&self, id: &str) -> Result<T, StoreError> {
        self.find(id).await?.ok_or_else(|| StoreError::NotFound {
            collection: self.name,
            id: id.to_string(),
        })
    }

    pub async fn list(&self, filter: &Filter) -> Result<Vec<T>, StoreError> {
        self.store
            .list(self.name, filter)
            .await?
            .into_iter()
            .map(|doc| serde_json::from_value(doc).map_err(StoreError::from))
            .collect()
    }

    pub async fn create(&self, id: &str, value: &T) -> Result<(), StoreError> {
        self.store.insert(self.name, id, serde_json::to_value(value)?).await
    }

    pub async fn update(&self, id: &str, patch: Map<String, Value>) -> Result<T, StoreError> {
        let doc = self.store.update(self.name, id, patch).await?;
        Ok(serde_json::from_value(doc)?)
    }

    pub async fn put(&self, id: &str, value: &T) -> Result<(), StoreError> {
        self.store.put(self.name, id, serde_json::to_value(value)?).await
    }

    pub async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.store.delete(self.name, id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryStore;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Widget {
        widget_id: String,
        size: u32,
    }

    #[tokio::test]
    async fn typed_round_trip_through_store() {
        let widgets: Collection<Widget> = Collection::new("widgets", Arc::new(MemoryStore::new()));
        let widget = Widget { widget_id: "w1".into(), size: 3 };
        widgets.create("w1", &widget).await.unwrap();

        assert_eq!(widgets.get_404("w1").await.unwrap(), widget);
        assert!(matches!(widgets.get_404("w2").await, Err(StoreError::NotFound { .. })));

        let mut patch = Map::new();
        patch.insert("size".into(), json!(5));
        assert_eq!(widgets.update("w1", patch).await.unwrap().size, 5);
        assert_eq!(widgets.list(&Filter::new()).await.unwrap().len(), 1);
    }
}
