use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use uuid::Uuid;

use edgeflow_domain::{StoreClient, StoreError, StoredObject};

/// Store backed by a process-local map. Suitable for development and
/// tests; contents do not survive a restart.
#[derive(Default)]
pub struct InMemoryStore {
    items: RwLock<HashMap<String, StoredObject>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StoreClient for InMemoryStore {
    async fn store(&self, mut item: StoredObject) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();
        item.id = id.clone();
        self.items
            .write()
            .map_err(|_| StoreError::Backend("item map lock poisoned".to_string()))?
            .insert(id.clone(), item);
        Ok(id)
    }

    async fn retrieve_from_store(
        &self,
        app_service_key: &str,
    ) -> Result<Vec<StoredObject>, StoreError> {
        Ok(self
            .items
            .read()
            .map_err(|_| StoreError::Backend("item map lock poisoned".to_string()))?
            .values()
            .filter(|item| item.app_service_key == app_service_key)
            .cloned()
            .collect())
    }

    async fn update(&self, item: &StoredObject) -> Result<(), StoreError> {
        let mut items = self
            .items
            .write()
            .map_err(|_| StoreError::Backend("item map lock poisoned".to_string()))?;
        if !items.contains_key(&item.id) {
            return Err(StoreError::NotFound(item.id.clone()));
        }
        items.insert(item.id.clone(), item.clone());
        Ok(())
    }

    async fn remove_from_store(&self, item: &StoredObject) -> Result<(), StoreError> {
        self.items
            .write()
            .map_err(|_| StoreError::Backend("item map lock poisoned".to_string()))?
            .remove(&item.id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(item.id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(service_key: &str) -> StoredObject {
        let mut item = StoredObject::new(service_key, b"payload".to_vec(), 1, "hash");
        item.correlation_id = "corr-1".to_string();
        item
    }

    #[tokio::test]
    async fn store_assigns_an_id_and_retrieve_filters_by_service_key() {
        let store = InMemoryStore::new();
        let id = store.store(item("service-a")).await.unwrap();
        assert!(!id.is_empty());
        store.store(item("service-b")).await.unwrap();

        let items = store.retrieve_from_store("service-a").await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, id);
        assert_eq!(items[0].app_service_key, "service-a");
    }

    #[tokio::test]
    async fn update_replaces_an_existing_item() {
        let store = InMemoryStore::new();
        let id = store.store(item("service-a")).await.unwrap();

        let mut updated = store.retrieve_from_store("service-a").await.unwrap().remove(0);
        updated.retry_count = 4;
        store.update(&updated).await.unwrap();

        let items = store.retrieve_from_store("service-a").await.unwrap();
        assert_eq!(items[0].id, id);
        assert_eq!(items[0].retry_count, 4);
    }

    #[tokio::test]
    async fn update_of_a_missing_item_fails() {
        let store = InMemoryStore::new();
        let mut missing = item("service-a");
        missing.id = "missing".to_string();
        let err = store.update(&missing).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn remove_deletes_the_item() {
        let store = InMemoryStore::new();
        store.store(item("service-a")).await.unwrap();
        let stored = store.retrieve_from_store("service-a").await.unwrap().remove(0);

        store.remove_from_store(&stored).await.unwrap();
        assert!(store.retrieve_from_store("service-a").await.unwrap().is_empty());

        let err = store.remove_from_store(&stored).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
