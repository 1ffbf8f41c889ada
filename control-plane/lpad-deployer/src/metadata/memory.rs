use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::backend::{SecretBackend, StoredRecord};
use crate::errors::StoreError;

type Key = (String, String);

/// Process-local backend with API-server-like resource versions.
#[derive(Clone, Default)]
pub struct MemorySecretBackend {
    store: Arc<RwLock<HashMap<Key, StoredRecord>>>,
    revision: Arc<AtomicU64>,
}

impl MemorySecretBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_revision(&self) -> String {
        (self.revision.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    pub async fn record_count(&self) -> usize {
        self.store.read().await.len()
    }
}

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

#[async_trait]
impl SecretBackend for MemorySecretBackend {
    async fn create(
        &self,
        namespace: &str,
        record: &StoredRecord,
    ) -> Result<StoredRecord, StoreError> {
        let mut store = self.store.write().await;
        let k = key(namespace, &record.name);
        if store.contains_key(&k) {
            return Err(StoreError::AlreadyExists(record.name.clone()));
        }
        let stored = StoredRecord {
            resource_version: Some(self.next_revision()),
            ..record.clone()
        };
        store.insert(k, stored.clone());
        Ok(stored)
    }

    async fn get(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<StoredRecord, StoreError> {
        self.store
            .read()
            .await
            .get(&key(namespace, name))
            .cloned()
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    async fn replace(
        &self,
        namespace: &str,
        record: &StoredRecord,
    ) -> Result<StoredRecord, StoreError> {
        let mut store = self.store.write().await;
        let current = store
            .get_mut(&key(namespace, &record.name))
            .ok_or_else(|| StoreError::NotFound(record.name.clone()))?;
        if record.resource_version.is_some()
            && record.resource_version != current.resource_version
        {
            return Err(StoreError::Conflict(record.name.clone()));
        }
        *current = StoredRecord {
            resource_version: Some(self.next_revision()),
            ..record.clone()
        };
        Ok(current.clone())
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        self.store
            .write()
            .await
            .remove(&key(namespace, name))
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }
}
