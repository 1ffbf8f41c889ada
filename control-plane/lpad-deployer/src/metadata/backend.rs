use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::errors::StoreError;

/// One stored ownership record as seen by a backend.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StoredRecord {
    pub name: String,
    pub data: BTreeMap<String, Vec<u8>>,
    /// Opaque optimistic-concurrency token; `None` on records not yet
    /// persisted.
    pub resource_version: Option<String>,
}

/// Minimal secret CRUD the metadata store is written against.
///
/// Implementations report `StoreError::NotFound`, `AlreadyExists` and
/// `Conflict` for the matching API outcomes so the store can retry on them.
#[async_trait]
pub trait SecretBackend: Send + Sync {
    async fn create(
        &self,
        namespace: &str,
        record: &StoredRecord,
    ) -> Result<StoredRecord, StoreError>;

    async fn get(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<StoredRecord, StoreError>;

    /// Replace a record; fails with `Conflict` when `resource_version` is
    /// stale.
    async fn replace(
        &self,
        namespace: &str,
        record: &StoredRecord,
    ) -> Result<StoredRecord, StoreError>;

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), StoreError>;
}
