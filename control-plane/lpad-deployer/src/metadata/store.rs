use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use lpad_models::ReleaseMetadata;
use tracing::{debug, info, instrument, warn};

use super::backend::{SecretBackend, StoredRecord};
use crate::errors::StoreError;

pub const RECORD_PREFIX: &str = "lpad.release.v1.";
pub const RECORD_TYPE: &str = "lpad.io/release.v1";

pub fn record_name(release: &str) -> String {
    format!("{RECORD_PREFIX}{release}")
}

/// Capped exponential backoff for optimistic-concurrency retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub initial: Duration,
    pub factor: u32,
    pub max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            initial: Duration::from_millis(10),
            factor: 2,
            max: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn with_attempts(attempts: u32) -> Self {
        Self {
            attempts: attempts.max(1),
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let scale = self.factor.saturating_pow(attempt);
        self.initial.saturating_mul(scale).min(self.max)
    }
}

/// Idempotent storage of one ownership record per release.
#[derive(Clone)]
pub struct ReleaseMetadataStore {
    backend: Arc<dyn SecretBackend>,
    retry: RetryPolicy,
}

impl ReleaseMetadataStore {
    pub fn new(backend: Arc<dyn SecretBackend>, retry: RetryPolicy) -> Self {
        Self { backend, retry }
    }

    /// Create or overwrite the record for `release`. Safe to call
    /// concurrently for the same release; the record converges to the data
    /// of the last successful write.
    #[instrument(skip(self, data), fields(record = %record_name(release)))]
    pub async fn ensure_record(
        &self,
        namespace: &str,
        release: &str,
        data: BTreeMap<String, Vec<u8>>,
    ) -> Result<(), StoreError> {
        let name = record_name(release);
        let fresh = StoredRecord {
            name: name.clone(),
            data,
            resource_version: None,
        };

        match self.backend.create(namespace, &fresh).await {
            Ok(_) => {
                info!(namespace, "release record created");
                return Ok(());
            }
            Err(StoreError::AlreadyExists(_)) => {}
            Err(e) => return Err(e),
        }

        for attempt in 0..self.retry.attempts {
            match self.try_update(namespace, &fresh).await {
                Ok(()) => {
                    info!(namespace, attempt, "release record updated");
                    return Ok(());
                }
                Err(StoreError::Conflict(_))
                | Err(StoreError::AlreadyExists(_))
                | Err(StoreError::NotFound(_)) => {
                    debug!(namespace, attempt, "record changed underneath; retrying");
                }
                Err(e) => return Err(e),
            }
            tokio::time::sleep(self.retry.delay(attempt)).await;
        }

        warn!(namespace, attempts = self.retry.attempts, "giving up on release record");
        Err(StoreError::SecretConflict {
            namespace: namespace.to_string(),
            name,
        })
    }

    /// One read-modify-write round. A record deleted since the create
    /// attempt is created again.
    async fn try_update(
        &self,
        namespace: &str,
        fresh: &StoredRecord,
    ) -> Result<(), StoreError> {
        let current = match self.backend.get(namespace, &fresh.name).await {
            Ok(current) => current,
            Err(StoreError::NotFound(_)) => {
                return self.backend.create(namespace, fresh).await.map(|_| ());
            }
            Err(e) => return Err(e),
        };
        let next = StoredRecord {
            data: fresh.data.clone(),
            ..current
        };
        self.backend.replace(namespace, &next).await.map(|_| ())
    }

    pub async fn ensure_metadata(
        &self,
        metadata: &ReleaseMetadata,
    ) -> Result<(), StoreError> {
        self.ensure_record(
            &metadata.namespace,
            &metadata.release_id,
            metadata.to_data(),
        )
        .await
    }

    /// Raw record data, or `None` when there is no record.
    pub async fn read(
        &self,
        namespace: &str,
        release: &str,
    ) -> Result<Option<BTreeMap<String, Vec<u8>>>, StoreError> {
        match self.backend.get(namespace, &record_name(release)).await {
            Ok(record) => Ok(Some(record.data)),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn read_metadata(
        &self,
        namespace: &str,
        release: &str,
    ) -> Result<Option<ReleaseMetadata>, StoreError> {
        self.read(namespace, release)
            .await?
            .map(|data| ReleaseMetadata::from_data(&data).map_err(StoreError::from))
            .transpose()
    }

    /// Remove the record. A missing record is not an error.
    #[instrument(skip(self))]
    pub async fn delete(
        &self,
        namespace: &str,
        release: &str,
    ) -> Result<(), StoreError> {
        match self.backend.delete(namespace, &record_name(release)).await {
            Ok(()) => {
                info!("release record deleted");
                Ok(())
            }
            Err(StoreError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}
