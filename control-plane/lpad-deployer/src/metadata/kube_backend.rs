use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{DeleteParams, ObjectMeta, PostParams};
use kube::{Api, Client};

use super::backend::{SecretBackend, StoredRecord};
use super::store::RECORD_TYPE;
use crate::errors::StoreError;

const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
const MANAGED_BY: &str = "lpad-deployer";

/// Records kept as `Secret`s through the Kubernetes API.
#[derive(Clone)]
pub struct KubeSecretBackend {
    client: Client,
}

impl KubeSecretBackend {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<Secret> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn to_secret(namespace: &str, record: &StoredRecord) -> Secret {
    let data = record
        .data
        .iter()
        .map(|(k, v)| (k.clone(), ByteString(v.clone())))
        .collect();
    Secret {
        metadata: ObjectMeta {
            name: Some(record.name.clone()),
            namespace: Some(namespace.to_string()),
            resource_version: record.resource_version.clone(),
            labels: Some(BTreeMap::from([(
                MANAGED_BY_LABEL.to_string(),
                MANAGED_BY.to_string(),
            )])),
            ..Default::default()
        },
        type_: Some(RECORD_TYPE.to_string()),
        data: Some(data),
        ..Default::default()
    }
}

fn from_secret(secret: Secret) -> StoredRecord {
    StoredRecord {
        name: secret.metadata.name.unwrap_or_default(),
        resource_version: secret.metadata.resource_version,
        data: secret
            .data
            .unwrap_or_default()
            .into_iter()
            .map(|(k, v)| (k, v.0))
            .collect(),
    }
}

fn map_kube_err(name: &str, err: kube::Error) -> StoreError {
    match err {
        kube::Error::Api(ae) if ae.code == 404 => {
            StoreError::NotFound(name.to_string())
        }
        kube::Error::Api(ae) if ae.code == 409 && ae.reason == "AlreadyExists" => {
            StoreError::AlreadyExists(name.to_string())
        }
        kube::Error::Api(ae) if ae.code == 409 => {
            StoreError::Conflict(name.to_string())
        }
        other => StoreError::Kube(other.to_string()),
    }
}

#[async_trait]
impl SecretBackend for KubeSecretBackend {
    async fn create(
        &self,
        namespace: &str,
        record: &StoredRecord,
    ) -> Result<StoredRecord, StoreError> {
        let mut secret = to_secret(namespace, record);
        secret.metadata.resource_version = None;
        self.api(namespace)
            .create(&PostParams::default(), &secret)
            .await
            .map(from_secret)
            .map_err(|e| map_kube_err(&record.name, e))
    }

    async fn get(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<StoredRecord, StoreError> {
        self.api(namespace)
            .get(name)
            .await
            .map(from_secret)
            .map_err(|e| map_kube_err(name, e))
    }

    async fn replace(
        &self,
        namespace: &str,
        record: &StoredRecord,
    ) -> Result<StoredRecord, StoreError> {
        self.api(namespace)
            .replace(&record.name, &PostParams::default(), &to_secret(namespace, record))
            .await
            .map(from_secret)
            .map_err(|e| map_kube_err(&record.name, e))
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        self.api(namespace)
            .delete(name, &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(|e| map_kube_err(name, e))
    }
}
