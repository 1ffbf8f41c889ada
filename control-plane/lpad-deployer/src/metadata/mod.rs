pub mod backend;
pub mod kube_backend;
pub mod memory;
pub mod store;

pub use backend::{SecretBackend, StoredRecord};
pub use kube_backend::KubeSecretBackend;
pub use memory::MemorySecretBackend;
pub use store::{
    RECORD_PREFIX, RECORD_TYPE, ReleaseMetadataStore, RetryPolicy, record_name,
};
