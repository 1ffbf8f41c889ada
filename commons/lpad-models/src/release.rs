use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const KEY_RELEASE: &str = "release";
pub const KEY_NAMESPACE: &str = "namespace";
pub const KEY_OWNER: &str = "owner";
pub const KEY_FRIENDLY_NAME: &str = "friendlyName";
pub const KEY_CATALOG: &str = "catalog";
pub const KEY_SHARE: &str = "share";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MetadataDecodeError {
    #[error("missing key: {0}")]
    MissingKey(&'static str),
    #[error("key {0} is not valid utf-8")]
    InvalidUtf8(&'static str),
}

/// Ownership record kept for every installed release.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseMetadata {
    pub release_id: String,
    pub namespace: String,
    pub owner: String,
    pub friendly_name: String,
    pub catalog_id: String,
    pub share: bool,
}

impl ReleaseMetadata {
    /// Encode as the opaque key → bytes map persisted by the store.
    pub fn to_data(&self) -> BTreeMap<String, Vec<u8>> {
        let mut data = BTreeMap::new();
        data.insert(KEY_RELEASE.into(), self.release_id.as_bytes().to_vec());
        data.insert(KEY_NAMESPACE.into(), self.namespace.as_bytes().to_vec());
        data.insert(KEY_OWNER.into(), self.owner.as_bytes().to_vec());
        data.insert(
            KEY_FRIENDLY_NAME.into(),
            self.friendly_name.as_bytes().to_vec(),
        );
        data.insert(KEY_CATALOG.into(), self.catalog_id.as_bytes().to_vec());
        data.insert(KEY_SHARE.into(), self.share.to_string().into_bytes());
        data
    }

    /// Decode from a stored map. `friendlyName`, `namespace` and `release`
    /// are optional for records written by older versions; `share` defaults
    /// to false.
    pub fn from_data(
        data: &BTreeMap<String, Vec<u8>>,
    ) -> Result<Self, MetadataDecodeError> {
        let text = |key: &'static str| -> Result<Option<String>, MetadataDecodeError> {
            data.get(key)
                .map(|v| {
                    String::from_utf8(v.clone())
                        .map_err(|_| MetadataDecodeError::InvalidUtf8(key))
                })
                .transpose()
        };
        let owner =
            text(KEY_OWNER)?.ok_or(MetadataDecodeError::MissingKey(KEY_OWNER))?;
        let catalog_id = text(KEY_CATALOG)?
            .ok_or(MetadataDecodeError::MissingKey(KEY_CATALOG))?;
        Ok(Self {
            release_id: text(KEY_RELEASE)?.unwrap_or_default(),
            namespace: text(KEY_NAMESPACE)?.unwrap_or_default(),
            owner,
            friendly_name: text(KEY_FRIENDLY_NAME)?.unwrap_or_default(),
            catalog_id,
            share: text(KEY_SHARE)?.as_deref() == Some("true"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn share_flag_is_stored_as_text() {
        let meta = ReleaseMetadata {
            release_id: "jupyter-1".into(),
            namespace: "user-alice".into(),
            owner: "alice".into(),
            friendly_name: "My notebook".into(),
            catalog_id: "ide".into(),
            share: true,
        };
        let data = meta.to_data();
        assert_eq!(data[KEY_SHARE], b"true".to_vec());
        assert_eq!(ReleaseMetadata::from_data(&data).unwrap(), meta);
    }

    #[test]
    fn missing_owner_is_rejected() {
        let mut data = BTreeMap::new();
        data.insert(KEY_CATALOG.to_string(), b"ide".to_vec());
        assert_eq!(
            ReleaseMetadata::from_data(&data),
            Err(MetadataDecodeError::MissingKey(KEY_OWNER))
        );
    }
}
