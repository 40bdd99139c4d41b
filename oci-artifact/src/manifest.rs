//! OCI image manifests.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::descriptor::{media_type, Descriptor};
use crate::error::OciError;

/// An OCI image manifest: one config descriptor plus zero or more layers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// Always 2 for image manifests.
    pub schema_version: u32,

    /// Media type of the manifest itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,

    /// Config blob
    pub config: Descriptor,

    /// Layer blobs, in order.
    #[serde(default, deserialize_with = "nullable_layers")]
    pub layers: Vec<Descriptor>,

    /// Optional annotations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
}

// Some clients write `"layers": null` for an empty layer list.
fn nullable_layers<'de, D>(deserializer: D) -> Result<Vec<Descriptor>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<Descriptor>>::deserialize(deserializer)?.unwrap_or_default())
}

impl Manifest {
    /// Create a schema 2 OCI image manifest.
    pub fn new(config: Descriptor, layers: Vec<Descriptor>) -> Self {
        Manifest {
            schema_version: 2,
            media_type: Some(media_type::IMAGE_MANIFEST.to_owned()),
            config,
            layers,
            annotations: None,
        }
    }

    /// Decode a manifest from JSON.
    pub fn from_slice(data: &[u8]) -> Result<Self, OciError> {
        serde_json::from_slice(data).map_err(OciError::InvalidManifest)
    }

    /// Encode the manifest as compact JSON.
    pub fn to_vec(&self) -> Result<Vec<u8>, OciError> {
        serde_json::to_vec(self).map_err(OciError::InvalidManifest)
    }

    /// All blobs referenced by this manifest, config first.
    pub fn blobs(&self) -> impl Iterator<Item = &Descriptor> {
        std::iter::once(&self.config).chain(self.layers.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Descriptor {
        Descriptor::for_content(media_type::IMAGE_LAYER, b"{\"name\":\"left-pad\"}")
    }

    #[test]
    fn new_manifest_has_schema_two_and_empty_layers() {
        let manifest = Manifest::new(config(), Vec::new());
        let value: serde_json::Value =
            serde_json::from_slice(&manifest.to_vec().unwrap()).unwrap();

        assert_eq!(value["schemaVersion"], 2);
        assert_eq!(value["mediaType"], media_type::IMAGE_MANIFEST);
        assert_eq!(value["config"]["mediaType"], media_type::IMAGE_LAYER);
        assert_eq!(value["layers"], serde_json::json!([]));
    }

    #[test]
    fn accepts_null_layers() {
        let config = config();
        let json = format!(
            r#"{{"schemaVersion":2,"config":{{"mediaType":"{}","digest":"{}","size":{}}},"layers":null}}"#,
            config.media_type, config.digest, config.size
        );

        let manifest = Manifest::from_slice(json.as_bytes()).unwrap();
        assert!(manifest.layers.is_empty());
        assert_eq!(manifest.media_type, None);
        assert_eq!(manifest.blobs().count(), 1);
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            Manifest::from_slice(b"not json"),
            Err(OciError::InvalidManifest(_))
        ));
    }
}
