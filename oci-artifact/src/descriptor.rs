//! Content descriptors and the media types this crate works with.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::digest::Digest;
use crate::error::OciError;

/// Well-known OCI and Docker media types.
pub mod media_type {
    /// OCI image manifest
    pub const IMAGE_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";

    /// OCI image index
    pub const IMAGE_INDEX: &str = "application/vnd.oci.image.index.v1+json";

    /// Generic (uncompressed tar) OCI layer.
    pub const IMAGE_LAYER: &str = "application/vnd.oci.image.layer.v1.tar";

    /// Docker schema 2 manifest, structurally identical to the OCI manifest.
    pub const DOCKER_MANIFEST: &str = "application/vnd.docker.distribution.manifest.v2+json";

    /// Docker manifest list, the Docker counterpart of an image index.
    pub const DOCKER_MANIFEST_LIST: &str =
        "application/vnd.docker.distribution.manifest.list.v2+json";

    /// Media types which can be decoded as a [`crate::Manifest`].
    pub const MANIFESTS: &[&str] = &[IMAGE_MANIFEST, DOCKER_MANIFEST];

    /// Returns true if the media type names a manifest or index, which
    /// registries store under `/manifests/` rather than `/blobs/`.
    pub fn is_manifest(media_type: &str) -> bool {
        matches!(
            media_type,
            IMAGE_MANIFEST | IMAGE_INDEX | DOCKER_MANIFEST | DOCKER_MANIFEST_LIST
        )
    }
}

/// Describes a piece of content by media type, digest and size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    /// Media type of the referenced content.
    pub media_type: String,

    /// Digest of the referenced content.
    pub digest: Digest,

    /// Size in bytes of the referenced content.
    pub size: u64,

    /// Optional annotations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
}

impl Descriptor {
    /// Create a descriptor from its parts.
    pub fn new(media_type: impl Into<String>, digest: Digest, size: u64) -> Self {
        Self {
            media_type: media_type.into(),
            digest,
            size,
            annotations: None,
        }
    }

    /// Describe `content` with a SHA-256 digest.
    pub fn for_content(media_type: impl Into<String>, content: &[u8]) -> Self {
        Self::new(media_type, Digest::from_bytes(content), content.len() as u64)
    }

    /// Does this descriptor point at a manifest?
    pub fn is_manifest(&self) -> bool {
        media_type::is_manifest(&self.media_type)
    }

    /// Check that `content` is exactly what this descriptor describes.
    pub fn verify(&self, content: &[u8]) -> Result<(), OciError> {
        let actual = content.len() as u64;
        if actual != self.size {
            return Err(OciError::SizeMismatch {
                expected: self.size,
                actual,
            });
        }

        if !self.digest.verify(content) {
            return Err(OciError::DigestMismatch {
                expected: self.digest.to_string(),
                actual: Digest::with_algorithm(self.digest.algorithm(), content).to_string(),
            });
        }

        Ok(())
    }
}
