//! Content-addressed stores and copying between them.

use std::fmt;

use bytes::Bytes;

use crate::descriptor::{media_type, Descriptor};
use crate::error::{OciError, OciResult};
use crate::manifest::Manifest;

/// A place OCI content can be pushed to and fetched from.
///
/// Implemented by [`crate::MemoryStore`] for staging content locally and by
/// [`crate::Repository`] for a repository on a remote registry.
#[async_trait::async_trait]
pub trait Target: fmt::Debug + Send + Sync {
    /// Does the content described by `desc` exist?
    async fn exists(&self, desc: &Descriptor) -> OciResult<bool>;

    /// Fetch the content described by `desc`, verified against it.
    async fn fetch(&self, desc: &Descriptor) -> OciResult<Bytes>;

    /// Store `content`, which must match `desc`.
    async fn push(&self, desc: &Descriptor, content: Bytes) -> OciResult<()>;

    /// Resolve a tag or digest to the descriptor of a manifest.
    async fn resolve(&self, reference: &str) -> OciResult<Descriptor>;

    /// Point `reference` at existing manifest content.
    async fn tag(&self, desc: &Descriptor, reference: &str) -> OciResult<()>;

    /// Store a manifest and tag it in one step.
    async fn push_reference(
        &self,
        desc: &Descriptor,
        content: Bytes,
        reference: &str,
    ) -> OciResult<()> {
        self.push(desc, content).await?;
        self.tag(desc, reference).await
    }

    /// Resolve `reference` and fetch the manifest it points at.
    async fn fetch_reference(&self, reference: &str) -> OciResult<(Descriptor, Bytes)> {
        let desc = self.resolve(reference).await?;
        let content = self.fetch(&desc).await?;
        Ok((desc, content))
    }
}

/// Copy the manifest tagged `src_ref` in `src`, and every blob it references,
/// to `dst` under the tag `dst_ref`.
///
/// Blobs already present in `dst` are not transferred again. The manifest is
/// written last, so a reader of `dst_ref` never sees a manifest whose blobs
/// are missing.
#[tracing::instrument(level = "debug", skip_all, fields(src = %src_ref, dst = %dst_ref))]
pub async fn copy(
    src: &dyn Target,
    src_ref: &str,
    dst: &dyn Target,
    dst_ref: &str,
) -> OciResult<Descriptor> {
    let (root, content) = src.fetch_reference(src_ref).await?;
    if !media_type::MANIFESTS.contains(&root.media_type.as_str()) {
        return Err(OciError::UnsupportedMediaType(root.media_type));
    }

    let manifest = Manifest::from_slice(&content)?;
    for blob in manifest.blobs() {
        if dst.exists(blob).await? {
            tracing::trace!(digest = %blob.digest, "blob already present");
            continue;
        }

        let data = src.fetch(blob).await?;
        dst.push(blob, data).await?;
        tracing::trace!(digest = %blob.digest, size = blob.size, "copied blob");
    }

    dst.push_reference(&root, content, dst_ref).await?;
    tracing::debug!(digest = %root.digest, "copied manifest");
    Ok(root)
}
