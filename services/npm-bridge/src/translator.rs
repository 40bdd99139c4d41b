//! Translation between NPM package documents and OCI artifacts.
//!
//! A package is stored as a single manifest whose config blob is the whole
//! package document. There are no layers.

use std::sync::Arc;

use bytes::Bytes;
use oci_artifact::{Descriptor, Manifest, MemoryStore, Target, copy, media_type};

use crate::error::{BadRequest, BridgeError, BridgeResult};
use crate::models::{DEFAULT_TAG, Package};
use crate::router::Bridge;

/// Decode and validate a publish body.
///
/// Validation happens before anything is stored: a package must carry at least
/// one attachment and one version.
pub fn parse_package(body: &[u8]) -> Result<Package, BadRequest> {
    let package: Package = serde_json::from_slice(body).map_err(BadRequest::Malformed)?;

    if package.attachments.is_empty() {
        return Err(BadRequest::NoAttachments);
    }

    if package.versions.is_empty() {
        return Err(BadRequest::NoVersions);
    }

    Ok(package)
}

/// Stage `document` as an artifact tagged `latest` in a fresh memory store.
///
/// Returns the store and the manifest descriptor.
pub async fn stage(document: Bytes) -> BridgeResult<(MemoryStore, Descriptor)> {
    let store = MemoryStore::new();

    let config = Descriptor::for_content(media_type::IMAGE_LAYER, &document);
    store.push(&config, document).await?;

    let manifest = Bytes::from(Manifest::new(config, Vec::new()).to_vec()?);
    let manifest_desc = Descriptor::for_content(media_type::IMAGE_MANIFEST, &manifest);
    store.push(&manifest_desc, manifest).await?;
    store.tag(&manifest_desc, DEFAULT_TAG).await?;

    Ok((store, manifest_desc))
}

impl Bridge {
    /// Store a published package in the backing registry.
    ///
    /// The package document is re-encoded before it is stored, so a later
    /// [`Bridge::pull`] returns that encoding rather than the original body.
    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn push(&self, body: &[u8]) -> BridgeResult<Descriptor> {
        let endpoint = self.endpoint()?;
        let package = parse_package(body)?;
        let document = Bytes::from(serde_json::to_vec(&package).map_err(BridgeError::Internal)?);

        let (staging, manifest) = stage(document).await?;

        let reference = endpoint.repository(&package.name);
        let credential = endpoint.credential();
        let repository = self
            .inner
            .registry
            .repository(&reference, credential.as_ref())?;

        match &self.inner.push_locks {
            Some(locks) => {
                let lock = locks
                    .entry(reference.clone())
                    .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                    .clone();
                let copied = {
                    let _guard = lock.lock().await;
                    copy(&staging, DEFAULT_TAG, repository.as_ref(), DEFAULT_TAG).await
                };
                // Held by the map and by us: nobody else is waiting.
                locks.remove_if(&reference, |_, held| Arc::strong_count(held) == 2);
                copied?;
            }
            None => {
                copy(&staging, DEFAULT_TAG, repository.as_ref(), DEFAULT_TAG).await?;
            }
        }

        tracing::info!(
            package = %package.name,
            repository = %reference,
            digest = %manifest.digest,
            "pushed package"
        );
        Ok(manifest)
    }

    /// Fetch the stored document for `name` from the backing registry.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn pull(&self, name: &str) -> BridgeResult<Bytes> {
        let endpoint = self.endpoint()?;
        let reference = endpoint.repository(name);
        let credential = endpoint.credential();
        let repository = self
            .inner
            .registry
            .repository(&reference, credential.as_ref())?;

        let received = MemoryStore::new();
        let root = copy(repository.as_ref(), DEFAULT_TAG, &received, DEFAULT_TAG).await?;

        let manifest = Manifest::from_slice(&received.fetch(&root).await?)?;
        let document = received.fetch(&manifest.config).await?;
        tracing::debug!(repository = %reference, size = document.len(), "pulled package");
        Ok(document)
    }
}
