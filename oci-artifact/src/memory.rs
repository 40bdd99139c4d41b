//! In-memory content store.

use std::collections::HashMap;

use bytes::Bytes;
use tokio::sync::RwLock;

use crate::descriptor::Descriptor;
use crate::digest::Digest;
use crate::error::{OciError, OciResult};
use crate::target::Target;

/// A [`Target`] which keeps everything in memory.
///
/// Used to stage an artifact before copying it to a registry, and to receive
/// an artifact copied out of one.
#[derive(Debug, Default)]
pub struct MemoryStore {
    blobs: RwLock<HashMap<Digest, (Descriptor, Bytes)>>,
    tags: RwLock<HashMap<String, Descriptor>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// True if nothing has been pushed.
    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }

    /// Names of all tags in the store.
    pub async fn tags(&self) -> Vec<String> {
        let mut tags: Vec<_> = self.tags.read().await.keys().cloned().collect();
        tags.sort();
        tags
    }
}

#[async_trait::async_trait]
impl Target for MemoryStore {
    async fn exists(&self, desc: &Descriptor) -> OciResult<bool> {
        Ok(self.blobs.read().await.contains_key(&desc.digest))
    }

    async fn fetch(&self, desc: &Descriptor) -> OciResult<Bytes> {
        self.blobs
            .read()
            .await
            .get(&desc.digest)
            .map(|(_, content)| content.clone())
            .ok_or_else(|| OciError::NotFound(desc.digest.to_string()))
    }

    async fn push(&self, desc: &Descriptor, content: Bytes) -> OciResult<()> {
        desc.verify(&content)?;
        self.blobs
            .write()
            .await
            .insert(desc.digest.clone(), (desc.clone(), content));
        Ok(())
    }

    async fn resolve(&self, reference: &str) -> OciResult<Descriptor> {
        if let Some(desc) = self.tags.read().await.get(reference) {
            return Ok(desc.clone());
        }

        if let Ok(digest) = reference.parse::<Digest>() {
            if let Some((desc, _)) = self.blobs.read().await.get(&digest) {
                return Ok(desc.clone());
            }
        }

        Err(OciError::NotFound(reference.to_owned()))
    }

    async fn tag(&self, desc: &Descriptor, reference: &str) -> OciResult<()> {
        if !self.blobs.read().await.contains_key(&desc.digest) {
            return Err(OciError::NotFound(desc.digest.to_string()));
        }

        self.tags
            .write()
            .await
            .insert(reference.to_owned(), desc.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::media_type;

    #[tokio::test]
    async fn push_then_fetch() {
        let store = MemoryStore::new();
        let desc = Descriptor::for_content(media_type::IMAGE_LAYER, b"data");

        assert!(!store.exists(&desc).await.unwrap());
        store.push(&desc, Bytes::from_static(b"data")).await.unwrap();
        assert!(store.exists(&desc).await.unwrap());
        assert_eq!(store.fetch(&desc).await.unwrap(), Bytes::from_static(b"data"));
    }

    #[tokio::test]
    async fn push_rejects_mismatched_content() {
        let store = MemoryStore::new();
        let desc = Descriptor::for_content(media_type::IMAGE_LAYER, b"data");

        let err = store.push(&desc, Bytes::from_static(b"date")).await.unwrap_err();
        assert!(matches!(err, OciError::DigestMismatch { .. }));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn tag_requires_content() {
        let store = MemoryStore::new();
        let desc = Descriptor::for_content(media_type::IMAGE_MANIFEST, b"{}");

        assert!(store.tag(&desc, "latest").await.unwrap_err().is_not_found());

        store.push(&desc, Bytes::from_static(b"{}")).await.unwrap();
        store.tag(&desc, "latest").await.unwrap();
        assert_eq!(store.resolve("latest").await.unwrap(), desc);
        assert_eq!(store.resolve(&desc.digest.to_string()).await.unwrap(), desc);
        assert_eq!(store.tags().await, vec!["latest".to_owned()]);
    }
}
