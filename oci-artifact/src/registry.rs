//! Opening repositories by reference.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::client::HttpClient;
use crate::credential::Credential;
use crate::error::OciResult;
use crate::memory::MemoryStore;
use crate::remote::{Repository, RepositoryReference};
use crate::target::Target;

/// Opens repository handles by `registry/name` reference.
pub trait Registry: fmt::Debug + Send + Sync {
    /// Open the repository at `reference`, authenticating with `credential`.
    fn repository(
        &self,
        reference: &str,
        credential: Option<&Credential>,
    ) -> OciResult<Arc<dyn Target>>;
}

/// Registries reached over HTTP(S).
#[derive(Debug, Clone, Default)]
pub struct RemoteRegistry {
    http: HttpClient,
    plain_http: bool,
}

impl RemoteRegistry {
    /// Create a registry opener sharing `http` between repositories.
    pub fn new(http: HttpClient, plain_http: bool) -> Self {
        Self { http, plain_http }
    }
}

impl Registry for RemoteRegistry {
    fn repository(
        &self,
        reference: &str,
        credential: Option<&Credential>,
    ) -> OciResult<Arc<dyn Target>> {
        let reference = RepositoryReference::parse(reference)?;
        let repository: Arc<dyn Target> = Arc::new(Repository::new(
            self.http.clone(),
            reference,
            self.plain_http,
            credential.cloned(),
        ));
        Ok(repository)
    }
}

/// A registry held entirely in memory, one [`MemoryStore`] per repository.
#[derive(Default)]
pub struct MemoryRegistry {
    repositories: Mutex<HashMap<String, Arc<MemoryStore>>>,
    connections: AtomicUsize,
}

impl fmt::Debug for MemoryRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryRegistry")
            .field("repositories", &self.repositories.lock().len())
            .field("connections", &self.connections())
            .finish()
    }
}

impl MemoryRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// How many times a repository has been opened.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// The store behind `reference`, if it has ever been opened.
    pub fn get(&self, reference: &str) -> Option<Arc<MemoryStore>> {
        self.repositories.lock().get(reference).cloned()
    }
}

impl Registry for MemoryRegistry {
    fn repository(
        &self,
        reference: &str,
        _credential: Option<&Credential>,
    ) -> OciResult<Arc<dyn Target>> {
        let reference = RepositoryReference::parse(reference)?;
        self.connections.fetch_add(1, Ordering::SeqCst);

        let store: Arc<dyn Target> = self
            .repositories
            .lock()
            .entry(reference.to_string())
            .or_default()
            .clone();
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static_assertions::assert_impl_all!(MemoryRegistry: Send, Sync);
    static_assertions::assert_impl_all!(RemoteRegistry: Send, Sync);

    #[test]
    fn memory_registry_shares_stores_per_reference() {
        let registry = MemoryRegistry::new();
        registry.repository("localhost/library/a", None).unwrap();
        registry.repository("localhost/library/a", None).unwrap();
        registry.repository("localhost/library/b", None).unwrap();

        assert_eq!(registry.connections(), 3);
        assert!(registry.get("localhost/library/a").is_some());
        assert!(registry.get("localhost/library/c").is_none());
    }

    #[test]
    fn invalid_reference_is_not_counted() {
        let registry = MemoryRegistry::new();
        assert!(registry.repository("not-a-reference", None).is_err());
        assert_eq!(registry.connections(), 0);
    }
}
