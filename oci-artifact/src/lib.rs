//! # OCI Artifacts
//!
//! Store arbitrary content in OCI registries as single-manifest artifacts.
//!
//! Content is staged in a [`MemoryStore`], then [`copy`]-ed to a remote
//! [`Repository`] under a tag. Reading it back is the reverse copy. Any
//! [`Target`] can be the source or destination of a copy, so tests can use
//! a [`MemoryRegistry`] in place of a real registry.
//!
//! ```no_run
//! # use bytes::Bytes;
//! # use oci_artifact::*;
//! # async fn demo() -> OciResult<()> {
//! let config = Bytes::from_static(b"{\"name\":\"left-pad\"}");
//! let config_desc = Descriptor::for_content(media_type::IMAGE_LAYER, &config);
//! let manifest = Bytes::from(Manifest::new(config_desc.clone(), Vec::new()).to_vec()?);
//! let manifest_desc = Descriptor::for_content(media_type::IMAGE_MANIFEST, &manifest);
//!
//! let staging = MemoryStore::new();
//! staging.push(&config_desc, config).await?;
//! staging.push_reference(&manifest_desc, manifest, "latest").await?;
//!
//! let registry = RemoteRegistry::new(HttpClient::default(), true);
//! let repository = registry.repository("localhost:5000/library/left-pad", None)?;
//! copy(&staging, "latest", repository.as_ref(), "latest").await?;
//! # Ok(())
//! # }
//! ```

mod auth;
mod client;
mod credential;
mod descriptor;
mod digest;
mod error;
mod manifest;
mod memory;
mod registry;
mod remote;
mod retry;
mod target;

pub use self::auth::{
    Authentication, AuthenticationLayer, AuthenticationService, Challenge, RegistryAuth,
};
pub use self::client::{HttpClient, DEFAULT_TIMEOUT};
pub use self::credential::{basic_auth, Credential, Secret};
pub use self::descriptor::{media_type, Descriptor};
pub use self::digest::{Algorithm, Digest};
pub use self::error::{HttpResponseError, OciError, OciResult};
pub use self::manifest::Manifest;
pub use self::memory::MemoryStore;
pub use self::registry::{MemoryRegistry, Registry, RemoteRegistry};
pub use self::remote::{Repository, RepositoryReference};
pub use self::retry::Backoff;
pub use self::target::{copy, Target};
