//! A repository on a remote registry, spoken to over the OCI distribution API.

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use bytes::Bytes;
use http::header::{ACCEPT, CONTENT_LENGTH, CONTENT_TYPE, LOCATION, WWW_AUTHENTICATE};
use http::{Method, StatusCode};
use http_body_util::BodyExt as _;
use hyperdriver::client::SharedClientService;
use hyperdriver::service::SharedService;
use hyperdriver::Body;
use serde::Deserialize;
use tower::retry::RetryLayer;
use tower::ServiceExt as _;
use url::Url;

use crate::auth::{AuthenticationLayer, Challenge, RegistryAuth};
use crate::client::HttpClient;
use crate::credential::{Credential, Secret};
use crate::descriptor::{media_type, Descriptor};
use crate::digest::Digest;
use crate::error::{HttpResponseError, OciError, OciResult};
use crate::target::Target;

const DOCKER_CONTENT_DIGEST: &str = "docker-content-digest";

/// A `registry[:port]/path/to/name` repository reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepositoryReference {
    registry: String,
    name: String,
}

impl RepositoryReference {
    /// Parse a reference such as `localhost:5000/library/left-pad`.
    pub fn parse(reference: &str) -> OciResult<Self> {
        let invalid = || OciError::InvalidReference(reference.to_owned());

        let (registry, name) = reference.split_once('/').ok_or_else(invalid)?;
        if registry.is_empty()
            || registry
                .chars()
                .any(|c| c.is_whitespace() || c == '@' || c == '?' || c == '#')
        {
            return Err(invalid());
        }

        let valid_component = |component: &str| {
            !component.is_empty()
                && component != "."
                && component != ".."
                && component.chars().all(|c| {
                    c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-')
                })
        };
        if !name.split('/').all(valid_component) {
            return Err(invalid());
        }

        Ok(RepositoryReference {
            registry: registry.to_owned(),
            name: name.to_owned(),
        })
    }

    /// Registry host, including any port.
    pub fn registry(&self) -> &str {
        &self.registry
    }

    /// Repository path within the registry.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for RepositoryReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.registry, self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    Pull,
    Push,
}

impl Access {
    fn actions(self) -> &'static str {
        match self {
            Access::Pull => "pull",
            Access::Push => "pull,push",
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

/// A handle to one repository on a remote registry.
#[derive(Debug, Clone)]
pub struct Repository {
    reference: RepositoryReference,
    base: String,
    http: HttpClient,
    service: SharedClientService<Body, Body>,
    auth: Arc<ArcSwap<RegistryAuth>>,
    credential: Option<Credential>,
}

impl Repository {
    /// Create a handle for `reference`, using `http` for transport.
    ///
    /// With `plain_http` the registry is spoken to over `http://` instead of `https://`.
    pub fn new(
        http: HttpClient,
        reference: RepositoryReference,
        plain_http: bool,
        credential: Option<Credential>,
    ) -> Self {
        let scheme = if plain_http { "http" } else { "https" };
        let base = format!("{scheme}://{}/v2/{}/", reference.registry, reference.name);

        let auth = Arc::new(ArcSwap::from_pointee(
            credential
                .clone()
                .map(RegistryAuth::Basic)
                .unwrap_or_default(),
        ));

        let service = tower::ServiceBuilder::new()
            .layer(SharedService::layer())
            .layer(RetryLayer::new(http.backoff().clone()))
            .layer(AuthenticationLayer::new(auth.clone()))
            .service(http.inner().clone());

        Repository {
            reference,
            base,
            http,
            service,
            auth,
            credential,
        }
    }

    /// The reference this handle points at.
    pub fn reference(&self) -> &RepositoryReference {
        &self.reference
    }

    fn blob_url(&self, digest: &Digest) -> String {
        format!("{}blobs/{digest}", self.base)
    }

    fn manifest_url(&self, reference: &str) -> String {
        format!("{}manifests/{reference}", self.base)
    }

    /// Send a request built by `build`, answering one bearer challenge.
    ///
    /// `build` is called again after a challenge, since request bodies are
    /// consumed. Retries of reads happen in the service stack.
    async fn send<F>(&self, access: Access, build: F) -> OciResult<http::Response<Body>>
    where
        F: Fn() -> Result<http::Request<Body>, http::Error>,
    {
        let response = self
            .service
            .clone()
            .oneshot(build()?)
            .await
            .map_err(OciError::Request)?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let challenge = response
            .headers()
            .get(WWW_AUTHENTICATE)
            .and_then(|value| value.to_str().ok())
            .and_then(Challenge::parse_bearer);
        let Some(challenge) = challenge else {
            return Ok(response);
        };

        self.refresh_token(challenge, access).await?;
        self.service
            .clone()
            .oneshot(build()?)
            .await
            .map_err(OciError::Request)
    }

    /// Exchange a bearer challenge for a token and use it for later requests.
    #[tracing::instrument(level = "debug", skip_all, fields(realm = %challenge.realm))]
    async fn refresh_token(&self, challenge: Challenge, access: Access) -> OciResult<()> {
        let mut url = Url::parse(&challenge.realm).map_err(|error| {
            OciError::Unauthorized(format!("invalid token realm {}: {error}", challenge.realm))
        })?;

        let scope = challenge.scope.unwrap_or_else(|| {
            format!("repository:{}:{}", self.reference.name, access.actions())
        });
        {
            let mut query = url.query_pairs_mut();
            if let Some(service) = &challenge.service {
                query.append_pair("service", service);
            }
            query.append_pair("scope", &scope);
        }

        let mut builder = http::Request::builder()
            .method(Method::GET)
            .uri(url.as_str());
        if let Some(credential) = &self.credential {
            builder = builder.header(http::header::AUTHORIZATION, credential.basic_header());
        }
        let request = builder.body(Body::empty())?;

        let response = self
            .http
            .inner()
            .clone()
            .oneshot(request)
            .await
            .map_err(OciError::Request)?;
        let body = check(Method::GET, url.as_str(), response).await?;

        let token: TokenResponse = serde_json::from_slice(&body).map_err(|error| {
            OciError::Unauthorized(format!("invalid token response from {url}: {error}"))
        })?;
        let token = token
            .token
            .or(token.access_token)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| OciError::Unauthorized(format!("no token returned by {url}")))?;

        tracing::debug!(%scope, "obtained registry token");
        self.auth
            .store(Arc::new(RegistryAuth::Bearer(Secret::from(token))));
        Ok(())
    }

    async fn get_blob(&self, desc: &Descriptor) -> OciResult<Bytes> {
        let url = self.blob_url(&desc.digest);
        let response = self
            .send(Access::Pull, || {
                http::Request::builder()
                    .method(Method::GET)
                    .uri(url.as_str())
                    .body(Body::empty())
            })
            .await?;

        // Registries backed by object storage redirect blob downloads to a
        // pre-signed URL, which must not receive our credentials.
        if response.status().is_redirection() {
            if let Some(location) = response
                .headers()
                .get(LOCATION)
                .and_then(|value| value.to_str().ok())
            {
                let target = resolve_location(&url, location)?;
                tracing::trace!("following blob redirect to {target}");
                let request = http::Request::builder()
                    .method(Method::GET)
                    .uri(target.as_str())
                    .body(Body::empty())?;
                let response = self
                    .http
                    .inner()
                    .clone()
                    .oneshot(request)
                    .await
                    .map_err(OciError::Request)?;
                return check(Method::GET, target.as_str(), response).await;
            }
        }

        check(Method::GET, &url, response).await
    }

    async fn put_manifest(
        &self,
        desc: &Descriptor,
        content: &Bytes,
        reference: &str,
    ) -> OciResult<()> {
        let url = self.manifest_url(reference);
        let response = self
            .send(Access::Push, || {
                http::Request::builder()
                    .method(Method::PUT)
                    .uri(url.as_str())
                    .header(CONTENT_TYPE, desc.media_type.as_str())
                    .header(CONTENT_LENGTH, content.len())
                    .body(Body::from(content.clone()))
            })
            .await?;
        check(Method::PUT, &url, response).await?;
        Ok(())
    }

    async fn upload_blob(&self, desc: &Descriptor, content: &Bytes) -> OciResult<()> {
        let start = format!("{}blobs/uploads/", self.base);
        let response = self
            .send(Access::Push, || {
                http::Request::builder()
                    .method(Method::POST)
                    .uri(start.as_str())
                    .header(CONTENT_LENGTH, 0)
                    .body(Body::empty())
            })
            .await?;

        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        check(Method::POST, &start, response).await?;

        let location = location.ok_or_else(|| {
            OciError::Response(HttpResponseError {
                method: Method::POST,
                url: start.clone(),
                status: StatusCode::ACCEPTED,
                message: "no upload location returned".into(),
            })
        })?;

        let mut upload = resolve_location(&start, &location)?;
        upload
            .query_pairs_mut()
            .append_pair("digest", &desc.digest.to_string());

        let response = self
            .send(Access::Push, || {
                http::Request::builder()
                    .method(Method::PUT)
                    .uri(upload.as_str())
                    .header(CONTENT_TYPE, "application/octet-stream")
                    .header(CONTENT_LENGTH, content.len())
                    .body(Body::from(content.clone()))
            })
            .await?;
        check(Method::PUT, upload.as_str(), response).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl Target for Repository {
    async fn exists(&self, desc: &Descriptor) -> OciResult<bool> {
        let url = if desc.is_manifest() {
            self.manifest_url(&desc.digest.to_string())
        } else {
            self.blob_url(&desc.digest)
        };

        let response = self
            .send(Access::Pull, || {
                http::Request::builder()
                    .method(Method::HEAD)
                    .uri(url.as_str())
                    .header(ACCEPT, desc.media_type.as_str())
                    .body(Body::empty())
            })
            .await?;

        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => check(Method::HEAD, &url, response).await.map(|_| false),
        }
    }

    #[tracing::instrument(level = "trace", skip_all, fields(repository = %self.reference, digest = %desc.digest))]
    async fn fetch(&self, desc: &Descriptor) -> OciResult<Bytes> {
        let content = if desc.is_manifest() {
            let url = self.manifest_url(&desc.digest.to_string());
            let response = self
                .send(Access::Pull, || {
                    http::Request::builder()
                        .method(Method::GET)
                        .uri(url.as_str())
                        .header(ACCEPT, desc.media_type.as_str())
                        .body(Body::empty())
                })
                .await?;
            check(Method::GET, &url, response).await?
        } else {
            self.get_blob(desc).await?
        };

        desc.verify(&content)?;
        Ok(content)
    }

    #[tracing::instrument(level = "trace", skip_all, fields(repository = %self.reference, digest = %desc.digest))]
    async fn push(&self, desc: &Descriptor, content: Bytes) -> OciResult<()> {
        desc.verify(&content)?;
        if desc.is_manifest() {
            self.put_manifest(desc, &content, &desc.digest.to_string())
                .await
        } else {
            self.upload_blob(desc, &content).await
        }
    }

    async fn resolve(&self, reference: &str) -> OciResult<Descriptor> {
        let (desc, _) = self.fetch_reference(reference).await?;
        Ok(desc)
    }

    async fn tag(&self, desc: &Descriptor, reference: &str) -> OciResult<()> {
        let content = self.fetch(desc).await?;
        self.put_manifest(desc, &content, reference).await
    }

    #[tracing::instrument(level = "debug", skip_all, fields(repository = %self.reference, reference = %reference))]
    async fn push_reference(
        &self,
        desc: &Descriptor,
        content: Bytes,
        reference: &str,
    ) -> OciResult<()> {
        if !desc.is_manifest() {
            return Err(OciError::UnsupportedMediaType(desc.media_type.clone()));
        }
        desc.verify(&content)?;
        self.put_manifest(desc, &content, reference).await
    }

    #[tracing::instrument(level = "debug", skip_all, fields(repository = %self.reference, reference = %reference))]
    async fn fetch_reference(&self, reference: &str) -> OciResult<(Descriptor, Bytes)> {
        let url = self.manifest_url(reference);
        let accept = [
            media_type::IMAGE_MANIFEST,
            media_type::DOCKER_MANIFEST,
            media_type::IMAGE_INDEX,
        ]
        .join(", ");

        let response = self
            .send(Access::Pull, || {
                http::Request::builder()
                    .method(Method::GET)
                    .uri(url.as_str())
                    .header(ACCEPT, accept.as_str())
                    .body(Body::empty())
            })
            .await?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.split(';').next().unwrap_or(value).trim().to_owned());
        let advertised = response
            .headers()
            .get(DOCKER_CONTENT_DIGEST)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<Digest>().ok());
        let content = check(Method::GET, &url, response).await?;

        let media_type = match content_type {
            Some(media_type) if media_type::is_manifest(&media_type) => media_type,
            _ => manifest_media_type(&content),
        };

        let expected = reference.parse::<Digest>().ok().or(advertised);
        let digest = match expected {
            Some(expected) => {
                let desc = Descriptor::new(media_type.clone(), expected.clone(), content.len() as u64);
                desc.verify(&content)?;
                expected
            }
            None => Digest::from_bytes(&content),
        };

        Ok((
            Descriptor::new(media_type, digest, content.len() as u64),
            content,
        ))
    }
}

/// Fall back to the `mediaType` field when the registry sends no useful content type.
fn manifest_media_type(content: &[u8]) -> String {
    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct MediaTypeField {
        media_type: Option<String>,
    }

    serde_json::from_slice::<MediaTypeField>(content)
        .ok()
        .and_then(|sniffed| sniffed.media_type)
        .unwrap_or_else(|| media_type::IMAGE_MANIFEST.to_owned())
}

fn resolve_location(base: &str, location: &str) -> OciResult<Url> {
    Url::parse(base)
        .and_then(|base| base.join(location))
        .map_err(|error| {
            OciError::Response(HttpResponseError {
                method: Method::GET,
                url: base.to_owned(),
                status: StatusCode::BAD_GATEWAY,
                message: format!("invalid location {location}: {error}"),
            })
        })
}

/// Turn a response into its body, or an error for non-success statuses.
async fn check(
    method: Method,
    url: &str,
    response: http::Response<Body>,
) -> OciResult<Bytes> {
    let status = response.status();
    let body = response
        .into_body()
        .collect()
        .await
        .map_err(|error| OciError::Body(error.into()))?
        .to_bytes();

    if status.is_success() {
        return Ok(body);
    }

    let message = String::from_utf8_lossy(&body).trim().to_owned();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(OciError::Unauthorized(format!(
            "{method} {url}: HTTP {status}: {message}"
        )));
    }

    Err(HttpResponseError {
        method,
        url: url.to_owned(),
        status,
        message,
    }
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_reference_with_port() {
        let reference = RepositoryReference::parse("localhost:5000/library/left-pad").unwrap();
        assert_eq!(reference.registry(), "localhost:5000");
        assert_eq!(reference.name(), "library/left-pad");
        assert_eq!(reference.to_string(), "localhost:5000/library/left-pad");
    }

    #[test]
    fn reject_bad_references() {
        for input in [
            "left-pad",
            "/library/left-pad",
            "localhost/",
            "localhost/library//left-pad",
            "localhost/Left-Pad",
            "localhost/library/../etc",
            "local host/left-pad",
        ] {
            assert!(
                RepositoryReference::parse(input).is_err(),
                "{input} should be rejected"
            );
        }
    }

    #[test]
    fn location_may_be_relative_or_absolute() {
        let base = "http://localhost:5000/v2/library/pkg/blobs/uploads/";
        assert_eq!(
            resolve_location(base, "/v2/library/pkg/blobs/uploads/abc?state=1")
                .unwrap()
                .as_str(),
            "http://localhost:5000/v2/library/pkg/blobs/uploads/abc?state=1"
        );
        assert_eq!(
            resolve_location(base, "https://storage.example/upload/1")
                .unwrap()
                .as_str(),
            "https://storage.example/upload/1"
        );
    }

    #[test]
    fn media_type_from_body() {
        assert_eq!(
            manifest_media_type(br#"{"mediaType":"application/vnd.oci.image.index.v1+json"}"#),
            media_type::IMAGE_INDEX
        );
        assert_eq!(manifest_media_type(b"{}"), media_type::IMAGE_MANIFEST);
    }
}
