//! Authentication for registry requests.
//!
//! Registries either accept Basic credentials directly, or answer `401` with a
//! `WWW-Authenticate: Bearer ...` challenge naming a token service. The
//! [`RegistryAuth`] in use is held in an [`ArcSwap`] so that a token obtained
//! from a challenge can replace Basic credentials without rebuilding the client.

use std::sync::Arc;

use arc_swap::ArcSwap;
use tower::layer::Layer;

use crate::credential::{Credential, Secret};

/// Applies authorization to an outgoing request.
pub trait Authentication {
    /// Add authorization to `req`.
    fn authenticate<B>(&self, req: http::Request<B>) -> http::Request<B>;
}

/// The authorization currently used for a repository.
#[derive(Debug, Clone, Default)]
pub enum RegistryAuth {
    /// No credentials
    #[default]
    Anonymous,

    /// Username and password sent on every request.
    Basic(Credential),

    /// A token obtained from the registry's token service.
    Bearer(Secret),
}

impl Authentication for RegistryAuth {
    fn authenticate<B>(&self, mut req: http::Request<B>) -> http::Request<B> {
        if req.headers().contains_key(http::header::AUTHORIZATION) {
            tracing::trace!("{} header already set", http::header::AUTHORIZATION);
            return req;
        }

        let value = match self {
            RegistryAuth::Anonymous => return req,
            RegistryAuth::Basic(credential) => credential.basic_header(),
            RegistryAuth::Bearer(token) => match token.bearer() {
                Ok(value) => value,
                Err(_) => {
                    tracing::warn!("bearer token is not a valid header value");
                    return req;
                }
            },
        };

        req.headers_mut()
            .insert(http::header::AUTHORIZATION, value);
        req
    }
}

/// A layer to provide a swappable authentication mechanism.
#[derive(Debug)]
pub struct AuthenticationLayer<A> {
    auth: Arc<ArcSwap<A>>,
}

impl<A> Clone for AuthenticationLayer<A> {
    fn clone(&self) -> Self {
        Self {
            auth: self.auth.clone(),
        }
    }
}

impl<A> AuthenticationLayer<A> {
    /// Create a layer reading authorization from `auth` on every request.
    pub fn new(auth: Arc<ArcSwap<A>>) -> Self {
        Self { auth }
    }
}

impl<A, S> Layer<S> for AuthenticationLayer<A> {
    type Service = AuthenticationService<A, S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthenticationService {
            inner,
            auth: self.auth.clone(),
        }
    }
}

/// Service produced by [`AuthenticationLayer`].
#[derive(Debug)]
pub struct AuthenticationService<A, S> {
    inner: S,
    auth: Arc<ArcSwap<A>>,
}

impl<A, S: Clone> Clone for AuthenticationService<A, S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            auth: self.auth.clone(),
        }
    }
}

impl<A, S, BIn, BOut> tower::Service<http::Request<BIn>> for AuthenticationService<A, S>
where
    A: Authentication,
    S: tower::Service<http::Request<BIn>, Response = http::Response<BOut>>,
{
    type Response = http::Response<BOut>;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: http::Request<BIn>) -> Self::Future {
        let req = self.auth.load().authenticate(req);
        self.inner.call(req)
    }
}

/// A parsed `WWW-Authenticate: Bearer` challenge.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Challenge {
    /// URL of the token service.
    pub realm: String,

    /// Service name to request a token for.
    pub service: Option<String>,

    /// Scope the registry asked for.
    pub scope: Option<String>,
}

impl Challenge {
    /// Parse the value of a `WWW-Authenticate` header.
    ///
    /// Returns `None` for non-Bearer schemes or when no realm is given.
    pub fn parse_bearer(header: &str) -> Option<Self> {
        let header = header.trim_start();
        let (scheme, params) = header.split_once(' ').unwrap_or((header, ""));
        if !scheme.eq_ignore_ascii_case("bearer") {
            return None;
        }

        let mut challenge = Challenge::default();
        for (key, value) in parse_params(params) {
            match key.to_ascii_lowercase().as_str() {
                "realm" => challenge.realm = value,
                "service" => challenge.service = Some(value),
                "scope" => challenge.scope = Some(value),
                _ => {}
            }
        }

        if challenge.realm.is_empty() {
            None
        } else {
            Some(challenge)
        }
    }
}

fn parse_params(input: &str) -> Vec<(String, String)> {
    let mut params = Vec::new();
    let mut chars = input.chars().peekable();

    loop {
        while matches!(chars.peek(), Some(c) if *c == ',' || c.is_whitespace()) {
            chars.next();
        }

        let key: String = std::iter::from_fn(|| chars.next_if(|c| *c != '=' && *c != ','))
            .collect();
        let key = key.trim().to_owned();
        if key.is_empty() {
            break;
        }

        if chars.next_if_eq(&'=').is_none() {
            continue;
        }

        let mut value = String::new();
        if chars.next_if_eq(&'"').is_some() {
            while let Some(c) = chars.next() {
                match c {
                    '\\' => value.extend(chars.next()),
                    '"' => break,
                    c => value.push(c),
                }
            }
        } else {
            value.extend(std::iter::from_fn(|| chars.next_if(|c| *c != ',')));
            value = value.trim().to_owned();
        }

        params.push((key, value));
    }

    params
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_docker_hub_challenge() {
        let challenge = Challenge::parse_bearer(
            r#"Bearer realm="https://auth.docker.io/token",service="registry.docker.io",scope="repository:library/left-pad:pull,push""#,
        )
        .unwrap();

        assert_eq!(challenge.realm, "https://auth.docker.io/token");
        assert_eq!(challenge.service.as_deref(), Some("registry.docker.io"));
        assert_eq!(
            challenge.scope.as_deref(),
            Some("repository:library/left-pad:pull,push")
        );
    }

    #[test]
    fn parse_unquoted_and_escaped_values() {
        let challenge =
            Challenge::parse_bearer(r#"bearer realm=http://localhost/token, service="a\"b""#)
                .unwrap();
        assert_eq!(challenge.realm, "http://localhost/token");
        assert_eq!(challenge.service.as_deref(), Some("a\"b"));
        assert_eq!(challenge.scope, None);
    }

    #[test]
    fn basic_challenges_are_not_bearer() {
        assert_eq!(Challenge::parse_bearer(r#"Basic realm="registry""#), None);
        assert_eq!(Challenge::parse_bearer("Bearer service=\"x\""), None);
    }

    #[test]
    fn existing_authorization_is_kept() {
        let auth = RegistryAuth::Bearer(Secret::from("token"));
        let req = http::Request::builder()
            .header(http::header::AUTHORIZATION, "Basic abc")
            .body(())
            .unwrap();

        let req = auth.authenticate(req);
        assert_eq!(req.headers()[http::header::AUTHORIZATION], "Basic abc");
    }

    #[test]
    fn anonymous_adds_nothing() {
        let req = RegistryAuth::Anonymous.authenticate(http::Request::new(()));
        assert!(!req.headers().contains_key(http::header::AUTHORIZATION));
    }
}
