//! HTTP transport for talking to remote registries.

use std::time::Duration;

use hyperdriver::client::SharedClientService;
use hyperdriver::service::SharedService;
use hyperdriver::Body;

use crate::retry::Backoff;

/// Default timeout for a single registry request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// HTTP transport shared by every repository handle.
///
/// Cloning is cheap; clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: SharedClientService<Body, Body>,
    backoff: Backoff,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl HttpClient {
    /// Create a client over TCP, with TLS available for `https` registries.
    pub fn new(timeout: Duration) -> Self {
        let inner = hyperdriver::Client::build_tcp_http()
            .with_default_tls()
            .with_timeout(timeout)
            .with_user_agent(USER_AGENT.to_owned())
            .build_service();

        HttpClient {
            inner,
            backoff: Backoff::default(),
        }
    }

    /// Wrap an arbitrary service, e.g. an in-process mock registry.
    pub fn with_service<S>(service: S) -> Self
    where
        S: tower::Service<
                http::Request<Body>,
                Response = http::Response<Body>,
                Error = hyperdriver::client::Error,
            > + Clone
            + Send
            + Sync
            + 'static,
        S::Future: Send + 'static,
    {
        HttpClient {
            inner: SharedService::new(service),
            backoff: Backoff::default(),
        }
    }

    /// Replace the retry policy for reads.
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// The underlying service.
    pub fn inner(&self) -> &SharedClientService<Body, Body> {
        &self.inner
    }

    /// The retry policy for reads.
    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }
}
