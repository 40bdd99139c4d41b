//! Retry policy for registry requests.

use std::time::Duration;

use http::{Method, StatusCode};
use hyperdriver::Body;
use tower::retry::Policy;

/// Retry policy for idempotent registry reads.
///
/// `GET` and `HEAD` requests are retried on transport errors and 5xx
/// responses, sleeping between attempts with exponential backoff. A `429`
/// waits for the `Retry-After` the registry asked for, when it gives one.
///
/// Used as a [`tower::retry::Policy`]; each request works on its own copy, so
/// the remaining attempts are per request.
#[derive(Debug, Clone)]
pub struct Backoff {
    /// Total number of attempts, including the first.
    pub attempts: usize,

    /// The initial delay for the backoff
    pub delay: Duration,

    /// The exponent to increase the delay by
    pub exponent: u32,

    /// The maximum delay for the backoff
    pub max_delay: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_millis(100),
            exponent: 2,
            max_delay: Duration::from_secs(2),
        }
    }
}

impl Backoff {
    /// A policy which never retries.
    pub fn none() -> Self {
        Self {
            attempts: 1,
            ..Default::default()
        }
    }

    /// Use up one attempt, returning how long to wait before making it.
    fn next_delay(&mut self) -> Option<Duration> {
        if self.attempts <= 1 {
            return None;
        }
        self.attempts -= 1;

        let delay = self.delay.min(self.max_delay);
        self.delay = self
            .delay
            .checked_mul(self.exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay);
        Some(delay)
    }
}

fn is_retryable_method(method: &Method) -> bool {
    method == Method::GET || method == Method::HEAD
}

fn retry_after(response: &http::Response<Body>) -> Option<Duration> {
    response
        .headers()
        .get(http::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

impl<E> Policy<http::Request<Body>, http::Response<Body>, E> for Backoff {
    type Future = tokio::time::Sleep;

    fn retry(
        &mut self,
        req: &mut http::Request<Body>,
        result: &mut Result<http::Response<Body>, E>,
    ) -> Option<Self::Future> {
        let delay = match result {
            Ok(res) if res.status() == StatusCode::TOO_MANY_REQUESTS => {
                let backoff = self.next_delay()?;
                tracing::debug!("retrying request to {} due to rate limit", req.uri());
                retry_after(res).unwrap_or(backoff)
            }
            Ok(res)
                if res.status().is_server_error()
                    || res.status() == StatusCode::REQUEST_TIMEOUT =>
            {
                let backoff = self.next_delay()?;
                tracing::debug!(
                    "retrying request to {} due to HTTP {}",
                    req.uri(),
                    res.status()
                );
                backoff
            }
            Ok(_) => return None,
            Err(_) => {
                let backoff = self.next_delay()?;
                tracing::warn!("retrying request to {} due to error", req.uri());
                backoff
            }
        };

        Some(tokio::time::sleep(delay))
    }

    fn clone_request(&mut self, req: &http::Request<Body>) -> Option<http::Request<Body>> {
        if !is_retryable_method(req.method()) {
            return None;
        }

        let mut next = http::Request::new(req.body().try_clone()?);
        *next.method_mut() = req.method().clone();
        *next.uri_mut() = req.uri().clone();
        *next.version_mut() = req.version();
        *next.headers_mut() = req.headers().clone();
        *next.extensions_mut() = req.extensions().clone();
        Some(next)
    }
}
