//! HTTP(S) server with graceful shutdown.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use axum::Router;
use camino::Utf8PathBuf;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto;
use hyper_util::service::TowerToHyperService;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::error::ServerError;

/// How long a client may take to send request headers.
pub const HEADER_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Certificate and key for serving HTTPS.
#[derive(Debug, Clone)]
pub struct TlsFiles {
    /// PEM certificate chain
    pub cert_file: Utf8PathBuf,

    /// PEM private key
    pub key_file: Utf8PathBuf,
}

/// Where and how to listen.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on, on all interfaces.
    pub port: u16,

    /// Serve HTTPS with these files instead of plain HTTP.
    pub tls: Option<TlsFiles>,
}

impl ServerConfig {
    /// Address to bind
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.port))
    }
}

/// Serve `router` until `shutdown` is cancelled, then drain open connections.
pub async fn serve(
    router: Router,
    config: ServerConfig,
    shutdown: CancellationToken,
) -> Result<(), ServerError> {
    let addr = config.addr();
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;

    serve_listener(listener, router, config.tls, shutdown).await
}

/// Serve on an already bound listener.
///
/// Plain and TLS connections share one accept loop, so both get the header
/// read timeout and are drained on shutdown.
pub async fn serve_listener(
    listener: TcpListener,
    router: Router,
    tls: Option<TlsFiles>,
    shutdown: CancellationToken,
) -> Result<(), ServerError> {
    let local = listener.local_addr()?;

    let acceptor = match tls {
        Some(files) => {
            let acceptor = crate::tls::acceptor(&files.cert_file, &files.key_file)?;
            tracing::info!("listening on https://{local}");
            Some(acceptor)
        }
        None => {
            tracing::info!("listening on http://{local}");
            None
        }
    };

    let tracker = TaskTracker::new();

    loop {
        let (stream, remote) = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(error) => {
                    tracing::warn!("failed to accept connection: {error}");
                    continue;
                }
            },
        };

        let acceptor = acceptor.clone();
        let router = router.clone();
        let shutdown = shutdown.clone();

        tracker.spawn(async move {
            match acceptor {
                Some(acceptor) => match acceptor.accept(stream).await {
                    Ok(stream) => serve_connection(stream, remote, router, shutdown).await,
                    Err(error) => tracing::debug!(%remote, "TLS handshake failed: {error}"),
                },
                None => serve_connection(stream, remote, router, shutdown).await,
            }
        });
    }

    tracing::info!("shutting down, draining {} connections", tracker.len());
    tracker.close();
    tracker.wait().await;

    tracing::info!("server stopped");
    Ok(())
}

async fn serve_connection<I>(
    stream: I,
    remote: SocketAddr,
    router: Router,
    shutdown: CancellationToken,
) where
    I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let mut builder = auto::Builder::new(TokioExecutor::new());
    builder
        .http1()
        .timer(TokioTimer::new())
        .header_read_timeout(HEADER_READ_TIMEOUT);

    let service = TowerToHyperService::new(router);
    let connection = builder.serve_connection_with_upgrades(TokioIo::new(stream), service);
    tokio::pin!(connection);

    let result = tokio::select! {
        result = connection.as_mut() => result,
        _ = shutdown.cancelled() => {
            connection.as_mut().graceful_shutdown();
            connection.await
        }
    };

    if let Err(error) = result {
        tracing::debug!(%remote, "connection error: {error}");
    }
}
