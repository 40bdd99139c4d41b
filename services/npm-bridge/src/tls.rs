//! TLS termination for the registry server.

use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

use camino::Utf8Path;
use rustls::ServerConfig;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::TlsAcceptor;

use crate::error::ServerError;

/// Load certificates from a PEM file
pub fn load_certs(path: &Utf8Path) -> Result<Vec<CertificateDer<'static>>, ServerError> {
    let file = File::open(path).map_err(|error| {
        ServerError::Tls(format!("failed to open certificate file {path}: {error}"))
    })?;

    let certs = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|error| {
            ServerError::Tls(format!("failed to parse certificates from {path}: {error}"))
        })?;

    if certs.is_empty() {
        return Err(ServerError::Tls(format!("no certificates found in {path}")));
    }

    tracing::debug!(count = certs.len(), %path, "loaded certificates");
    Ok(certs)
}

/// Load the first private key from a PEM file
pub fn load_private_key(path: &Utf8Path) -> Result<PrivateKeyDer<'static>, ServerError> {
    let file = File::open(path).map_err(|error| {
        ServerError::Tls(format!("failed to open private key file {path}: {error}"))
    })?;

    rustls_pemfile::private_key(&mut BufReader::new(file))
        .map_err(|error| {
            ServerError::Tls(format!("failed to parse private key from {path}: {error}"))
        })?
        .ok_or_else(|| ServerError::Tls(format!("no private key found in {path}")))
}

/// Create a TLS acceptor from a certificate chain and key in PEM files.
pub fn acceptor(cert_file: &Utf8Path, key_file: &Utf8Path) -> Result<TlsAcceptor, ServerError> {
    let certs = load_certs(cert_file)?;
    let key = load_private_key(key_file)?;

    let mut config =
        ServerConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
            .with_safe_default_protocol_versions()
            .map_err(|error| ServerError::Tls(error.to_string()))?
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(|error| ServerError::Tls(format!("invalid certificate or key: {error}")))?;
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    tracing::info!(cert_file = %cert_file, "TLS enabled");
    Ok(TlsAcceptor::from(Arc::new(config)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_files_are_tls_errors() {
        let err = acceptor(
            Utf8Path::new("does/not/exist.pem"),
            Utf8Path::new("does/not/exist-key.pem"),
        )
        .err().unwrap();
        assert!(matches!(err, ServerError::Tls(message) if message.contains("does/not/exist.pem")));
    }
}
