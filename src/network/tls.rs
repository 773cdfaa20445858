//! Certificate loading for the TLS fronts

use axum_server::tls_rustls::RustlsConfig;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TlsError {
    #[error("Cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Invalid certificate or key: {0}")]
    Config(io::Error),
}

/// PEM-encoded certificate chain and private key
#[derive(Debug, Clone)]
pub struct Certificates {
    pub cert: Vec<u8>,
    pub key: Vec<u8>,
}

async fn read_file(path: &Path) -> Result<Vec<u8>, TlsError> {
    tokio::fs::read(path).await.map_err(|source| TlsError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Read both files concurrently
pub async fn read_certificates(cert_path: &Path, key_path: &Path) -> Result<Certificates, TlsError> {
    let (cert, key) = tokio::try_join!(read_file(cert_path), read_file(key_path))?;
    Ok(Certificates { cert, key })
}

/// Select ring as the process-wide rustls provider. Later calls are no-ops.
pub fn install_crypto_provider() {
    let _ = rustls::crypto::ring::default_provider().install_default();
}

/// Server config shared by both fronts, offering h2 and http/1.1
pub async fn rustls_config(certs: Certificates) -> Result<RustlsConfig, TlsError> {
    install_crypto_provider();
    RustlsConfig::from_pem(certs.cert, certs.key)
        .await
        .map_err(TlsError::Config)
}
