//! TLS termination
//!
//! Two HTTPS fronts (HTTP/2 and HTTP/1.1 via ALPN) sharing one certificate
//! read from the certificate directory.

pub mod server;
pub mod tls;

pub use server::{run, ServerError, SHUTDOWN_GRACE};
pub use tls::{install_crypto_provider, read_certificates, rustls_config, Certificates, TlsError};
