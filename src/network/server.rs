//! TLS fronts
//!
//! Both fronts share one certificate. `listening` is printed once both are
//! bound; Ctrl-C drains them gracefully.

use crate::config::GatewayConfig;
use crate::network::tls::{read_certificates, rustls_config, TlsError};
use axum::Router;
use axum_server::{tls_rustls::RustlsConfig, Handle};
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;

/// Time given to open connections on shutdown
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("TLS error: {0}")]
    Tls(#[from] TlsError),
    #[error("{front} front failed: {source}")]
    Serve {
        front: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("Server task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// One running front
struct Front {
    name: &'static str,
    handle: Handle,
    task: JoinHandle<io::Result<()>>,
}

impl Front {
    fn spawn(name: &'static str, addr: SocketAddr, tls: RustlsConfig, router: Router) -> Self {
        let handle = Handle::new();
        let server = axum_server::bind_rustls(addr, tls)
            .handle(handle.clone())
            .serve(router.into_make_service());

        Self {
            name,
            handle,
            task: tokio::spawn(server),
        }
    }

    async fn listening(&self) -> Option<SocketAddr> {
        let addr = self.handle.listening().await;
        match addr {
            Some(addr) => log::info!("{} front listening on {}", self.name, addr),
            None => log::warn!("{} front failed to bind", self.name),
        }
        addr
    }

    async fn finish(self) -> Result<(), ServerError> {
        let name = self.name;
        self.task
            .await?
            .map_err(|source| ServerError::Serve { front: name, source })
    }
}

/// Serve the node and ledger-layer fronts until shutdown
pub async fn run(
    config: &GatewayConfig,
    node_router: Router,
    ledger_router: Router,
) -> Result<(), ServerError> {
    let certs = read_certificates(&config.cert_path(), &config.key_path()).await?;
    let tls = rustls_config(certs).await?;

    let node = Front::spawn("node", config.node_addr(), tls.clone(), node_router);
    let ledger = Front::spawn("ledger", config.ledger_addr(), tls, ledger_router);

    let (node_addr, ledger_addr) = tokio::join!(node.listening(), ledger.listening());
    if node_addr.is_some() && ledger_addr.is_some() {
        println!("listening");
    }

    let handles = [node.handle.clone(), ledger.handle.clone()];
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("Shutting down");
            for handle in handles {
                handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
            }
        }
    });

    tokio::try_join!(node.finish(), ledger.finish())?;
    Ok(())
}
