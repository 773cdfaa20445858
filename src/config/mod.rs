//! Gateway configuration
//!
//! Plain structs with defaults; the binary fills them from the command line.

use crate::ledger::{DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_LEDGERS};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

// =============================================================================
// Constants
// =============================================================================

/// TLS front of the node RPC
pub const NODE_PORT_FRONT: u16 = 18333;
/// Plain-HTTP node RPC behind the gateway
pub const NODE_PORT_BACK: u16 = 18332;
/// TLS front of the ledger-layer service
pub const LEDGER_PORT_FRONT: u16 = 14001;
/// Plain-HTTP ledger-layer service behind the gateway
pub const LEDGER_PORT_BACK: u16 = 14000;

/// Certificate chain file inside the certificate directory
pub const CERT_FILE: &str = "cert.pem";
/// Private key file inside the certificate directory
pub const KEY_FILE: &str = "private.pem";

pub const DEFAULT_FETCH_CONCURRENCY: usize = 16;
pub const DEFAULT_PAGE_SIZE: usize = 100;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

// =============================================================================
// Config Types
// =============================================================================

/// A TLS front and the backend it forwards to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyTarget {
    pub front_port: u16,
    pub back_port: u16,
    pub back_host: String,
}

impl ProxyTarget {
    pub fn new(front_port: u16, back_port: u16) -> Self {
        Self {
            front_port,
            back_port,
            back_host: "127.0.0.1".to_string(),
        }
    }

    /// Base URL of the backend, without a trailing slash
    pub fn backend_url(&self) -> String {
        format!("http://{}:{}", self.back_host, self.back_port)
    }
}

/// Credentials and limits for the gateway's own node RPC calls
#[derive(Debug, Clone)]
pub struct RpcConfig {
    pub user: Option<String>,
    pub password: Option<String>,
    /// Transactions requested per history page
    pub page_size: usize,
    pub request_timeout: Duration,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            user: None,
            password: None,
            page_size: DEFAULT_PAGE_SIZE,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

/// Limits of the UTXO index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexConfig {
    /// Parallel transaction body fetches per query
    pub fetch_concurrency: usize,
    /// Addresses tracked before the least recently queried is dropped
    pub max_ledgers: usize,
    /// Merges a transaction may stay unresolved before it is abandoned
    pub max_attempts: u32,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            fetch_concurrency: DEFAULT_FETCH_CONCURRENCY,
            max_ledgers: DEFAULT_MAX_LEDGERS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// Everything the gateway needs to start
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Directory holding `cert.pem` and `private.pem`
    pub cert_dir: PathBuf,
    pub bind: IpAddr,
    /// Node RPC, with the UTXO index in front of it
    pub node: ProxyTarget,
    /// Ledger-layer service, forwarded as is
    pub ledger: ProxyTarget,
    pub rpc: RpcConfig,
    pub index: IndexConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            cert_dir: PathBuf::from("."),
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            node: ProxyTarget::new(NODE_PORT_FRONT, NODE_PORT_BACK),
            ledger: ProxyTarget::new(LEDGER_PORT_FRONT, LEDGER_PORT_BACK),
            rpc: RpcConfig::default(),
            index: IndexConfig::default(),
        }
    }
}

impl GatewayConfig {
    pub fn cert_path(&self) -> PathBuf {
        self.cert_dir.join(CERT_FILE)
    }

    pub fn key_path(&self) -> PathBuf {
        self.cert_dir.join(KEY_FILE)
    }

    pub fn node_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.node.front_port)
    }

    pub fn ledger_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.ledger.front_port)
    }
}
