//! UTXO Gateway
//!
//! Terminates TLS for a local node and a ledger-layer service, answering
//! address queries from an incremental UTXO index.

use clap::Parser;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use utxo_gateway::config::{
    GatewayConfig, IndexConfig, ProxyTarget, RpcConfig, DEFAULT_FETCH_CONCURRENCY,
    DEFAULT_PAGE_SIZE, DEFAULT_REQUEST_TIMEOUT_SECS, LEDGER_PORT_BACK, LEDGER_PORT_FRONT,
    NODE_PORT_BACK, NODE_PORT_FRONT,
};
use utxo_gateway::ledger::{DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_LEDGERS};
use utxo_gateway::source::TransactionSource;
use utxo_gateway::{
    create_node_router, create_proxy_router, network, AddressIndexer, ApiState, BitcoindSource,
    ReverseProxy,
};

#[derive(Parser)]
#[command(name = "utxo-gateway")]
#[command(author = "Darshan")]
#[command(version = "0.1.0")]
#[command(about = "TLS gateway for a blockchain node with a per-address UTXO index", long_about = None)]
struct Cli {
    /// Directory containing cert.pem and private.pem
    cert_dir: PathBuf,

    /// Address the TLS fronts bind to
    #[arg(long, default_value = "0.0.0.0")]
    bind: IpAddr,

    /// TLS port of the node front
    #[arg(long, default_value_t = NODE_PORT_FRONT)]
    node_port: u16,

    /// Plain-HTTP port of the node RPC
    #[arg(long, default_value_t = NODE_PORT_BACK)]
    node_backend_port: u16,

    /// TLS port of the ledger-layer front
    #[arg(long, default_value_t = LEDGER_PORT_FRONT)]
    ledger_port: u16,

    /// Plain-HTTP port of the ledger-layer service
    #[arg(long, default_value_t = LEDGER_PORT_BACK)]
    ledger_backend_port: u16,

    /// Node RPC user for the gateway's own calls
    #[arg(long, env = "RPC_USER")]
    rpc_user: Option<String>,

    /// Node RPC password for the gateway's own calls
    #[arg(long, env = "RPC_PASSWORD", hide_env_values = true)]
    rpc_password: Option<String>,

    /// Parallel transaction fetches per query
    #[arg(long, default_value_t = DEFAULT_FETCH_CONCURRENCY)]
    fetch_concurrency: usize,

    /// Addresses tracked before the least recently queried is dropped
    #[arg(long, default_value_t = DEFAULT_MAX_LEDGERS)]
    max_ledgers: usize,

    /// Merges an unresolved transaction is retried before it is abandoned
    #[arg(long, default_value_t = DEFAULT_MAX_ATTEMPTS)]
    max_attempts: u32,

    /// Transactions per history page
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    page_size: usize,

    /// Upstream request timeout in seconds
    #[arg(long, default_value_t = DEFAULT_REQUEST_TIMEOUT_SECS)]
    request_timeout: u64,
}

impl From<Cli> for GatewayConfig {
    fn from(cli: Cli) -> Self {
        Self {
            cert_dir: cli.cert_dir,
            bind: cli.bind,
            node: ProxyTarget::new(cli.node_port, cli.node_backend_port),
            ledger: ProxyTarget::new(cli.ledger_port, cli.ledger_backend_port),
            rpc: RpcConfig {
                user: cli.rpc_user,
                password: cli.rpc_password,
                page_size: cli.page_size,
                request_timeout: Duration::from_secs(cli.request_timeout),
            },
            index: IndexConfig {
                fetch_concurrency: cli.fetch_concurrency,
                max_ledgers: cli.max_ledgers,
                max_attempts: cli.max_attempts,
            },
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = GatewayConfig::from(Cli::parse());

    let rt = tokio::runtime::Runtime::new()?;

    rt.block_on(async {
        let source: Arc<dyn TransactionSource> =
            Arc::new(BitcoindSource::new(config.node.backend_url(), &config.rpc)?);
        let indexer = Arc::new(AddressIndexer::new(source, &config.index));

        let state = ApiState {
            indexer,
            node_proxy: ReverseProxy::new(config.node.backend_url(), config.rpc.request_timeout)?,
        };
        let ledger_proxy =
            ReverseProxy::new(config.ledger.backend_url(), config.rpc.request_timeout)?;

        println!(
            "🔐 Node front https://{} -> {}",
            config.node_addr(),
            config.node.backend_url()
        );
        println!(
            "🔐 Ledger front https://{} -> {}",
            config.ledger_addr(),
            config.ledger.backend_url()
        );

        if let Err(e) = network::run(
            &config,
            create_node_router(state),
            create_proxy_router(ledger_proxy),
        )
        .await
        {
            log::warn!("{}", e);
            return Err(e.into());
        }

        Ok::<(), Box<dyn std::error::Error>>(())
    })?;

    Ok(())
}
