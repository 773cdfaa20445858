//! UTXO Gateway: a TLS front for a blockchain node with an address index
//!
//! This crate provides:
//! - Incremental per-address UTXO ledgers, merged order-independently
//! - A bounded registry of ledgers with least-recently-queried eviction
//! - A bitcoind JSON-RPC transaction source
//! - TLS termination and reverse proxying for the node and a ledger-layer
//!   service, with address queries answered from the index
//!
//! # Example
//!
//! ```rust
//! use utxo_gateway::core::{Transaction, TxInput, TxOutput};
//! use utxo_gateway::ledger::{Batch, UtxoLedger};
//!
//! let mut ledger = UtxoLedger::new("addrA");
//! let tx = Transaction {
//!     txid: "tx1".to_string(),
//!     inputs: vec![TxInput::coinbase()],
//!     outputs: vec![TxOutput {
//!         index: 0,
//!         addresses: vec!["addrA".to_string()],
//!         script_pub_key: "51".to_string(),
//!         value: 1000,
//!     }],
//!     confirmations: 1,
//! };
//!
//! ledger.apply(Batch::new(vec![tx], vec![]));
//! assert_eq!(ledger.confirmed_balance(), 1000);
//! assert_eq!(ledger.cursor(), 1);
//! ```

pub mod api;
pub mod config;
pub mod core;
pub mod indexer;
pub mod ledger;
pub mod network;
pub mod source;

// Re-export commonly used types
pub use api::{create_node_router, create_proxy_router, ApiState, ReverseProxy};
pub use config::{GatewayConfig, IndexConfig, ProxyTarget, RpcConfig};
pub use core::{OutPoint, Transaction, TxInput, TxOutput, UnspentOutput};
pub use indexer::{AddressIndexer, Balance, IndexerError};
pub use ledger::{Batch, LedgerRegistry, MergeStats, UtxoLedger};
pub use source::{BitcoindSource, SourceError, TransactionSource};
