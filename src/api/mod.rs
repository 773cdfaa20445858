//! HTTP surface of the gateway
//!
//! # Node front
//! - `GET /health` - Liveness
//! - `GET /api/address/{address}/utxos` - Unspent outputs
//! - `GET /api/address/{address}/balance` - Confirmed and total balance
//! - `POST /api/tx` - Relay a signed transaction
//! - `POST /` - JSON-RPC; `listunspent` with addresses, `getaddressbalance`
//!   and `sendrawtransaction` are answered from the index
//! - anything else - proxied to the node
//!
//! # Ledger-layer front
//! - every request proxied to the backend

pub mod handlers;
pub mod proxy;
pub mod routes;
pub mod rpc;

pub use handlers::ApiState;
pub use proxy::ReverseProxy;
pub use routes::{create_node_router, create_proxy_router};
