//! In-memory UTXO index
//!
//! One [`UtxoLedger`] per address, owned by the [`LedgerRegistry`].

pub mod registry;
pub mod utxo_ledger;

pub use registry::{LedgerRegistry, SharedLedger, DEFAULT_MAX_LEDGERS};
pub use utxo_ledger::{Batch, MergeStats, UtxoLedger, DEFAULT_MAX_ATTEMPTS};
