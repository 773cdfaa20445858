//! Transaction and unspent-output types shared by the index and its sources
//!
//! Transactions are kept in a chain-agnostic shape: inputs only carry the
//! output they spend, outputs carry their destination addresses and value in
//! subunits. Unspent outputs serialize with the field names of a node's
//! `listunspent` RPC so they can be handed to wallets unchanged.

use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Constants
// =============================================================================

/// Number of subunits in one coin
pub const COIN: u64 = 100_000_000;

/// Convert a base-unit amount (as reported by the node) to subunits
pub fn to_subunits(amount: f64) -> u64 {
    if amount <= 0.0 {
        return 0;
    }
    (amount * COIN as f64).round() as u64
}

/// Convert subunits to a base-unit amount
pub fn to_base_units(subunits: u64) -> f64 {
    subunits as f64 / COIN as f64
}

// =============================================================================
// OutPoint
// =============================================================================

/// Reference to a single output of a transaction
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutPoint {
    pub txid: String,
    pub vout: u32,
}

impl OutPoint {
    pub fn new(txid: impl Into<String>, vout: u32) -> Self {
        Self {
            txid: txid.into(),
            vout,
        }
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.txid, self.vout)
    }
}

// =============================================================================
// Transaction
// =============================================================================

/// Transaction input. Coinbase inputs reference nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxInput {
    pub spent_txid: Option<String>,
    pub spent_output_index: Option<u32>,
}

impl TxInput {
    /// Input spending `txid:vout`
    pub fn spending(txid: impl Into<String>, vout: u32) -> Self {
        Self {
            spent_txid: Some(txid.into()),
            spent_output_index: Some(vout),
        }
    }

    /// Input that creates new coins
    pub fn coinbase() -> Self {
        Self {
            spent_txid: None,
            spent_output_index: None,
        }
    }

    /// The output this input spends, if it references one
    pub fn outpoint(&self) -> Option<OutPoint> {
        match (&self.spent_txid, self.spent_output_index) {
            (Some(txid), Some(vout)) => Some(OutPoint::new(txid.clone(), vout)),
            _ => None,
        }
    }
}

/// Transaction output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxOutput {
    /// Position of the output within its transaction
    pub index: u32,
    /// Addresses the locking script resolves to
    pub addresses: Vec<String>,
    /// Locking script, hex encoded
    pub script_pub_key: String,
    /// Value in subunits
    pub value: u64,
}

impl TxOutput {
    /// Check if this output pays the given address
    pub fn is_owned_by(&self, address: &str) -> bool {
        self.addresses.iter().any(|a| a == address)
    }
}

/// A transaction as delivered by a [`TransactionSource`](crate::source::TransactionSource)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub txid: String,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    /// Number of confirmations, 0 while the transaction sits in the pool
    #[serde(default)]
    pub confirmations: u64,
}

impl Transaction {
    pub fn is_confirmed(&self) -> bool {
        self.confirmations > 0
    }

    /// Outputs spent by this transaction
    pub fn spent_outpoints(&self) -> impl Iterator<Item = OutPoint> + '_ {
        self.inputs.iter().filter_map(TxInput::outpoint)
    }
}

// =============================================================================
// Unspent Output
// =============================================================================

/// A spendable output owned by a tracked address
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnspentOutput {
    pub txid: String,
    pub vout: u32,
    pub address: String,
    #[serde(rename = "scriptPubKey")]
    pub script_pub_key: String,
    /// Value in coins
    pub amount: f64,
    /// Value in subunits
    pub satoshis: u64,
    pub confirmations: u64,
    pub spendable: bool,
    pub solvable: bool,
}

impl UnspentOutput {
    /// Build the unspent entry for `output` of `tx` paid to `address`
    pub fn from_output(tx: &Transaction, output: &TxOutput, address: &str) -> Self {
        Self {
            txid: tx.txid.clone(),
            vout: output.index,
            address: address.to_string(),
            script_pub_key: output.script_pub_key.clone(),
            amount: to_base_units(output.value),
            satoshis: output.value,
            confirmations: tx.confirmations,
            spendable: true,
            solvable: true,
        }
    }

    pub fn outpoint(&self) -> OutPoint {
        OutPoint::new(self.txid.clone(), self.vout)
    }

    pub fn matches(&self, outpoint: &OutPoint) -> bool {
        self.vout == outpoint.vout && self.txid == outpoint.txid
    }

    pub fn is_confirmed(&self) -> bool {
        self.confirmations > 0
    }
}

// =============================================================================
// Tests
// =============================================================================
