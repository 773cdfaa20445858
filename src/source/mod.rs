//! Upstream transaction sources
//!
//! The index never talks to a node directly; it goes through
//! [`TransactionSource`], which the bitcoind client implements.

pub mod bitcoind;
#[cfg(test)]
pub mod mock;

pub use bitcoind::{BitcoindSource, RawTransaction};

use crate::core::Transaction;
use async_trait::async_trait;
use thiserror::Error;

/// Errors returned by a transaction source
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("Upstream returned HTTP {0}")]
    Status(reqwest::StatusCode),
    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Empty result for {0}")]
    MissingResult(String),
}

impl SourceError {
    /// Error code reported by the node, if any
    pub fn rpc_code(&self) -> Option<i64> {
        match self {
            SourceError::Rpc { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Confirmed history of an address starting at some cursor
#[derive(Debug, Clone, Default)]
pub struct ConfirmedHistory {
    /// Confirmed transactions in history order
    pub transactions: Vec<Transaction>,
    /// Number of history entries covered
    pub consumed: usize,
}

impl ConfirmedHistory {
    pub fn new(transactions: Vec<Transaction>) -> Self {
        Self {
            consumed: transactions.len(),
            transactions,
        }
    }
}

/// Read and broadcast access to the chain
///
/// Re-fetching the same `from` for an unchanged address must return the same
/// transactions in the same order, possibly followed by new ones.
#[async_trait]
pub trait TransactionSource: Send + Sync {
    /// Confirmed transactions touching `address`, skipping the first `from`
    async fn fetch_confirmed(
        &self,
        address: &str,
        from: usize,
    ) -> Result<ConfirmedHistory, SourceError>;

    /// Identifiers of every transaction in the pool
    async fn fetch_unconfirmed_ids(&self) -> Result<Vec<String>, SourceError>;

    /// Full body of a transaction
    async fn fetch_transaction(&self, txid: &str) -> Result<Transaction, SourceError>;

    /// Relay a signed transaction, returning its id
    async fn broadcast(&self, raw_hex: &str) -> Result<String, SourceError>;
}
