//! Incremental address indexer
//!
//! Every query syncs the address's ledger before answering: the confirmed
//! history past the ledger cursor and the current pool are fetched in
//! parallel, then folded into the ledger in one merge. Nothing is indexed in
//! the background.

use crate::config::IndexConfig;
use crate::core::{Transaction, UnspentOutput};
use crate::ledger::{Batch, LedgerRegistry, UtxoLedger};
use crate::source::{SourceError, TransactionSource};
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::OwnedMutexGuard;

/// Indexer errors
#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("Upstream error: {0}")]
    Upstream(#[from] SourceError),
    #[error("Malformed input: {0}")]
    MalformedInput(String),
}

/// Balance of an address in subunits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Balance {
    /// Outputs with at least one confirmation
    pub confirmed: u64,
    /// All outputs, pool included
    pub total: u64,
}

impl Balance {
    fn of(ledger: &UtxoLedger) -> Self {
        Self {
            confirmed: ledger.confirmed_balance(),
            total: ledger.total_balance(),
        }
    }
}

/// Check that a broadcast payload is a non-empty hex string
pub fn validate_raw_transaction(raw_hex: &str) -> Result<(), IndexerError> {
    if raw_hex.is_empty() {
        return Err(IndexerError::MalformedInput(
            "empty transaction payload".to_string(),
        ));
    }
    hex::decode(raw_hex)
        .map(|_| ())
        .map_err(|e| IndexerError::MalformedInput(format!("transaction is not hex: {}", e)))
}

/// Query surface over per-address ledgers
pub struct AddressIndexer<S: ?Sized> {
    source: Arc<S>,
    registry: LedgerRegistry,
    fetch_concurrency: usize,
}

impl<S: TransactionSource + ?Sized> AddressIndexer<S> {
    pub fn new(source: Arc<S>, config: &IndexConfig) -> Self {
        Self {
            source,
            registry: LedgerRegistry::with_limits(config.max_ledgers, config.max_attempts),
            fetch_concurrency: config.fetch_concurrency.max(1),
        }
    }

    pub fn source(&self) -> &Arc<S> {
        &self.source
    }

    pub fn registry(&self) -> &LedgerRegistry {
        &self.registry
    }

    /// Bring the ledger of `address` up to date and keep it locked
    ///
    /// The lock is held from the cursor read to the merge, so concurrent
    /// queries for one address run one after the other. On a fetch error the
    /// ledger is left untouched.
    pub async fn sync(&self, address: &str) -> Result<OwnedMutexGuard<UtxoLedger>, IndexerError> {
        let mut ledger = self.registry.ledger(address).lock_owned().await;

        let batch = match self.fetch_batch(&ledger).await {
            Ok(batch) => batch,
            Err(e) => {
                log::debug!("Sync of {} aborted: {}", address, e);
                return Err(e.into());
            }
        };

        log::debug!("Merging {} transactions for {}", batch.len(), address);
        ledger.apply(batch);
        Ok(ledger)
    }

    async fn fetch_batch(&self, ledger: &UtxoLedger) -> Result<Batch, SourceError> {
        let (history, pool) = tokio::try_join!(
            self.source.fetch_confirmed(ledger.address(), ledger.cursor()),
            self.fetch_pool(ledger),
        )?;

        Ok(Batch {
            confirmed: history.transactions,
            consumed: history.consumed,
            unconfirmed: pool,
        })
    }

    /// Pool transactions the ledger has not settled yet
    async fn fetch_pool(&self, ledger: &UtxoLedger) -> Result<Vec<Transaction>, SourceError> {
        let ids: Vec<String> = self
            .source
            .fetch_unconfirmed_ids()
            .await?
            .into_iter()
            .filter(|txid| !ledger.is_settled(txid))
            .collect();

        stream::iter(ids)
            .map(|txid| async move { self.source.fetch_transaction(&txid).await })
            .buffer_unordered(self.fetch_concurrency)
            .try_collect()
            .await
    }

    /// Unspent outputs of `address` in discovery order
    pub async fn list_unspent(&self, address: &str) -> Result<Vec<UnspentOutput>, IndexerError> {
        Ok(self.sync(address).await?.utxos().to_vec())
    }

    /// Sum of confirmed outputs of `address`, in subunits
    pub async fn confirmed_balance(&self, address: &str) -> Result<u64, IndexerError> {
        Ok(self.sync(address).await?.confirmed_balance())
    }

    /// Sum of all outputs of `address`, in subunits
    pub async fn total_balance(&self, address: &str) -> Result<u64, IndexerError> {
        Ok(self.sync(address).await?.total_balance())
    }

    /// Confirmed and total balance from a single sync
    pub async fn balance(&self, address: &str) -> Result<Balance, IndexerError> {
        Ok(Balance::of(&*self.sync(address).await?))
    }

    /// Relay a signed transaction. The ledgers pick it up from the pool on
    /// their next query.
    pub async fn submit(&self, raw_hex: &str) -> Result<String, IndexerError> {
        validate_raw_transaction(raw_hex)?;
        let txid = self.source.broadcast(raw_hex).await?;
        log::info!("Broadcast transaction {}", txid);
        Ok(txid)
    }
}

// =============================================================================
// Tests
// =============================================================================
