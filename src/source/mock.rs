//! In-memory transaction source for tests

use crate::core::Transaction;
use crate::source::{ConfirmedHistory, SourceError, TransactionSource};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Debug, Default)]
struct MockState {
    history: HashMap<String, Vec<Transaction>>,
    pool: Vec<Transaction>,
    fail_history: bool,
    fail_pool_ids: bool,
    fail_bodies: bool,
    body_fetches: Vec<String>,
    history_calls: Vec<(String, usize)>,
    broadcasts: Vec<String>,
}

/// Scriptable [`TransactionSource`]
#[derive(Debug, Default)]
pub struct MockSource {
    state: Mutex<MockState>,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a mined transaction to the history of `address`
    pub fn push_confirmed(&self, address: &str, tx: Transaction) {
        self.state
            .lock()
            .history
            .entry(address.to_string())
            .or_default()
            .push(tx);
    }

    pub fn add_to_pool(&self, tx: Transaction) {
        self.state.lock().pool.push(tx);
    }

    pub fn fail_history(&self, fail: bool) {
        self.state.lock().fail_history = fail;
    }

    pub fn fail_pool_ids(&self, fail: bool) {
        self.state.lock().fail_pool_ids = fail;
    }

    pub fn fail_bodies(&self, fail: bool) {
        self.state.lock().fail_bodies = fail;
    }

    /// Txids whose bodies were requested, in request order
    pub fn body_fetches(&self) -> Vec<String> {
        self.state.lock().body_fetches.clone()
    }

    /// `(address, from)` of every history request
    pub fn history_calls(&self) -> Vec<(String, usize)> {
        self.state.lock().history_calls.clone()
    }

    pub fn broadcasts(&self) -> Vec<String> {
        self.state.lock().broadcasts.clone()
    }
}

fn unavailable(what: &str) -> SourceError {
    SourceError::Rpc {
        code: -28,
        message: format!("{} unavailable", what),
    }
}

#[async_trait]
impl TransactionSource for MockSource {
    async fn fetch_confirmed(
        &self,
        address: &str,
        from: usize,
    ) -> Result<ConfirmedHistory, SourceError> {
        // Give concurrent queries a chance to interleave
        tokio::task::yield_now().await;

        let mut state = self.state.lock();
        state.history_calls.push((address.to_string(), from));
        if state.fail_history {
            return Err(unavailable("history"));
        }

        let transactions = state
            .history
            .get(address)
            .map(|txs| txs.iter().skip(from).cloned().collect())
            .unwrap_or_default();
        Ok(ConfirmedHistory::new(transactions))
    }

    async fn fetch_unconfirmed_ids(&self) -> Result<Vec<String>, SourceError> {
        tokio::task::yield_now().await;

        let state = self.state.lock();
        if state.fail_pool_ids {
            return Err(unavailable("pool"));
        }
        Ok(state.pool.iter().map(|tx| tx.txid.clone()).collect())
    }

    async fn fetch_transaction(&self, txid: &str) -> Result<Transaction, SourceError> {
        tokio::task::yield_now().await;

        let mut state = self.state.lock();
        state.body_fetches.push(txid.to_string());
        if state.fail_bodies {
            return Err(unavailable("transaction"));
        }

        state
            .pool
            .iter()
            .chain(state.history.values().flatten())
            .find(|tx| tx.txid == txid)
            .cloned()
            .ok_or_else(|| SourceError::Rpc {
                code: -5,
                message: "No such mempool or blockchain transaction".to_string(),
            })
    }

    async fn broadcast(&self, raw_hex: &str) -> Result<String, SourceError> {
        let mut state = self.state.lock();
        state.broadcasts.push(raw_hex.to_string());
        Ok(format!("txid-{}", state.broadcasts.len()))
    }
}
