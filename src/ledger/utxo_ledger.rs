//! Per-address UTXO ledger
//!
//! Folds batches of confirmed and pool transactions into the set of outputs
//! an address can currently spend:
//! - Idempotent merges (every incorporated txid is remembered)
//! - Fixpoint dependency resolution inside a batch
//! - Resumable scanning through a confirmed-history cursor
//! - Bounded retries for transactions that never resolve

use crate::core::{OutPoint, Transaction, UnspentOutput};
use std::collections::{HashMap, HashSet};

// =============================================================================
// Constants
// =============================================================================

/// Default number of merges a transaction may stay unresolved before it is abandoned
pub const DEFAULT_MAX_ATTEMPTS: u32 = 64;

// =============================================================================
// Batch
// =============================================================================

/// Transactions fetched for a single query
#[derive(Debug, Clone, Default)]
pub struct Batch {
    /// Confirmed transactions in history order, starting at the ledger cursor
    pub confirmed: Vec<Transaction>,
    /// Number of history entries the confirmed part covers
    pub consumed: usize,
    /// The whole pool, in no particular order
    pub unconfirmed: Vec<Transaction>,
}

impl Batch {
    pub fn new(confirmed: Vec<Transaction>, unconfirmed: Vec<Transaction>) -> Self {
        Self {
            consumed: confirmed.len(),
            confirmed,
            unconfirmed,
        }
    }

    /// Batch made only of pool transactions
    pub fn unconfirmed(unconfirmed: Vec<Transaction>) -> Self {
        Self::new(Vec::new(), unconfirmed)
    }

    pub fn with_consumed(mut self, consumed: usize) -> Self {
        self.consumed = consumed;
        self
    }

    pub fn len(&self) -> usize {
        self.confirmed.len() + self.unconfirmed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// =============================================================================
// Merge Statistics
// =============================================================================

/// Outcome of the last merge
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Transactions applied
    pub applied: usize,
    /// Already seen transactions whose confirmation count was raised
    pub refreshed: usize,
    /// Transactions left unresolved by this merge
    pub unresolved: usize,
    /// Transactions given up on during this merge
    pub abandoned: usize,
    /// Fixpoint passes run
    pub passes: usize,
}

// =============================================================================
// UTXO Ledger
// =============================================================================

/// Incrementally maintained unspent-output set of one address
#[derive(Debug)]
pub struct UtxoLedger {
    address: String,
    /// History entries already folded in
    cursor: usize,
    /// Unspent outputs in discovery order
    utxos: Vec<UnspentOutput>,
    /// Outpoints currently in `utxos`
    live: HashSet<OutPoint>,
    /// Every outpoint ever paid to the address, spent or not
    credited: HashSet<OutPoint>,
    /// Every outpoint referenced by an applied input
    spent: HashSet<OutPoint>,
    /// Incorporated txids
    seen: HashSet<String>,
    /// Confirmed transactions waiting for a later batch
    deferred: Vec<Transaction>,
    /// Unsuccessful merge attempts per txid
    attempts: HashMap<String, u32>,
    abandoned: HashSet<String>,
    max_attempts: u32,
    last_merge: MergeStats,
}

impl UtxoLedger {
    pub fn new(address: impl Into<String>) -> Self {
        Self::with_max_attempts(address, DEFAULT_MAX_ATTEMPTS)
    }

    pub fn with_max_attempts(address: impl Into<String>, max_attempts: u32) -> Self {
        Self {
            address: address.into(),
            cursor: 0,
            utxos: Vec::new(),
            live: HashSet::new(),
            credited: HashSet::new(),
            spent: HashSet::new(),
            seen: HashSet::new(),
            deferred: Vec::new(),
            attempts: HashMap::new(),
            abandoned: HashSet::new(),
            max_attempts: max_attempts.max(1),
            last_merge: MergeStats::default(),
        }
    }

    /// Fold a batch into the ledger and return the resulting unspent outputs
    ///
    /// Transactions that cannot be resolved are not an error: confirmed ones
    /// are carried into the next merge, pool ones are expected to be fetched
    /// again. The cursor advances by `batch.consumed` no matter what.
    pub fn apply(&mut self, batch: Batch) -> &[UnspentOutput] {
        let Batch {
            confirmed,
            consumed,
            unconfirmed,
        } = batch;
        let mut stats = MergeStats::default();

        // Txids of this batch that still wait to be applied
        let mut pending_ids: HashSet<String> = HashSet::new();
        let mut pending: Vec<Transaction> = Vec::new();

        let carried = std::mem::take(&mut self.deferred);
        for tx in carried.into_iter().chain(confirmed).chain(unconfirmed) {
            if self.seen.contains(&tx.txid) {
                if self.refresh_confirmations(&tx) {
                    stats.refreshed += 1;
                }
                continue;
            }
            if self.abandoned.contains(&tx.txid) || !pending_ids.insert(tx.txid.clone()) {
                continue;
            }
            pending.push(tx);
        }

        while !pending.is_empty() {
            stats.passes += 1;
            let before = pending.len();
            let mut rejected = Vec::with_capacity(before);

            for tx in pending {
                if self.is_eligible(&tx, &pending_ids) {
                    pending_ids.remove(&tx.txid);
                    self.apply_transaction(&tx);
                    stats.applied += 1;
                } else {
                    rejected.push(tx);
                }
            }

            let progressed = rejected.len() < before;
            pending = rejected;
            if !progressed {
                break;
            }
        }

        // Attempt counters only survive for transactions still unresolved
        self.attempts.retain(|txid, _| pending_ids.contains(txid));
        for tx in pending {
            self.defer(tx, &mut stats);
        }

        self.cursor += consumed;

        log::debug!(
            "Merged batch for {}: {} applied, {} unresolved, {} abandoned in {} passes (cursor {})",
            self.address,
            stats.applied,
            stats.unresolved,
            stats.abandoned,
            stats.passes,
            self.cursor
        );
        self.last_merge = stats;

        &self.utxos
    }

    /// Every referenced output must be removable now or belong to someone else
    fn is_eligible(&self, tx: &Transaction, pending_ids: &HashSet<String>) -> bool {
        tx.spent_outpoints().all(|outpoint| {
            if self.live.contains(&outpoint) {
                return true;
            }
            // Created by a batch member not applied yet, or a double spend
            !pending_ids.contains(&outpoint.txid) && !self.credited.contains(&outpoint)
        })
    }

    fn apply_transaction(&mut self, tx: &Transaction) {
        for outpoint in tx.spent_outpoints() {
            if self.live.remove(&outpoint) {
                self.utxos.retain(|utxo| !utxo.matches(&outpoint));
            }
            self.spent.insert(outpoint);
        }

        for output in tx.outputs.iter().filter(|o| o.is_owned_by(&self.address)) {
            let utxo = UnspentOutput::from_output(tx, output, &self.address);
            let outpoint = utxo.outpoint();
            // A spender applied earlier already consumed it
            if self.spent.contains(&outpoint) {
                self.credited.insert(outpoint);
                continue;
            }
            if self.live.insert(outpoint.clone()) {
                self.credited.insert(outpoint);
                self.utxos.push(utxo);
            }
        }

        self.attempts.remove(&tx.txid);
        self.seen.insert(tx.txid.clone());
    }

    /// Raise confirmation counts of outputs created by an already seen transaction
    fn refresh_confirmations(&mut self, tx: &Transaction) -> bool {
        let mut refreshed = false;
        for utxo in self.utxos.iter_mut().filter(|u| u.txid == tx.txid) {
            if tx.confirmations > utxo.confirmations {
                utxo.confirmations = tx.confirmations;
                refreshed = true;
            }
        }
        refreshed
    }

    fn defer(&mut self, tx: Transaction, stats: &mut MergeStats) {
        let attempts = {
            let count = self.attempts.entry(tx.txid.clone()).or_insert(0);
            *count += 1;
            *count
        };

        if attempts >= self.max_attempts {
            log::warn!(
                "Abandoning transaction {} for {} after {} unresolved merges",
                tx.txid,
                self.address,
                attempts
            );
            self.attempts.remove(&tx.txid);
            self.abandoned.insert(tx.txid);
            stats.abandoned += 1;
            return;
        }

        stats.unresolved += 1;
        if tx.is_confirmed() {
            self.deferred.push(tx);
        }
    }

    // =========================================================================
    // Views
    // =========================================================================

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn utxos(&self) -> &[UnspentOutput] {
        &self.utxos
    }

    /// Sum of outputs with at least one confirmation, in subunits
    pub fn confirmed_balance(&self) -> u64 {
        self.utxos
            .iter()
            .filter(|u| u.is_confirmed())
            .map(|u| u.satoshis)
            .sum()
    }

    /// Sum of all outputs, in subunits
    pub fn total_balance(&self) -> u64 {
        self.utxos.iter().map(|u| u.satoshis).sum()
    }

    pub fn has_seen(&self, txid: &str) -> bool {
        self.seen.contains(txid)
    }

    pub fn is_abandoned(&self, txid: &str) -> bool {
        self.abandoned.contains(txid)
    }

    /// Whether the ledger has nothing more to learn from `txid`'s body
    pub fn is_settled(&self, txid: &str) -> bool {
        self.has_seen(txid) || self.is_abandoned(txid)
    }

    /// Number of confirmed transactions carried to the next merge
    pub fn deferred_len(&self) -> usize {
        self.deferred.len()
    }

    pub fn last_merge(&self) -> &MergeStats {
        &self.last_merge
    }

    pub fn len(&self) -> usize {
        self.utxos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.utxos.is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================
