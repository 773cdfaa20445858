//! Address-keyed registry of UTXO ledgers
//!
//! Ledgers are created lazily on first query and evicted least-recently-queried
//! first once the registry is full. An evicted ledger is rebuilt by scanning
//! the address again from cursor 0.

use crate::ledger::utxo_ledger::{UtxoLedger, DEFAULT_MAX_ATTEMPTS};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;

/// Default maximum number of tracked addresses
pub const DEFAULT_MAX_LEDGERS: usize = 10_000;

/// A ledger shared between the registry and in-flight queries.
/// Holding its lock serializes every query against the address.
pub type SharedLedger = Arc<AsyncMutex<UtxoLedger>>;

#[derive(Debug, Default)]
struct Slots {
    ledgers: HashMap<String, SharedLedger>,
    /// Front = most recently queried
    lru_order: VecDeque<String>,
    evictions: u64,
}

/// Registry of per-address ledgers
#[derive(Debug)]
pub struct LedgerRegistry {
    slots: Mutex<Slots>,
    max_ledgers: usize,
    max_attempts: u32,
}

impl LedgerRegistry {
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_MAX_LEDGERS, DEFAULT_MAX_ATTEMPTS)
    }

    pub fn with_limits(max_ledgers: usize, max_attempts: u32) -> Self {
        Self {
            slots: Mutex::new(Slots::default()),
            max_ledgers: max_ledgers.max(1),
            max_attempts,
        }
    }

    /// Get the ledger for `address`, creating it if needed
    pub fn ledger(&self, address: &str) -> SharedLedger {
        let mut slots = self.slots.lock();

        if let Some(ledger) = slots.ledgers.get(address).cloned() {
            touch_lru(&mut slots.lru_order, address);
            return ledger;
        }

        if slots.ledgers.len() >= self.max_ledgers {
            evict_one(&mut slots);
        }

        let ledger = Arc::new(AsyncMutex::new(UtxoLedger::with_max_attempts(
            address,
            self.max_attempts,
        )));
        slots.ledgers.insert(address.to_string(), ledger.clone());
        slots.lru_order.push_front(address.to_string());
        log::debug!("Tracking new address {}", address);

        ledger
    }

    /// Get the ledger for `address` without creating or touching it
    pub fn peek(&self, address: &str) -> Option<SharedLedger> {
        self.slots.lock().ledgers.get(address).cloned()
    }

    pub fn contains(&self, address: &str) -> bool {
        self.slots.lock().ledgers.contains_key(address)
    }

    pub fn len(&self) -> usize {
        self.slots.lock().ledgers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn evictions(&self) -> u64 {
        self.slots.lock().evictions
    }
}

impl Default for LedgerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn touch_lru(order: &mut VecDeque<String>, address: &str) {
    if order.front().map(String::as_str) == Some(address) {
        return;
    }
    order.retain(|a| a != address);
    order.push_front(address.to_string());
}

/// Evict the least recently queried ledger no query holds, falling back to
/// the least recently queried one when every ledger is in use
fn evict_one(slots: &mut Slots) {
    let idle = slots.lru_order.iter().rposition(|address| {
        slots
            .ledgers
            .get(address)
            .map_or(true, |ledger| Arc::strong_count(ledger) == 1)
    });
    let position = match idle {
        Some(position) => position,
        None => match slots.lru_order.len().checked_sub(1) {
            Some(last) => last,
            None => return,
        },
    };

    if let Some(address) = slots.lru_order.remove(position) {
        slots.ledgers.remove(&address);
        slots.evictions += 1;
        log::debug!("Evicted ledger for {}", address);
    }
}

// =============================================================================
// Tests
// =============================================================================
