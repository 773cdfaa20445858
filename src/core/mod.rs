//! Core data types
//!
//! This module contains the shapes every other layer agrees on:
//! - Transactions (inputs referencing spent outputs, outputs with addresses)
//! - Outpoints
//! - Unspent outputs as reported to clients

pub mod transaction;

pub use transaction::{
    to_base_units, to_subunits, OutPoint, Transaction, TxInput, TxOutput, UnspentOutput, COIN,
};
