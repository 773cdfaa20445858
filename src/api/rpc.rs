//! JSON-RPC calls answered by the gateway instead of the node
//!
//! Only single requests for the methods below are intercepted; anything else
//! (batches, other methods, `listunspent` without addresses) goes to the node.

use crate::core::UnspentOutput;
use crate::indexer::{AddressIndexer, IndexerError};
use crate::source::TransactionSource;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

// =============================================================================
// Constants
// =============================================================================

/// Invalid, missing or out-of-range parameter
pub const RPC_INVALID_PARAMETER: i64 = -8;
/// Transaction payload could not be decoded
pub const RPC_DESERIALIZATION_ERROR: i64 = -22;
/// Upstream failure without an error code of its own
pub const RPC_INTERNAL_ERROR: i64 = -32603;

pub const DEFAULT_MINCONF: u64 = 1;
pub const DEFAULT_MAXCONF: u64 = 9_999_999;

// =============================================================================
// Requests
// =============================================================================

/// A single JSON-RPC request
#[derive(Debug, Clone, Deserialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// An intercepted call
#[derive(Debug, Clone, PartialEq)]
pub enum LocalCall {
    ListUnspent {
        minconf: u64,
        maxconf: u64,
        addresses: Vec<String>,
    },
    AddressBalance {
        addresses: Vec<String>,
    },
    SendRawTransaction {
        hex: String,
    },
}

/// Positional or named parameter
fn param<'a>(params: &'a Value, index: usize, name: &str) -> Option<&'a Value> {
    match params {
        Value::Array(items) => items.get(index),
        Value::Object(map) => map.get(name),
        _ => None,
    }
    .filter(|v| !v.is_null())
}

fn conf_param(params: &Value, index: usize, name: &str, default: u64) -> Result<u64, String> {
    match param(params, index, name) {
        None => Ok(default),
        Some(value) => value
            .as_u64()
            .ok_or_else(|| format!("{} must be a non-negative integer", name)),
    }
}

fn address_list(value: &Value) -> Result<Vec<String>, String> {
    let items = value
        .as_array()
        .ok_or_else(|| "addresses must be an array".to_string())?;
    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .ok_or_else(|| format!("invalid address {}", item))
        })
        .collect()
}

/// Decide whether `request` is answered locally
///
/// `Ok(None)` means the request belongs to the node. An error means the
/// method is ours but its parameters are unusable.
pub fn parse_local_call(request: &RpcRequest) -> Result<Option<LocalCall>, String> {
    let params = &request.params;

    match request.method.as_str() {
        "listunspent" => {
            let addresses = match param(params, 2, "addresses") {
                Some(value) => address_list(value)?,
                None => return Ok(None),
            };
            if addresses.is_empty() {
                return Ok(None);
            }
            Ok(Some(LocalCall::ListUnspent {
                minconf: conf_param(params, 0, "minconf", DEFAULT_MINCONF)?,
                maxconf: conf_param(params, 1, "maxconf", DEFAULT_MAXCONF)?,
                addresses,
            }))
        }
        "getaddressbalance" => {
            let addresses = match param(params, 0, "addresses") {
                Some(Value::String(address)) => vec![address.clone()],
                Some(Value::Object(map)) => match map.get("addresses") {
                    Some(list) => address_list(list)?,
                    None => Vec::new(),
                },
                Some(list @ Value::Array(_)) => address_list(list)?,
                _ => Vec::new(),
            };
            if addresses.is_empty() {
                return Err("at least one address is required".to_string());
            }
            Ok(Some(LocalCall::AddressBalance { addresses }))
        }
        "sendrawtransaction" => match param(params, 0, "hexstring") {
            Some(Value::String(hex)) => Ok(Some(LocalCall::SendRawTransaction { hex: hex.clone() })),
            _ => Err("hexstring is required".to_string()),
        },
        _ => Ok(None),
    }
}

// =============================================================================
// Responses
// =============================================================================

pub fn success_response(id: Value, result: Value) -> Response {
    Json(json!({ "result": result, "error": null, "id": id })).into_response()
}

pub fn error_response(id: Value, status: StatusCode, code: i64, message: impl Into<String>) -> Response {
    let body = json!({
        "result": null,
        "error": { "code": code, "message": message.into() },
        "id": id,
    });
    (status, Json(body)).into_response()
}

fn indexer_error_response(id: Value, err: IndexerError) -> Response {
    match &err {
        IndexerError::MalformedInput(_) => {
            error_response(id, StatusCode::BAD_REQUEST, RPC_DESERIALIZATION_ERROR, err.to_string())
        }
        IndexerError::Upstream(source) => {
            log::warn!("Upstream failure while answering RPC: {}", source);
            let code = source.rpc_code().unwrap_or(RPC_INTERNAL_ERROR);
            error_response(id, StatusCode::INTERNAL_SERVER_ERROR, code, err.to_string())
        }
    }
}

/// Answer an intercepted call
pub async fn execute<S>(indexer: &AddressIndexer<S>, id: Value, call: LocalCall) -> Response
where
    S: TransactionSource + ?Sized,
{
    let result = match call {
        LocalCall::ListUnspent {
            minconf,
            maxconf,
            addresses,
        } => list_unspent(indexer, minconf, maxconf, &addresses)
            .await
            .map(|utxos| json!(utxos)),
        LocalCall::AddressBalance { addresses } => {
            address_balance(indexer, &addresses).await
        }
        LocalCall::SendRawTransaction { hex } => indexer.submit(&hex).await.map(Value::String),
    };

    match result {
        Ok(value) => success_response(id, value),
        Err(e) => indexer_error_response(id, e),
    }
}

async fn list_unspent<S>(
    indexer: &AddressIndexer<S>,
    minconf: u64,
    maxconf: u64,
    addresses: &[String],
) -> Result<Vec<UnspentOutput>, IndexerError>
where
    S: TransactionSource + ?Sized,
{
    let mut utxos = Vec::new();
    for address in dedup(addresses) {
        let ledger = indexer.sync(address).await?;
        utxos.extend(
            ledger
                .utxos()
                .iter()
                .filter(|u| u.confirmations >= minconf && u.confirmations <= maxconf)
                .cloned(),
        );
    }
    Ok(utxos)
}

async fn address_balance<S>(
    indexer: &AddressIndexer<S>,
    addresses: &[String],
) -> Result<Value, IndexerError>
where
    S: TransactionSource + ?Sized,
{
    let (mut confirmed, mut total) = (0u64, 0u64);
    for address in dedup(addresses) {
        let balance = indexer.balance(address).await?;
        confirmed += balance.confirmed;
        total += balance.total;
    }
    Ok(json!({ "confirmed": confirmed, "total": total }))
}

/// Addresses in request order, each once
fn dedup(addresses: &[String]) -> Vec<&str> {
    let mut out: Vec<&str> = Vec::with_capacity(addresses.len());
    for address in addresses {
        if !out.contains(&address.as_str()) {
            out.push(address);
        }
    }
    out
}

// =============================================================================
// Tests
// =============================================================================
