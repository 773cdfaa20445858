//! bitcoind-style JSON-RPC transaction source
//!
//! Needs a node with an address index (`searchrawtransactions`), as served by
//! btcd or an addrindex-enabled bitcoind.

use crate::config::RpcConfig;
use crate::core::{to_subunits, Transaction, TxInput, TxOutput};
use crate::source::{ConfirmedHistory, SourceError, TransactionSource};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

/// RPC error code for "no information available about address/transaction"
pub const RPC_NO_TX_INFO: i64 = -5;

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

/// Verbose transaction as returned by `getrawtransaction` and `searchrawtransactions`
#[derive(Debug, Clone, Deserialize)]
pub struct RawTransaction {
    pub txid: String,
    #[serde(default)]
    pub vin: Vec<RawInput>,
    #[serde(default)]
    pub vout: Vec<RawOutput>,
    /// Absent while in the pool
    #[serde(default)]
    pub confirmations: u64,
}

/// Coinbase inputs carry neither `txid` nor `vout`
#[derive(Debug, Clone, Deserialize)]
pub struct RawInput {
    pub txid: Option<String>,
    pub vout: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawOutput {
    pub value: f64,
    pub n: u32,
    #[serde(rename = "scriptPubKey")]
    pub script_pub_key: RawScript,
}

/// Older nodes list `addresses`, newer ones a single `address`
#[derive(Debug, Clone, Deserialize)]
pub struct RawScript {
    #[serde(default)]
    pub hex: String,
    #[serde(default)]
    pub addresses: Vec<String>,
    pub address: Option<String>,
}

impl From<RawTransaction> for Transaction {
    fn from(raw: RawTransaction) -> Self {
        let inputs = raw
            .vin
            .into_iter()
            .map(|input| TxInput {
                spent_txid: input.txid,
                spent_output_index: input.vout,
            })
            .collect();

        let outputs = raw
            .vout
            .into_iter()
            .map(|output| {
                let RawScript {
                    hex,
                    mut addresses,
                    address,
                } = output.script_pub_key;
                if let Some(address) = address {
                    if !addresses.contains(&address) {
                        addresses.push(address);
                    }
                }
                TxOutput {
                    index: output.n,
                    addresses,
                    script_pub_key: hex,
                    value: to_subunits(output.value),
                }
            })
            .collect();

        Transaction {
            txid: raw.txid,
            inputs,
            outputs,
            confirmations: raw.confirmations,
        }
    }
}

/// Unwrap a JSON-RPC response body
fn decode_response<T: DeserializeOwned>(
    method: &str,
    status: StatusCode,
    body: &[u8],
) -> Result<T, SourceError> {
    let response: RpcResponse<T> = match serde_json::from_slice(body) {
        Ok(response) => response,
        // Auth failures and the like come back without a JSON envelope
        Err(_) if !status.is_success() => return Err(SourceError::Status(status)),
        Err(e) => return Err(SourceError::Decode(e)),
    };

    if let Some(error) = response.error {
        return Err(SourceError::Rpc {
            code: error.code,
            message: error.message,
        });
    }

    response
        .result
        .ok_or_else(|| SourceError::MissingResult(method.to_string()))
}

// =============================================================================
// Client
// =============================================================================

/// JSON-RPC client for a bitcoind-compatible node
#[derive(Debug, Clone)]
pub struct BitcoindSource {
    http: reqwest::Client,
    url: String,
    user: Option<String>,
    password: Option<String>,
    page_size: usize,
}

impl BitcoindSource {
    pub fn new(url: impl Into<String>, config: &RpcConfig) -> Result<Self, SourceError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            http,
            url: url.into(),
            user: config.user.clone(),
            password: config.password.clone(),
            page_size: config.page_size.max(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Issue a single JSON-RPC call
    pub async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, SourceError> {
        let body = json!({
            "jsonrpc": "1.0",
            "id": "utxo-gateway",
            "method": method,
            "params": params,
        });

        let mut request = self.http.post(&self.url).json(&body);
        if let Some(user) = &self.user {
            request = request.basic_auth(user, self.password.as_ref());
        }

        let response = request.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;

        decode_response(method, status, &bytes)
    }

    async fn search_page(&self, address: &str, skip: usize) -> Result<Vec<RawTransaction>, SourceError> {
        let params = json!([address, 1, skip, self.page_size]);
        match self.call("searchrawtransactions", params).await {
            // Addresses without history are reported as an error
            Err(SourceError::Rpc {
                code: RPC_NO_TX_INFO,
                ..
            }) => Ok(Vec::new()),
            other => other,
        }
    }
}

#[async_trait]
impl TransactionSource for BitcoindSource {
    async fn fetch_confirmed(
        &self,
        address: &str,
        from: usize,
    ) -> Result<ConfirmedHistory, SourceError> {
        let mut transactions = Vec::new();
        let mut skip = from;

        loop {
            let page = self.search_page(address, skip).await?;
            let page_len = page.len();

            // Pool entries come last; stop at the first one so the cursor
            // never moves past a transaction that has no block yet
            let before = transactions.len();
            transactions.extend(
                page.into_iter()
                    .take_while(|raw| raw.confirmations > 0)
                    .map(Transaction::from),
            );
            let reached_pool = transactions.len() - before < page_len;

            if reached_pool || page_len < self.page_size {
                break;
            }
            skip += page_len;
        }

        log::debug!(
            "Fetched {} confirmed transactions for {} from {}",
            transactions.len(),
            address,
            from
        );
        Ok(ConfirmedHistory::new(transactions))
    }

    async fn fetch_unconfirmed_ids(&self) -> Result<Vec<String>, SourceError> {
        self.call("getrawmempool", json!([])).await
    }

    async fn fetch_transaction(&self, txid: &str) -> Result<Transaction, SourceError> {
        let raw: RawTransaction = self.call("getrawtransaction", json!([txid, 1])).await?;
        Ok(raw.into())
    }

    async fn broadcast(&self, raw_hex: &str) -> Result<String, SourceError> {
        self.call("sendrawtransaction", json!([raw_hex])).await
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::State, routing::post, Json, Router};
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Address history served by a local fake node
    #[derive(Clone, Default)]
    struct FakeNode {
        history: Arc<Vec<Value>>,
        skips: Arc<Mutex<Vec<u64>>>,
    }

    async fn fake_rpc(State(node): State<FakeNode>, Json(req): Json<Value>) -> (StatusCode, Json<Value>) {
        assert_eq!(req["method"], "searchrawtransactions");
        let params = &req["params"];
        let skip = params[2].as_u64().unwrap_or(0);
        let count = params[3].as_u64().unwrap_or(0);
        node.skips.lock().push(skip);

        if params[0] == "unknown" {
            let error = json!({"code": -5, "message": "No information available about address"});
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"result": null, "error": error, "id": req["id"]})),
            );
        }

        let page: Vec<Value> = node
            .history
            .iter()
            .skip(skip as usize)
            .take(count as usize)
            .cloned()
            .collect();
        (StatusCode::OK, Json(json!({"result": page, "error": null, "id": req["id"]})))
    }

    async fn spawn_node(history: Vec<Value>, page_size: usize) -> (BitcoindSource, FakeNode) {
        let node = FakeNode {
            history: Arc::new(history),
            ..Default::default()
        };
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let app = Router::new().route("/", post(fake_rpc)).with_state(node.clone());
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let config = RpcConfig {
            page_size,
            ..Default::default()
        };
        (BitcoindSource::new(url, &config).unwrap(), node)
    }

    /// Verbose transaction paying addrA; pool entries carry no confirmations
    fn history_entry(txid: &str, confirmations: u64) -> Value {
        let mut tx = json!({
            "txid": txid,
            "vin": [{"coinbase": "00"}],
            "vout": [{"value": 0.00001, "n": 0, "scriptPubKey": {"hex": "51", "addresses": ["addrA"]}}],
        });
        if confirmations > 0 {
            tx["confirmations"] = json!(confirmations);
        }
        tx
    }

    fn ids(history: &ConfirmedHistory) -> Vec<&str> {
        history.transactions.iter().map(|tx| tx.txid.as_str()).collect()
    }

    const RAW_TX: &str = r#"{
        "txid": "aa11",
        "version": 1,
        "vin": [
            {"txid": "ff00", "vout": 2, "scriptSig": {"asm": "", "hex": ""}, "sequence": 4294967295},
            {"coinbase": "03a0bb0d", "sequence": 4294967295}
        ],
        "vout": [
            {"value": 0.0000099, "n": 0, "scriptPubKey": {"hex": "76a914aa", "type": "pubkeyhash", "addresses": ["mAddr1"]}},
            {"value": 1.5, "n": 1, "scriptPubKey": {"hex": "0014bb", "type": "witness_v0_keyhash", "address": "tb1qaddr"}},
            {"value": 0, "n": 2, "scriptPubKey": {"hex": "6a", "type": "nulldata"}}
        ],
        "confirmations": 12
    }"#;

    #[test]
    fn test_decode_raw_transaction() {
        let raw: RawTransaction = serde_json::from_str(RAW_TX).unwrap();
        let tx = Transaction::from(raw);

        assert_eq!(tx.txid, "aa11");
        assert_eq!(tx.confirmations, 12);
        assert_eq!(tx.inputs[0], TxInput::spending("ff00", 2));
        assert_eq!(tx.inputs[1], TxInput::coinbase());

        assert_eq!(tx.outputs[0].value, 990);
        assert!(tx.outputs[0].is_owned_by("mAddr1"));
        assert_eq!(tx.outputs[1].value, 150_000_000);
        assert!(tx.outputs[1].is_owned_by("tb1qaddr"));
        assert_eq!(tx.outputs[1].script_pub_key, "0014bb");
        assert!(tx.outputs[2].addresses.is_empty());
    }

    #[test]
    fn test_pool_transaction_has_no_confirmations() {
        let raw: RawTransaction =
            serde_json::from_str(r#"{"txid": "bb22", "vin": [], "vout": []}"#).unwrap();
        assert_eq!(Transaction::from(raw).confirmations, 0);
    }

    #[test]
    fn test_decode_response_result() {
        let body = br#"{"result": ["t1", "t2"], "error": null, "id": "utxo-gateway"}"#;
        let ids: Vec<String> = decode_response("getrawmempool", StatusCode::OK, body).unwrap();
        assert_eq!(ids, vec!["t1", "t2"]);
    }

    #[test]
    fn test_decode_response_error() {
        let body = br#"{"result": null, "error": {"code": -5, "message": "No information available about address"}, "id": 1}"#;
        let err = decode_response::<Vec<Value>>(
            "searchrawtransactions",
            StatusCode::INTERNAL_SERVER_ERROR,
            body,
        )
        .unwrap_err();

        assert_eq!(err.rpc_code(), Some(RPC_NO_TX_INFO));
    }

    #[test]
    fn test_decode_response_without_envelope() {
        let err = decode_response::<String>("getrawmempool", StatusCode::UNAUTHORIZED, b"")
            .unwrap_err();
        assert!(matches!(err, SourceError::Status(StatusCode::UNAUTHORIZED)));

        let err = decode_response::<String>("getrawmempool", StatusCode::OK, b"<html>")
            .unwrap_err();
        assert!(matches!(err, SourceError::Decode(_)));

        let err = decode_response::<String>("sendrawtransaction", StatusCode::OK, br#"{"result": null}"#)
            .unwrap_err();
        assert!(matches!(err, SourceError::MissingResult(_)));
    }

    #[tokio::test]
    async fn test_history_pages_until_short_page() {
        let history = (1..=5).map(|i| history_entry(&format!("c{}", i), 10)).collect();
        let (source, node) = spawn_node(history, 2).await;

        let all = source.fetch_confirmed("addrA", 0).await.unwrap();
        assert_eq!(ids(&all), vec!["c1", "c2", "c3", "c4", "c5"]);
        assert_eq!(all.consumed, 5);
        assert_eq!(*node.skips.lock(), vec![0, 2, 4]);

        node.skips.lock().clear();
        let rest = source.fetch_confirmed("addrA", 3).await.unwrap();
        assert_eq!(ids(&rest), vec!["c4", "c5"]);
        assert_eq!(rest.consumed, 2);
        // A full last page needs one more, empty, request
        assert_eq!(*node.skips.lock(), vec![3, 5]);
    }

    #[tokio::test]
    async fn test_history_stops_at_pool_entries() {
        let history = vec![
            history_entry("c1", 3),
            history_entry("c2", 2),
            history_entry("c3", 1),
            history_entry("p1", 0),
            history_entry("p2", 0),
        ];
        let (source, node) = spawn_node(history, 2).await;

        let fetched = source.fetch_confirmed("addrA", 0).await.unwrap();

        assert_eq!(ids(&fetched), vec!["c1", "c2", "c3"]);
        assert_eq!(fetched.consumed, 3);
        assert!(fetched.transactions.iter().all(Transaction::is_confirmed));
        assert_eq!(*node.skips.lock(), vec![0, 2]);

        // Only pool entries left past the cursor
        let nothing = source.fetch_confirmed("addrA", 3).await.unwrap();
        assert!(nothing.transactions.is_empty());
        assert_eq!(nothing.consumed, 0);
    }

    #[tokio::test]
    async fn test_unknown_address_is_empty_history() {
        let (source, node) = spawn_node(vec![history_entry("c1", 1)], 2).await;

        let fetched = source.fetch_confirmed("unknown", 0).await.unwrap();

        assert!(fetched.transactions.is_empty());
        assert_eq!(fetched.consumed, 0);
        assert_eq!(*node.skips.lock(), vec![0]);
    }
}
