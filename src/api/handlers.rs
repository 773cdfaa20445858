//! Node front handlers

use crate::api::proxy::ReverseProxy;
use crate::api::rpc::{self, RpcRequest, RPC_INVALID_PARAMETER};
use crate::core::UnspentOutput;
use crate::indexer::{AddressIndexer, IndexerError};
use crate::source::TransactionSource;
use axum::{
    body::Bytes,
    extract::{Path, Request, State},
    http::{HeaderMap, Method, StatusCode, Uri},
    response::Response,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Shared state of the node front
#[derive(Clone)]
pub struct ApiState {
    pub indexer: Arc<AddressIndexer<dyn TransactionSource>>,
    pub node_proxy: ReverseProxy,
}

// ============================================================================
// Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Serialize)]
pub struct BalanceResponse {
    pub address: String,
    pub confirmed: u64,
    pub total: u64,
    pub utxo_count: usize,
}

#[derive(Serialize)]
pub struct SubmitResponse {
    pub txid: String,
}

#[derive(Serialize)]
pub struct ApiError {
    pub error: String,
}

// ============================================================================
// Request Types
// ============================================================================

#[derive(Deserialize)]
pub struct SubmitRequest {
    pub hex: String,
}

fn indexer_error(err: IndexerError) -> (StatusCode, Json<ApiError>) {
    let status = match &err {
        IndexerError::MalformedInput(_) => StatusCode::BAD_REQUEST,
        IndexerError::Upstream(e) => {
            log::warn!("Upstream failure: {}", e);
            StatusCode::BAD_GATEWAY
        }
    };
    (
        status,
        Json(ApiError {
            error: err.to_string(),
        }),
    )
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /health
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// GET /api/address/{address}/utxos - Unspent outputs of an address
pub async fn get_address_utxos(
    State(state): State<ApiState>,
    Path(address): Path<String>,
) -> Result<Json<Vec<UnspentOutput>>, (StatusCode, Json<ApiError>)> {
    let utxos = state
        .indexer
        .list_unspent(&address)
        .await
        .map_err(indexer_error)?;
    Ok(Json(utxos))
}

/// GET /api/address/{address}/balance - Confirmed and total balance
pub async fn get_address_balance(
    State(state): State<ApiState>,
    Path(address): Path<String>,
) -> Result<Json<BalanceResponse>, (StatusCode, Json<ApiError>)> {
    let ledger = state.indexer.sync(&address).await.map_err(indexer_error)?;

    Ok(Json(BalanceResponse {
        confirmed: ledger.confirmed_balance(),
        total: ledger.total_balance(),
        utxo_count: ledger.len(),
        address,
    }))
}

/// POST /api/tx - Relay a signed transaction
pub async fn submit_transaction(
    State(state): State<ApiState>,
    Json(req): Json<SubmitRequest>,
) -> Result<Json<SubmitResponse>, (StatusCode, Json<ApiError>)> {
    let txid = state.indexer.submit(&req.hex).await.map_err(indexer_error)?;
    Ok(Json(SubmitResponse { txid }))
}

/// POST / - JSON-RPC, answered locally for indexed methods
pub async fn rpc_entry(
    State(state): State<ApiState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    // Batches and non-JSON bodies fail to parse and go to the node as is
    let request: RpcRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(_) => {
            return state
                .node_proxy
                .forward_parts(method, &uri, &headers, body)
                .await
        }
    };

    match rpc::parse_local_call(&request) {
        Ok(Some(call)) => {
            log::debug!("Answering {} locally", request.method);
            rpc::execute(state.indexer.as_ref(), request.id, call).await
        }
        Ok(None) => {
            state
                .node_proxy
                .forward_parts(method, &uri, &headers, body)
                .await
        }
        Err(message) => rpc::error_response(
            request.id,
            StatusCode::BAD_REQUEST,
            RPC_INVALID_PARAMETER,
            message,
        ),
    }
}

/// Fallback - everything else goes to the node
pub async fn forward_to_node(State(state): State<ApiState>, request: Request) -> Response {
    state.node_proxy.forward(request).await
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexConfig;
    use crate::core::{Transaction, TxInput, TxOutput};
    use crate::source::mock::MockSource;
    use axum::body::to_bytes;
    use serde_json::{json, Value};
    use std::time::Duration;

    const ADDR: &str = "addrA";

    fn make_tx(txid: &str, value: u64, confirmations: u64) -> Transaction {
        Transaction {
            txid: txid.to_string(),
            inputs: vec![TxInput::coinbase()],
            outputs: vec![TxOutput {
                index: 0,
                addresses: vec![ADDR.to_string()],
                script_pub_key: "51".to_string(),
                value,
            }],
            confirmations,
        }
    }

    fn state() -> (Arc<MockSource>, ApiState) {
        let mock = Arc::new(MockSource::new());
        let source: Arc<dyn TransactionSource> = mock.clone();
        let state = ApiState {
            indexer: Arc::new(AddressIndexer::new(source, &IndexConfig::default())),
            node_proxy: ReverseProxy::new("http://127.0.0.1:1", Duration::from_secs(5)).unwrap(),
        };
        (mock, state)
    }

    async fn call_rpc(state: &ApiState, body: Value) -> (StatusCode, Value) {
        let response = rpc_entry(
            State(state.clone()),
            Method::POST,
            Uri::from_static("/"),
            HeaderMap::new(),
            Bytes::from(body.to_string()),
        )
        .await;
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn test_balance_endpoint() {
        let (mock, state) = state();
        mock.push_confirmed(ADDR, make_tx("mined", 1500, 2));
        mock.add_to_pool(make_tx("pending", 500, 0));

        let Json(balance) = get_address_balance(State(state), Path(ADDR.to_string()))
            .await
            .unwrap_or_else(|_| panic!("balance failed"));

        assert_eq!(balance.address, ADDR);
        assert_eq!(balance.confirmed, 1500);
        assert_eq!(balance.total, 2000);
        assert_eq!(balance.utxo_count, 2);
    }

    #[tokio::test]
    async fn test_upstream_failure_is_bad_gateway() {
        let (mock, state) = state();
        mock.fail_history(true);

        let err = get_address_utxos(State(state), Path(ADDR.to_string()))
            .await
            .err()
            .unwrap();
        assert_eq!(err.0, StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_submit_rejects_bad_hex() {
        let (mock, state) = state();

        let err = submit_transaction(
            State(state.clone()),
            Json(SubmitRequest {
                hex: "xyz".to_string(),
            }),
        )
        .await
        .err()
        .unwrap();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);

        let Json(ok) = submit_transaction(
            State(state),
            Json(SubmitRequest {
                hex: "0200".to_string(),
            }),
        )
        .await
        .unwrap_or_else(|_| panic!("submit failed"));
        assert_eq!(ok.txid, "txid-1");
        assert_eq!(mock.broadcasts(), vec!["0200"]);
    }

    #[tokio::test]
    async fn test_rpc_listunspent_answered_locally() {
        let (mock, state) = state();
        mock.push_confirmed(ADDR, make_tx("mined", 1500, 2));
        mock.add_to_pool(make_tx("pending", 500, 0));

        let (status, body) = call_rpc(
            &state,
            json!({"method": "listunspent", "params": [1, 9999999, [ADDR]], "id": "a"}),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], "a");
        assert!(body["error"].is_null());
        let utxos = body["result"].as_array().unwrap();
        assert_eq!(utxos.len(), 1);
        assert_eq!(utxos[0]["txid"], "mined");
        assert_eq!(utxos[0]["satoshis"], 1500);
    }

    #[tokio::test]
    async fn test_rpc_getaddressbalance() {
        let (mock, state) = state();
        mock.push_confirmed(ADDR, make_tx("mined", 1500, 2));
        mock.add_to_pool(make_tx("pending", 500, 0));

        let (_, body) = call_rpc(
            &state,
            json!({"method": "getaddressbalance", "params": [{"addresses": [ADDR]}], "id": 7}),
        )
        .await;

        assert_eq!(body["result"], json!({"confirmed": 1500, "total": 2000}));
        assert_eq!(body["id"], 7);
    }

    #[tokio::test]
    async fn test_rpc_errors_use_envelope() {
        let (_, state) = state();

        let (status, body) = call_rpc(
            &state,
            json!({"method": "sendrawtransaction", "params": ["nothex"], "id": 1}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], -22);
        assert!(body["result"].is_null());

        let (status, body) = call_rpc(
            &state,
            json!({"method": "listunspent", "params": [-1, 10, [ADDR]], "id": 2}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], -8);
    }

    #[tokio::test]
    async fn test_rpc_other_methods_are_forwarded() {
        let (mock, state) = state();

        // The node backend is unreachable, so forwarding shows up as a 500
        let (status, _) = call_rpc(&state, json!({"method": "getblockcount", "params": [], "id": 1})).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

        let (status, _) = call_rpc(&state, json!([{"method": "listunspent", "params": [1, 10, [ADDR]]}])).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

        assert!(mock.history_calls().is_empty());
    }
}
