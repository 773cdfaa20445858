//! Routers of the two TLS fronts

use crate::api::handlers::{self, ApiState};
use crate::api::proxy::{forward_all, ReverseProxy, MAX_BODY_SIZE};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Node front: index endpoints, intercepted JSON-RPC, everything else proxied
pub fn create_node_router(state: ApiState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Address index
        .route(
            "/api/address/{address}/utxos",
            get(handlers::get_address_utxos),
        )
        .route(
            "/api/address/{address}/balance",
            get(handlers::get_address_balance),
        )
        .route("/api/tx", post(handlers::submit_transaction))
        // JSON-RPC, other methods on `/` go straight to the node
        .route(
            "/",
            post(handlers::rpc_entry).fallback(handlers::forward_to_node),
        )
        .fallback(handlers::forward_to_node)
        .with_state(state)
        // Same ceiling for intercepted and proxied bodies
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .layer(cors())
}

/// Ledger-layer front: every request proxied
pub fn create_proxy_router(proxy: ReverseProxy) -> Router {
    Router::new()
        .fallback(forward_all)
        .with_state(proxy)
        .layer(cors())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexConfig;
    use crate::indexer::AddressIndexer;
    use crate::source::{mock::MockSource, TransactionSource};
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    fn node_router() -> Router {
        let source: Arc<dyn TransactionSource> = Arc::new(MockSource::new());
        create_node_router(ApiState {
            indexer: Arc::new(AddressIndexer::new(source, &IndexConfig::default())),
            node_proxy: ReverseProxy::new("http://127.0.0.1:1", Duration::from_secs(5)).unwrap(),
        })
    }

    #[tokio::test]
    async fn test_health_route() {
        let response = node_router()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], br#"{"status":"ok"}"#);
    }

    #[tokio::test]
    async fn test_balance_route() {
        let response = node_router()
            .oneshot(
                Request::get("/api/address/addrA/balance")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["address"], "addrA");
        assert_eq!(json["total"], 0);
    }

    #[tokio::test]
    async fn test_unknown_routes_are_proxied() {
        // Unreachable backend, so proxying surfaces as a 500
        let response = node_router()
            .oneshot(Request::get("/rest/chaininfo.json").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let proxy = ReverseProxy::new("http://127.0.0.1:1", Duration::from_secs(5)).unwrap();
        let response = create_proxy_router(proxy)
            .oneshot(Request::post("/api/").body(Body::from("{}")).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_large_rpc_body_is_forwarded() {
        // Over axum's default extractor limit, under the proxy's
        let body = vec![b' '; 3 * 1024 * 1024];
        let response = node_router()
            .oneshot(Request::post("/").body(Body::from(body)).unwrap())
            .await
            .unwrap();

        // Forwarded to the unreachable backend rather than rejected with 413
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
