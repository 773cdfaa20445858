//! Reverse proxy to a plain-HTTP backend

use axum::{
    body::{to_bytes, Body, Bytes},
    extract::{Request, State},
    http::{HeaderMap, HeaderName, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use std::fmt::Display;
use std::time::Duration;

/// Largest request or response body forwarded
pub const MAX_BODY_SIZE: usize = 32 * 1024 * 1024;

/// Connection-scoped headers that must not cross the proxy
fn is_hop_by_hop(name: &HeaderName) -> bool {
    matches!(
        name.as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
            | "content-length"
            | "host"
    )
}

fn forwardable(headers: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if !is_hop_by_hop(name) {
            out.append(name.clone(), value.clone());
        }
    }
    out
}

/// Upstream failures surface as a 500 carrying the error text
pub fn proxy_error(err: impl Display) -> Response {
    log::warn!("Proxy error: {}", err);
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
}

/// Forwards whole requests to one backend
#[derive(Debug, Clone)]
pub struct ReverseProxy {
    http: reqwest::Client,
    target: String,
}

impl ReverseProxy {
    /// `target` is the backend base URL, e.g. `http://127.0.0.1:18332`
    pub fn new(target: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        let target = target.into().trim_end_matches('/').to_string();

        Ok(Self { http, target })
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Forward a request as received
    pub async fn forward(&self, request: Request) -> Response {
        let (parts, body) = request.into_parts();
        match to_bytes(body, MAX_BODY_SIZE).await {
            Ok(body) => {
                self.forward_parts(parts.method, &parts.uri, &parts.headers, body)
                    .await
            }
            Err(e) => proxy_error(e),
        }
    }

    /// Forward a request whose body was already read
    pub async fn forward_parts(
        &self,
        method: Method,
        uri: &Uri,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Response {
        let path = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
        let url = format!("{}{}", self.target, path);
        log::debug!("Forwarding {} {}", method, url);

        let upstream = match self
            .http
            .request(method, &url)
            .headers(forwardable(headers))
            .body(body)
            .send()
            .await
        {
            Ok(upstream) => upstream,
            Err(e) => return proxy_error(e),
        };

        let status = upstream.status();
        let headers = forwardable(upstream.headers());
        match upstream.bytes().await {
            Ok(bytes) => {
                let mut response = Response::new(Body::from(bytes));
                *response.status_mut() = status;
                *response.headers_mut() = headers;
                response
            }
            Err(e) => proxy_error(e),
        }
    }
}

/// Fallback handler forwarding everything to the proxy in state
pub async fn forward_all(State(proxy): State<ReverseProxy>, request: Request) -> Response {
    proxy.forward(request).await
}
