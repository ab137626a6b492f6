//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;

use axum::{
    body::Bytes,
    http::{HeaderMap, Method, StatusCode, Uri},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use chain_rpc_proxy::{ProxyServer, Shutdown};

/// Start a mock upstream that answers every request with a JSON-RPC result
/// describing what it received.
pub async fn start_echo_upstream() -> SocketAddr {
    let app = Router::new().fallback(echo);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    addr
}

async fn echo(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Json<Value> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    let request: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);

    Json(json!({
        "id": request.get("id").cloned().unwrap_or(json!(0)),
        "jsonrpc": "2.0",
        "result": {
            "method": method.as_str(),
            "path": uri.path(),
            "query": uri.query(),
            "body": request,
            "body_len": body.len(),
            "content_length": header("content-length"),
            "host": header("host"),
            "x_forwarded_for": header("x-forwarded-for"),
            "x_forwarded_host": header("x-forwarded-host"),
            "x_forwarded_proto": header("x-forwarded-proto"),
            "x_request_id": header("x-request-id"),
        }
    }))
}

/// Start a proxy on an ephemeral port.
///
/// The returned [`Shutdown`] must be kept alive for the duration of the test.
pub async fn start_proxy(server: ProxyServer) -> (SocketAddr, Shutdown) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let listener_handle = shutdown.listener();
    tokio::spawn(async move {
        server.run(listener, listener_handle).await.unwrap();
    });

    (addr, shutdown)
}

/// Client that never routes through an environment proxy.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

/// POST a JSON body and decode the JSON reply.
pub async fn post_json(url: &str, body: &str) -> (StatusCode, Value) {
    let res = client()
        .post(url)
        .header("content-type", "application/json")
        .body(body.to_string())
        .send()
        .await
        .unwrap();
    let status = StatusCode::from_u16(res.status().as_u16()).unwrap();
    (status, res.json().await.unwrap())
}
