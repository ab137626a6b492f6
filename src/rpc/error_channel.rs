//! Error redirection channel.
//!
//! A rewrite cannot write a response, so a routing failure turns the outbound
//! request into `GET <inbound path>/__rpc_error?response=<envelope>` aimed at
//! this proxy's own listener. The echo middleware answers that request with
//! the envelope verbatim, and the relay hands it back like any upstream reply.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use axum::body::Body;
use axum::http::{header, HeaderValue, Method, Request, Uri};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::Router;
use url::form_urlencoded;

use crate::proxy::ProxyRequest;
use crate::rpc::types::RpcResponse;

/// Path suffix reserved for the echo endpoint.
pub const RPC_ERROR_PATH: &str = "/__rpc_error";

/// Query parameter carrying the serialized error envelope.
pub const RESPONSE_PARAM: &str = "response";

/// JSON-RPC error code for proxy-level routing errors.
pub const ROUTING_ERROR_CODE: i64 = -32000;

/// Redirect the outbound request to the echo endpoint.
pub fn redirect_to_rpc_error(req: &mut ProxyRequest, id: i64, message: &str) {
    let envelope = RpcResponse::<()>::error(id, ROUTING_ERROR_CODE, message);
    let payload = match serde_json::to_string(&envelope) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode RPC error envelope");
            format!(
                r#"{{"id":{},"jsonrpc":"2.0","error":{{"code":{},"message":"internal proxy error"}}}}"#,
                id, ROUTING_ERROR_CODE
            )
        }
    };

    let inbound = req.inbound();
    let target = loopback(inbound.connection().local_addr);
    let Some(uri) = redirect_uri(target, inbound.path(), inbound.uri().query(), &payload) else {
        // Outbound stays an untouched copy rather than a half-built redirect.
        tracing::error!(address = %target, "Failed to build RPC error redirect");
        return;
    };

    *req.outbound_mut().uri_mut() = uri;
    req.set_method(Method::GET);
    req.clear_body();
}

/// `http://<target><path>/__rpc_error?<query>&response=<payload>`, or the bare
/// `/__rpc_error` path when the inbound path cannot be carried over.
fn redirect_uri(target: SocketAddr, path: &str, query: Option<&str>, payload: &str) -> Option<Uri> {
    let full = format!(
        "http://{}{}{}?{}",
        target,
        path.trim_end_matches('/'),
        RPC_ERROR_PATH,
        error_query(query, payload)
    );
    match full.parse::<Uri>() {
        Ok(uri) => Some(uri),
        Err(e) => {
            tracing::warn!(error = %e, path = %path, "Falling back to bare RPC error path");
            format!("http://{}{}?{}", target, RPC_ERROR_PATH, error_query(None, payload))
                .parse()
                .ok()
        }
    }
}

// Existing query pairs minus any `response`, then the envelope.
fn error_query(existing: Option<&str>, payload: &str) -> String {
    let mut query = form_urlencoded::Serializer::new(String::new());
    if let Some(existing) = existing {
        for (key, value) in form_urlencoded::parse(existing.as_bytes()) {
            if key != RESPONSE_PARAM {
                query.append_pair(&key, &value);
            }
        }
    }
    query.append_pair(RESPONSE_PARAM, payload);
    query.finish()
}

// A wildcard bind address is not something we can connect to.
fn loopback(addr: SocketAddr) -> SocketAddr {
    match addr.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => SocketAddr::new(Ipv4Addr::LOCALHOST.into(), addr.port()),
        IpAddr::V6(ip) if ip.is_unspecified() => SocketAddr::new(Ipv6Addr::LOCALHOST.into(), addr.port()),
        _ => addr,
    }
}

/// Register the echo endpoint ahead of every route already on the router.
pub fn register(router: Router) -> Router {
    router.layer(middleware::from_fn(echo_rpc_error))
}

/// Answers `GET …/__rpc_error?response=…` with the envelope; passes anything else on.
pub async fn echo_rpc_error(request: Request<Body>, next: Next) -> Response {
    if request.method() != Method::GET || !request.uri().path().ends_with(RPC_ERROR_PATH) {
        return next.run(request).await;
    }

    let body = request
        .uri()
        .query()
        .and_then(|q| {
            form_urlencoded::parse(q.as_bytes())
                .find(|(key, _)| key == RESPONSE_PARAM)
                .map(|(_, value)| value.trim().to_string())
        })
        .unwrap_or_default();

    (
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/json")),
            (header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff")),
        ],
        body,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::request::tests::inbound;
    use axum::http::StatusCode;
    use axum::routing::any;
    use serde_json::Value;
    use tower::ServiceExt;

    fn response_param(uri: &Uri) -> Value {
        let query = uri.query().unwrap();
        let (_, value) = form_urlencoded::parse(query.as_bytes())
            .find(|(k, _)| k == RESPONSE_PARAM)
            .unwrap();
        serde_json::from_str(&value).unwrap()
    }

    #[test]
    fn test_redirect_rewrites_outbound() {
        let mut req = ProxyRequest::new(inbound(
            Method::POST,
            "/rpc/?chainId=5",
            &[("content-type", "application/json")],
            r#"{"id":4}"#,
        ));

        redirect_to_rpc_error(&mut req, 4, "Unsupported chain ID: 5");

        let out = req.outbound();
        assert_eq!(out.method(), Method::GET);
        assert_eq!(out.uri().scheme_str(), Some("http"));
        assert_eq!(out.uri().authority().unwrap().as_str(), "127.0.0.1:3000");
        assert_eq!(out.uri().path(), "/rpc/__rpc_error");
        assert!(out.uri().query().unwrap().starts_with("chainId=5&"));
        assert!(out.body().is_empty());
        assert!(out.headers().get(header::CONTENT_LENGTH).is_none());

        let envelope = response_param(out.uri());
        assert_eq!(envelope["id"], 4);
        assert_eq!(envelope["error"]["code"], -32000);
        assert_eq!(envelope["error"]["message"], "Unsupported chain ID: 5");
        assert!(envelope.get("result").is_none());
    }

    #[test]
    fn test_unrepresentable_path_falls_back_to_bare_endpoint() {
        let target: SocketAddr = "127.0.0.1:3000".parse().unwrap();
        let payload = r#"{"id":1,"jsonrpc":"2.0","error":{"code":-32000,"message":"x"}}"#;

        let uri = redirect_uri(target, "/bad path/", Some("chainId=1"), payload).unwrap();

        assert_eq!(uri.scheme_str(), Some("http"));
        assert_eq!(uri.authority().unwrap().as_str(), "127.0.0.1:3000");
        assert_eq!(uri.path(), RPC_ERROR_PATH);
        assert!(uri.query().unwrap().starts_with("response="));
        assert_eq!(response_param(&uri)["error"]["message"], "x");
    }

    #[test]
    fn test_existing_response_param_is_replaced() {
        let query = error_query(Some("response=forged&a=1"), "{}");
        assert_eq!(query, "a=1&response=%7B%7D");
    }

    #[test]
    fn test_loopback() {
        assert_eq!(loopback("0.0.0.0:3000".parse().unwrap()), "127.0.0.1:3000".parse().unwrap());
        assert_eq!(loopback("[::]:3000".parse().unwrap()), "[::1]:3000".parse().unwrap());
        assert_eq!(loopback("10.1.2.3:3000".parse().unwrap()), "10.1.2.3:3000".parse().unwrap());
    }

    #[tokio::test]
    async fn test_echo_endpoint() {
        let app = register(Router::new().route("/{*path}", any(|| async { StatusCode::IM_A_TEAPOT })));
        let payload = r#"{"id":1,"jsonrpc":"2.0","error":{"code":-32000,"message":"method not allowed"}}"#;
        let query: String = form_urlencoded::Serializer::new(String::new())
            .append_pair(RESPONSE_PARAM, payload)
            .finish();

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/nested/path/__rpc_error?{}", query))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body, payload.as_bytes());

        // Only GET is intercepted.
        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/__rpc_error")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
    }
}
