//! Chain resolution for JSON-RPC requests.
//!
//! # Responsibilities
//! - Reject requests that cannot carry an RPC payload
//! - Decode the envelope from the inbound body
//! - Pick the chain ID from the body or a query parameter
//! - Return the upstream, or a failure describing why there is none
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - Failures are values carrying the best known request id
//! - A missing or non-numeric query parameter means chain 0

use axum::http::{header, Method};
use thiserror::Error;

use crate::proxy::Inbound;
use crate::routing::chain_map::{ChainId, ChainMap, Upstream};
use crate::rpc::types::{recover_id, RpcRequest};

/// Where the chain ID is read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainIdSource {
    /// The envelope's `chainId` field.
    Body,
    /// A query parameter of the inbound URL.
    Query(String),
}

/// Why a request could not be routed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RoutingError {
    #[error("method not allowed")]
    MethodNotAllowed,

    #[error("unable to automatically decode the request content type")]
    UnsupportedContentType,

    #[error("{0}")]
    MalformedEnvelope(String),

    #[error("Unsupported chain ID: {0}")]
    UnsupportedChain(ChainId),
}

impl RoutingError {
    /// Short label for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            RoutingError::MethodNotAllowed => "method_not_allowed",
            RoutingError::UnsupportedContentType => "content_type",
            RoutingError::MalformedEnvelope(_) => "malformed",
            RoutingError::UnsupportedChain(_) => "unsupported_chain",
        }
    }
}

/// A routing failure and the request id to answer it with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingFailure {
    pub id: i64,
    pub error: RoutingError,
}

impl RoutingFailure {
    fn new(id: i64, error: RoutingError) -> Self {
        Self { id, error }
    }
}

/// A successfully resolved request.
#[derive(Debug)]
pub struct Route<'a> {
    pub chain_id: ChainId,
    pub upstream: &'a Upstream,
    pub envelope: RpcRequest,
}

/// Resolves inbound requests to upstreams.
#[derive(Debug, Clone)]
pub struct ChainRouter {
    chains: ChainMap,
    source: ChainIdSource,
}

impl ChainRouter {
    pub fn new(chains: ChainMap, source: ChainIdSource) -> Self {
        Self { chains, source }
    }

    pub fn chains(&self) -> &ChainMap {
        &self.chains
    }

    pub fn source(&self) -> &ChainIdSource {
        &self.source
    }

    /// Resolve the upstream for a request.
    pub fn resolve(&self, inbound: &Inbound) -> Result<Route<'_>, RoutingFailure> {
        if inbound.method() != Method::POST {
            return Err(RoutingFailure::new(0, RoutingError::MethodNotAllowed));
        }

        if !is_json(inbound) {
            return Err(RoutingFailure::new(0, RoutingError::UnsupportedContentType));
        }

        let envelope = RpcRequest::decode(inbound.body()).map_err(|e| {
            RoutingFailure::new(
                recover_id(inbound.body()),
                RoutingError::MalformedEnvelope(e.to_string()),
            )
        })?;

        let chain_id = match &self.source {
            ChainIdSource::Body => ChainId(envelope.chain_id.unwrap_or_default()),
            ChainIdSource::Query(name) => ChainId(
                inbound
                    .query_param(name)
                    .and_then(|v| v.trim().parse().ok())
                    .unwrap_or_default(),
            ),
        };

        match self.chains.get(chain_id) {
            Some(upstream) => Ok(Route {
                chain_id,
                upstream,
                envelope,
            }),
            None => Err(RoutingFailure::new(
                envelope.id,
                RoutingError::UnsupportedChain(chain_id),
            )),
        }
    }
}

fn is_json(inbound: &Inbound) -> bool {
    let Some(content_type) = inbound
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
    else {
        return false;
    };

    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    matches!(mime.as_str(), "application/json" | "text/javascript")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::request::tests::inbound;

    const JSON: (&str, &str) = ("content-type", "application/json");

    fn router(source: ChainIdSource) -> ChainRouter {
        let chains = ChainMap::from_urls([
            (1, "https://rpc.ankr.com/eth"),
            (43114, "https://api.avax.network/ext/bc/C/rpc"),
        ])
        .unwrap();
        ChainRouter::new(chains, source)
    }

    #[test]
    fn test_body_routing() {
        let router = router(ChainIdSource::Body);
        let req = inbound(
            Method::POST,
            "/",
            &[JSON],
            r#"{"id":7,"jsonrpc":"2.0","method":"eth_chainId","chainId":43114}"#,
        );

        let route = router.resolve(&req).unwrap();
        assert_eq!(route.chain_id, ChainId(43114));
        assert_eq!(route.upstream.authority(), "api.avax.network");
        assert_eq!(route.envelope.id, 7);
    }

    #[test]
    fn test_method_not_allowed() {
        let router = router(ChainIdSource::Body);
        let req = inbound(Method::GET, "/", &[JSON], r#"{"id":7,"chainId":1}"#);

        let failure = router.resolve(&req).unwrap_err();
        assert_eq!(failure.id, 0);
        assert_eq!(failure.error, RoutingError::MethodNotAllowed);
        assert_eq!(failure.error.to_string(), "method not allowed");
    }

    #[test]
    fn test_unsupported_chain() {
        let router = router(ChainIdSource::Body);
        let req = inbound(Method::POST, "/", &[JSON], r#"{"id":9,"method":"eth_chainId","chainId":56}"#);

        let failure = router.resolve(&req).unwrap_err();
        assert_eq!(failure.id, 9);
        assert_eq!(failure.error.to_string(), "Unsupported chain ID: 56");
    }

    #[test]
    fn test_missing_chain_id_is_zero() {
        let router = router(ChainIdSource::Body);
        let req = inbound(Method::POST, "/", &[JSON], r#"{"id":1,"method":"eth_chainId"}"#);

        let failure = router.resolve(&req).unwrap_err();
        assert_eq!(failure.error, RoutingError::UnsupportedChain(ChainId(0)));
    }

    #[test]
    fn test_malformed_envelope_recovers_id() {
        let router = router(ChainIdSource::Body);
        let req = inbound(Method::POST, "/", &[JSON], r#"{"id":12,"params":"oops"}"#);

        let failure = router.resolve(&req).unwrap_err();
        assert_eq!(failure.id, 12);
        assert!(matches!(failure.error, RoutingError::MalformedEnvelope(_)));
    }

    #[test]
    fn test_wrong_content_type() {
        let router = router(ChainIdSource::Body);
        let req = inbound(
            Method::POST,
            "/",
            &[("content-type", "text/plain")],
            r#"{"id":1,"chainId":1}"#,
        );
        let failure = router.resolve(&req).unwrap_err();
        assert_eq!(failure.error, RoutingError::UnsupportedContentType);

        assert_eq!(failure.error.to_string(), "unable to automatically decode the request content type");

        let req = inbound(Method::POST, "/", &[], r#"{"id":1,"chainId":1}"#);
        assert!(router.resolve(&req).is_err());

        let req = inbound(
            Method::POST,
            "/",
            &[("content-type", "application/vnd.api+json")],
            r#"{"id":1,"chainId":1}"#,
        );
        assert_eq!(router.resolve(&req).unwrap_err().error, RoutingError::UnsupportedContentType);

        let req = inbound(
            Method::POST,
            "/",
            &[("content-type", "text/javascript")],
            r#"{"id":1,"chainId":1}"#,
        );
        assert!(router.resolve(&req).is_ok());

        let req = inbound(
            Method::POST,
            "/",
            &[("content-type", "application/json; charset=utf-8")],
            r#"{"id":1,"chainId":1}"#,
        );
        assert!(router.resolve(&req).is_ok());
    }

    #[test]
    fn test_query_routing_ignores_body() {
        let router = router(ChainIdSource::Query("chainId".into()));
        let req = inbound(
            Method::POST,
            "/?chainId=1",
            &[JSON],
            r#"{"id":3,"method":"eth_chainId","chainId":43114}"#,
        );

        let route = router.resolve(&req).unwrap();
        assert_eq!(route.chain_id, ChainId(1));
    }

    #[test]
    fn test_query_fallback_to_zero() {
        let router = router(ChainIdSource::Query("chainId".into()));

        for uri in ["/", "/?chainId=abc", "/?chainId=1.5", "/?other=1"] {
            let req = inbound(Method::POST, uri, &[JSON], r#"{"id":3,"method":"eth_chainId"}"#);
            let failure = router.resolve(&req).unwrap_err();
            assert_eq!(failure.error, RoutingError::UnsupportedChain(ChainId(0)), "{}", uri);
        }
    }

    #[test]
    fn test_negative_chain_id_is_unsupported() {
        let by_query = router(ChainIdSource::Query("chainId".into()));
        let req = inbound(Method::POST, "/?chainId=-1", &[JSON], r#"{"id":3,"method":"eth_chainId"}"#);
        let failure = by_query.resolve(&req).unwrap_err();
        assert_eq!(failure.id, 3);
        assert_eq!(failure.error, RoutingError::UnsupportedChain(ChainId(-1)));

        let by_body = router(ChainIdSource::Body);
        let req = inbound(Method::POST, "/", &[JSON], r#"{"id":4,"method":"eth_chainId","chainId":-1}"#);
        let failure = by_body.resolve(&req).unwrap_err();
        assert_eq!(failure.id, 4);
        assert_eq!(failure.error.to_string(), "Unsupported chain ID: -1");
    }
}
