//! Multi-chain JSON-RPC rewrite.
//!
//! # Responsibilities
//! - Resolve the upstream for each request by chain ID
//! - Strip the `chainId` routing hint and re-encode the envelope
//! - Set `Content-Length`, `X-Forwarded-*` and the upstream URL
//! - Send routing failures through the error redirection channel
//!
//! # Design Decisions
//! - Never leaves the outbound request half-rewritten: every failure path
//!   ends in a full redirect
//! - The client-IP strategy belongs to the instance, not the process

use std::fmt;
use std::sync::Arc;

use axum::body::Bytes;

use crate::observability::metrics;
use crate::proxy::headers::{set_forwarded_for, set_forwarded_host};
use crate::proxy::{ClientIpResolver, PeerAddr, ProxyRequest, Rewrite};
use crate::routing::{ChainIdSource, ChainMap, ChainRouter, Route};
use crate::rpc::error_channel::redirect_to_rpc_error;

/// Rewrite routing JSON-RPC requests to per-chain upstreams.
#[derive(Clone)]
pub struct MultiChainRpc {
    router: ChainRouter,
    client_ip: Arc<dyn ClientIpResolver>,
}

impl fmt::Debug for MultiChainRpc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiChainRpc")
            .field("router", &self.router)
            .finish_non_exhaustive()
    }
}

impl MultiChainRpc {
    /// Route by the envelope's `chainId` field.
    pub fn new(chains: ChainMap) -> Self {
        Self::with_source(chains, ChainIdSource::Body)
    }

    /// Route by the given chain ID source.
    pub fn with_source(chains: ChainMap, source: ChainIdSource) -> Self {
        Self {
            router: ChainRouter::new(chains, source),
            client_ip: Arc::new(PeerAddr),
        }
    }

    /// Replace the client-IP strategy used for `X-Forwarded-For`.
    pub fn with_client_ip_resolver(mut self, resolver: impl ClientIpResolver + 'static) -> Self {
        self.client_ip = Arc::new(resolver);
        self
    }

    pub fn router(&self) -> &ChainRouter {
        &self.router
    }
}

impl Rewrite for MultiChainRpc {
    fn rewrite(&self, req: &mut ProxyRequest) {
        let Route {
            chain_id,
            upstream,
            mut envelope,
        } = match self.router.resolve(req.inbound()) {
            Ok(route) => route,
            Err(failure) => {
                tracing::debug!(
                    id = failure.id,
                    error = %failure.error,
                    "RPC routing failed"
                );
                metrics::record_routing_failure(failure.error.reason());
                redirect_to_rpc_error(req, failure.id, &failure.error.to_string());
                return;
            }
        };

        envelope.chain_id = None;
        let body = match envelope.encode() {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(error = %e, "Failed to re-encode RPC envelope");
                redirect_to_rpc_error(req, envelope.id, &e.to_string());
                return;
            }
        };

        if let Err(e) = req.set_upstream(upstream) {
            tracing::error!(error = %e, chain_id = %chain_id, "Failed to build upstream URI");
            redirect_to_rpc_error(req, envelope.id, "invalid upstream URL");
            return;
        }

        req.set_body(Bytes::from(body));
        set_forwarded_for(req, self.client_ip.as_ref());
        set_forwarded_host(req, &upstream.authority());

        tracing::debug!(
            chain_id = %chain_id,
            rpc_method = %envelope.method,
            upstream = %upstream.authority(),
            "Routed RPC request"
        );
    }
}
