//! Header manipulation for forwarded requests.
//!
//! # Responsibilities
//! - Strip hop-by-hop headers in both directions
//! - Add X-Forwarded-For, X-Forwarded-Proto, X-Forwarded-Host
//! - Resolve the client IP through a per-server strategy
//!
//! # Design Decisions
//! - X-Forwarded-For extends the inbound chain rather than replacing it
//! - Inbound X-Forwarded-* never leak through unless a rewrite sets them
//! - No process-wide resolver: each rewrite owns its strategy

use std::net::IpAddr;

use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};

use crate::proxy::request::{Inbound, ProxyRequest};

pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
pub const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");
pub const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");

const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-connection",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
];

/// Remove hop-by-hop headers, including any named by `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::try_from(name.trim()).ok())
        .collect();

    for name in named {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
    headers.remove(header::UPGRADE);
}

/// Remove any `X-Forwarded-*` headers copied from the inbound request.
pub fn strip_forwarded(headers: &mut HeaderMap) {
    headers.remove(X_FORWARDED_FOR);
    headers.remove(X_FORWARDED_PROTO);
    headers.remove(X_FORWARDED_HOST);
}

/// Strategy for deciding which IP address made a request.
pub trait ClientIpResolver: Send + Sync {
    fn client_ip(&self, inbound: &Inbound) -> Option<IpAddr>;
}

impl<F> ClientIpResolver for F
where
    F: Fn(&Inbound) -> Option<IpAddr> + Send + Sync,
{
    fn client_ip(&self, inbound: &Inbound) -> Option<IpAddr> {
        self(inbound)
    }
}

/// Uses the TCP peer address.
#[derive(Debug, Clone, Copy, Default)]
pub struct PeerAddr;

impl ClientIpResolver for PeerAddr {
    fn client_ip(&self, inbound: &Inbound) -> Option<IpAddr> {
        Some(inbound.remote_addr().ip())
    }
}

/// Trusts an IP carried in a header set by a fronting proxy (e.g. `X-Real-IP`),
/// falling back to the peer address.
#[derive(Debug, Clone)]
pub struct HeaderIp {
    header: HeaderName,
}

impl HeaderIp {
    pub fn new(header: HeaderName) -> Self {
        Self { header }
    }
}

impl ClientIpResolver for HeaderIp {
    fn client_ip(&self, inbound: &Inbound) -> Option<IpAddr> {
        inbound
            .headers()
            .get(&self.header)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .and_then(|v| v.trim().parse().ok())
            .or_else(|| PeerAddr.client_ip(inbound))
    }
}

/// Set `X-Forwarded-For` and `X-Forwarded-Proto` on the outbound request.
pub fn set_forwarded_for(req: &mut ProxyRequest, resolver: &dyn ClientIpResolver) {
    let chain = resolver.client_ip(req.inbound()).and_then(|ip| {
        let prior: Vec<&str> = req
            .inbound()
            .headers()
            .get_all(X_FORWARDED_FOR)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect();
        let value = if prior.is_empty() {
            ip.to_string()
        } else {
            format!("{}, {}", prior.join(", "), ip)
        };
        HeaderValue::from_str(&value).ok()
    });

    let proto = if req.inbound().is_encrypted() { "https" } else { "http" };

    let headers = req.headers_mut();
    match chain {
        Some(value) => {
            headers.insert(X_FORWARDED_FOR, value);
        }
        None => {
            headers.remove(X_FORWARDED_FOR);
        }
    }
    headers.insert(X_FORWARDED_PROTO, HeaderValue::from_static(proto));
}

/// Set `X-Forwarded-Host` to the host a request is being sent to.
pub fn set_forwarded_host(req: &mut ProxyRequest, host: &str) {
    match HeaderValue::from_str(host) {
        Ok(value) => {
            req.headers_mut().insert(X_FORWARDED_HOST, value);
        }
        Err(_) => {
            req.headers_mut().remove(X_FORWARDED_HOST);
        }
    }
}
