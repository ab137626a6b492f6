//! The rewrite extension point.
//!
//! A rewrite receives the [`ProxyRequest`] and mutates its outbound side. It
//! returns nothing and cannot write a response: whatever `outbound` holds when
//! it returns is what the relay sends.

use crate::proxy::request::ProxyRequest;
use crate::routing::Upstream;

/// Transforms the outbound half of a proxy request.
pub trait Rewrite: Send + Sync {
    fn rewrite(&self, req: &mut ProxyRequest);
}

impl<F> Rewrite for F
where
    F: Fn(&mut ProxyRequest) + Send + Sync,
{
    fn rewrite(&self, req: &mut ProxyRequest) {
        self(req)
    }
}

/// Forwards every request to one fixed upstream.
#[derive(Debug, Clone)]
pub struct TargetRewrite {
    upstream: Upstream,
}

impl TargetRewrite {
    pub fn new(upstream: Upstream) -> Self {
        Self { upstream }
    }

    pub fn upstream(&self) -> &Upstream {
        &self.upstream
    }
}

impl Rewrite for TargetRewrite {
    fn rewrite(&self, req: &mut ProxyRequest) {
        if let Err(e) = req.set_upstream(&self.upstream) {
            // Leaves a relative URI behind, which the relay reports as 502.
            tracing::error!(error = %e, upstream = %self.upstream.url(), "Failed to build upstream URI");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::request::tests::inbound;
    use axum::http::{HeaderValue, Method};

    #[test]
    fn test_target_rewrite() {
        let rewrite = TargetRewrite::new(Upstream::parse("http://10.0.0.5:8545/rpc").unwrap());
        let mut req = ProxyRequest::new(inbound(
            Method::POST,
            "/v1/?key=abc",
            &[("host", "proxy.local")],
            "{}",
        ));

        rewrite.rewrite(&mut req);

        assert_eq!(req.outbound().uri(), "http://10.0.0.5:8545/rpc/v1?key=abc");
        assert!(req.outbound().headers().get("host").is_none());
        assert_eq!(req.outbound().body(), "{}");
    }

    #[test]
    fn test_closure_rewrite() {
        let rewrite = |req: &mut ProxyRequest| {
            req.headers_mut()
                .insert("x-api-key", HeaderValue::from_static("secret"));
        };
        let mut req = ProxyRequest::new(inbound(Method::GET, "/", &[], ""));

        Rewrite::rewrite(&rewrite, &mut req);

        assert_eq!(req.outbound().headers()["x-api-key"], "secret");
    }
}
