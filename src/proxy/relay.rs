//! Relay: runs the active rewrite and sends the outbound request as issued.
//!
//! # Responsibilities
//! - Build the Forward Request Model from a buffered inbound request
//! - Apply the rewrite
//! - Send the outbound request and stream the upstream response back
//! - Map transport failures to gateway errors
//!
//! # Design Decisions
//! - No retries: a failed upstream surfaces as 502 (504 on timeout)
//! - Redirects are passed through to the caller, never followed
//! - Environment proxies are ignored so loopback traffic stays local

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::{Body, Bytes};
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::observability::metrics;
use crate::proxy::headers::strip_hop_by_hop;
use crate::proxy::request::{Inbound, ProxyRequest};
use crate::proxy::rewrite::Rewrite;

/// Default upstream connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Failures while sending the outbound request.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The rewrite left a URL the client cannot send to.
    #[error("outbound request has no absolute URL: {0}")]
    NotAbsolute(String),

    /// Connection, timeout, or protocol failure talking to the upstream.
    #[error("upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),
}

impl RelayError {
    /// Status returned to the caller for this failure.
    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::Upstream(e) if e.is_timeout() => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::BAD_GATEWAY,
        }
    }
}

/// Forwarding pipeline driven by a [`Rewrite`].
#[derive(Clone)]
pub struct Relay {
    client: reqwest::Client,
    rewrite: Arc<dyn Rewrite>,
}

impl fmt::Debug for Relay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Relay").finish_non_exhaustive()
    }
}

impl Relay {
    /// Create a relay with a client using the given connect timeout.
    pub fn new(rewrite: Arc<dyn Rewrite>, connect_timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Self::client_builder()
            .connect_timeout(connect_timeout)
            .build()?;
        Ok(Self::with_client(client, rewrite))
    }

    /// Create a relay around an existing client.
    pub fn with_client(client: reqwest::Client, rewrite: Arc<dyn Rewrite>) -> Self {
        Self { client, rewrite }
    }

    /// Client settings the relay expects: no redirects, no environment proxies.
    pub fn client_builder() -> reqwest::ClientBuilder {
        reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .no_proxy()
    }

    /// Rewrite and forward one request.
    pub async fn forward(&self, inbound: Inbound) -> Response {
        let start_time = Instant::now();
        let method = inbound.method().clone();

        let mut req = ProxyRequest::new(inbound);
        self.rewrite.rewrite(&mut req);
        let outbound = req.into_outbound();

        let upstream = outbound
            .uri()
            .authority()
            .map(|a| a.to_string())
            .unwrap_or_else(|| "none".to_string());

        tracing::debug!(
            method = %outbound.method(),
            upstream = %upstream,
            path = %outbound.uri().path(),
            "Relaying request"
        );

        match self.send(outbound).await {
            Ok(response) => {
                metrics::record_request(method.as_str(), response.status().as_u16(), &upstream, start_time);
                response
            }
            Err(e) => {
                let status = e.status();
                tracing::error!(error = %e, upstream = %upstream, "Upstream error");
                metrics::record_request(method.as_str(), status.as_u16(), &upstream, start_time);
                (status, "Upstream request failed").into_response()
            }
        }
    }

    async fn send(&self, outbound: Request<Bytes>) -> Result<Response, RelayError> {
        let (parts, body) = outbound.into_parts();

        if parts.uri.scheme().is_none() || parts.uri.authority().is_none() {
            return Err(RelayError::NotAbsolute(parts.uri.to_string()));
        }
        let url = reqwest::Url::parse(&parts.uri.to_string())
            .map_err(|_| RelayError::NotAbsolute(parts.uri.to_string()))?;

        let mut builder = self.client.request(parts.method, url).headers(parts.headers);
        if !body.is_empty() {
            builder = builder.body(body);
        }

        let upstream = builder.send().await?;

        let status = upstream.status();
        let mut headers = upstream.headers().clone();
        strip_hop_by_hop(&mut headers);

        let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}
