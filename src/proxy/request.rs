//! The in-flight proxy operation: a read-only inbound request and the
//! outbound request being built from it.
//!
//! # Design Decisions
//! - `Inbound` has no mutators; rewrites only ever see `&Inbound`
//! - The outbound body is buffered, so `Content-Length` is always recomputable
//! - Body and `Content-Length` change together through `set_body`/`clear_body`

use std::net::SocketAddr;

use axum::body::Bytes;
use axum::http::header::{self, HeaderMap, HeaderValue};
use axum::http::request::Parts;
use axum::http::uri::InvalidUri;
use axum::http::{Method, Request, Uri, Version};
use url::Url;

use crate::proxy::headers::{strip_forwarded, strip_hop_by_hop};
use crate::routing::Upstream;

/// Request extension marking a request that arrived over TLS.
///
/// Inserted by whatever terminates TLS in front of the relay.
#[derive(Debug, Clone, Copy)]
pub struct Encrypted;

/// Transport facts about the inbound connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connection {
    /// Peer address of the client.
    pub remote_addr: SocketAddr,
    /// Address of the listener that accepted the request.
    pub local_addr: SocketAddr,
    /// Whether the connection was encrypted.
    pub encrypted: bool,
}

/// Read-only view of the request as received.
#[derive(Debug, Clone)]
pub struct Inbound {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    body: Bytes,
    connection: Connection,
}

impl Inbound {
    pub fn new(parts: Parts, body: Bytes, mut connection: Connection) -> Self {
        connection.encrypted |= parts.extensions.get::<Encrypted>().is_some();
        Self {
            method: parts.method,
            uri: parts.uri,
            version: parts.version,
            headers: parts.headers,
            body,
            connection,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.connection.remote_addr
    }

    pub fn is_encrypted(&self) -> bool {
        self.connection.encrypted
    }

    /// `Host` header, falling back to the URI authority.
    pub fn host(&self) -> Option<&str> {
        self.headers
            .get(header::HOST)
            .and_then(|h| h.to_str().ok())
            .or_else(|| self.uri.authority().map(|a| a.as_str()))
    }

    /// First value of a query parameter, percent-decoded.
    pub fn query_param(&self, name: &str) -> Option<String> {
        let query = self.uri.query()?;
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }
}

/// Forward Request Model handed to a [`Rewrite`](crate::proxy::Rewrite).
#[derive(Debug)]
pub struct ProxyRequest {
    inbound: Inbound,
    outbound: Request<Bytes>,
}

impl ProxyRequest {
    /// Start the outbound request as a structural copy of the inbound one,
    /// minus hop-by-hop and `X-Forwarded-*` headers.
    pub fn new(inbound: Inbound) -> Self {
        let mut headers = inbound.headers.clone();
        strip_hop_by_hop(&mut headers);
        strip_forwarded(&mut headers);
        if !inbound.body.is_empty() {
            headers.insert(header::CONTENT_LENGTH, HeaderValue::from(inbound.body.len()));
        }

        let mut outbound = Request::new(inbound.body.clone());
        *outbound.method_mut() = inbound.method.clone();
        *outbound.uri_mut() = inbound.uri.clone();
        *outbound.headers_mut() = headers;

        Self { inbound, outbound }
    }

    pub fn inbound(&self) -> &Inbound {
        &self.inbound
    }

    pub fn outbound(&self) -> &Request<Bytes> {
        &self.outbound
    }

    /// Raw access for custom rewrites. Callers own the body/length invariant.
    pub fn outbound_mut(&mut self) -> &mut Request<Bytes> {
        &mut self.outbound
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        self.outbound.headers_mut()
    }

    pub fn set_method(&mut self, method: Method) {
        *self.outbound.method_mut() = method;
    }

    /// Point the outbound request at an absolute URL. The inbound `Host` is
    /// dropped so the target's host is sent instead.
    pub fn set_url(&mut self, url: &Url) -> Result<(), InvalidUri> {
        let uri: Uri = url.as_str().parse()?;
        *self.outbound.uri_mut() = uri;
        self.outbound.headers_mut().remove(header::HOST);
        Ok(())
    }

    /// Target an upstream, joining its base path with the inbound path.
    pub fn set_upstream(&mut self, upstream: &Upstream) -> Result<(), InvalidUri> {
        let url = upstream.resolve(self.inbound.path(), self.inbound.uri.query());
        self.set_url(&url)
    }

    /// Replace the body and recompute `Content-Length`.
    pub fn set_body(&mut self, body: Bytes) {
        let headers = self.outbound.headers_mut();
        headers.remove(header::TRANSFER_ENCODING);
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(body.len()));
        *self.outbound.body_mut() = body;
    }

    /// Drop the body and its `Content-Length`.
    pub fn clear_body(&mut self) {
        let headers = self.outbound.headers_mut();
        headers.remove(header::CONTENT_LENGTH);
        headers.remove(header::TRANSFER_ENCODING);
        *self.outbound.body_mut() = Bytes::new();
    }

    pub fn into_outbound(self) -> Request<Bytes> {
        self.outbound
    }
}
