//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Validate that exactly one forwarding strategy is configured
//! - Create Axum Router with the catch-all relay handler
//! - Register auxiliary routes ahead of the catch-all
//! - Wire up middleware (request ID, tracing, panic recovery, CORS, timeout)
//! - Bind server to listener and shut down gracefully

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use thiserror::Error;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer, cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer,
};

use crate::http::request::{propagate_request_id_layer, request_id, set_request_id_layer};
use crate::lifecycle::ShutdownListener;
use crate::proxy::relay::DEFAULT_CONNECT_TIMEOUT;
use crate::proxy::{Connection, Inbound, Relay, Rewrite, TargetRewrite};
use crate::routing::Upstream;
use crate::rpc::{error_channel, MultiChainRpc};

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Errors detected while assembling a server.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("missing configuration for reverse proxy: set a target, a rewrite or a relay")]
    MissingForwarding,

    #[error("conflicting forwarding strategies configured: {0}")]
    ConflictingForwarding(String),

    #[error("failed to build upstream client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Builder for [`ProxyServer`].
pub struct ServerBuilder {
    bind_host: IpAddr,
    port: u16,
    target: Option<Upstream>,
    rewrite: Option<Arc<dyn Rewrite>>,
    relay: Option<Relay>,
    rpc_error_echo: bool,
    routes: Router,
    cors: Option<CorsLayer>,
    connect_timeout: Duration,
    request_timeout: Duration,
    max_body_bytes: usize,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self {
            bind_host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            target: None,
            rewrite: None,
            relay: None,
            rpc_error_echo: false,
            routes: Router::new(),
            cors: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forward everything to a single fixed upstream.
    pub fn target(mut self, upstream: Upstream) -> Self {
        self.target = Some(upstream);
        self
    }

    /// Forward through a custom rewrite.
    pub fn rewrite(mut self, rewrite: impl Rewrite + 'static) -> Self {
        self.rewrite = Some(Arc::new(rewrite));
        self
    }

    /// Forward through a pre-built relay.
    pub fn relay(mut self, relay: Relay) -> Self {
        self.relay = Some(relay);
        self
    }

    /// Route JSON-RPC by chain ID and serve its error echo endpoint.
    pub fn chain_rpc(self, rpc: MultiChainRpc) -> Self {
        self.rewrite(rpc).rpc_error_echo()
    }

    /// Serve the `…/__rpc_error` echo endpoint.
    pub fn rpc_error_echo(mut self) -> Self {
        self.rpc_error_echo = true;
        self
    }

    pub fn bind_host(mut self, host: IpAddr) -> Self {
        self.bind_host = host;
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Apply a CORS policy in front of every route.
    pub fn cors(mut self, cors: CorsLayer) -> Self {
        self.cors = Some(cors);
        self
    }

    /// Extra routes, matched before the catch-all relay.
    ///
    /// Must not define `/` or `/{*path}`.
    pub fn routes(mut self, routes: Router) -> Self {
        self.routes = self.routes.merge(routes);
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }

    /// Validate the forwarding strategy and produce the server.
    pub fn build(self) -> Result<ProxyServer, BuildError> {
        let relay = match (self.target, self.rewrite, self.relay) {
            (Some(target), None, None) => {
                Relay::new(Arc::new(TargetRewrite::new(target)), self.connect_timeout)?
            }
            (None, Some(rewrite), None) => Relay::new(rewrite, self.connect_timeout)?,
            (None, None, Some(relay)) => relay,
            (None, None, None) => return Err(BuildError::MissingForwarding),
            (target, rewrite, relay) => {
                let configured: Vec<&str> = [
                    target.is_some().then_some("target"),
                    rewrite.is_some().then_some("rewrite"),
                    relay.is_some().then_some("relay"),
                ]
                .into_iter()
                .flatten()
                .collect();
                return Err(BuildError::ConflictingForwarding(configured.join(", ")));
            }
        };

        Ok(ProxyServer {
            addr: SocketAddr::new(self.bind_host, self.port),
            relay,
            rpc_error_echo: self.rpc_error_echo,
            routes: self.routes,
            cors: self.cors,
            request_timeout: self.request_timeout,
            max_body_bytes: self.max_body_bytes,
        })
    }
}

/// State injected into the relay handler.
#[derive(Clone)]
struct ServeState {
    relay: Relay,
    local_addr: SocketAddr,
    max_body_bytes: usize,
}

/// The reverse proxy server.
pub struct ProxyServer {
    addr: SocketAddr,
    relay: Relay,
    rpc_error_echo: bool,
    routes: Router,
    cors: Option<CorsLayer>,
    request_timeout: Duration,
    max_body_bytes: usize,
}

impl ProxyServer {
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Configured bind address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Bind a listener on the configured address.
    pub async fn bind(&self) -> io::Result<TcpListener> {
        TcpListener::bind(self.addr).await
    }

    /// Build the Axum router for a listener bound at `local_addr`.
    #[allow(deprecated)]
    pub fn router(&self, local_addr: SocketAddr) -> Router {
        let state = ServeState {
            relay: self.relay.clone(),
            local_addr,
            max_body_bytes: self.max_body_bytes,
        };

        let mut router = Router::new()
            .route("/{*path}", any(relay_handler))
            .route("/", any(relay_handler))
            .with_state(state)
            .merge(self.routes.clone());

        if let Some(cors) = &self.cors {
            router = router.layer(cors.clone());
        }

        // Outside CORS: echo replies reach the client through the relay,
        // which already sits behind the CORS layer.
        if self.rpc_error_echo {
            router = error_channel::register(router);
        }

        router.layer(
            ServiceBuilder::new()
                .layer(set_request_id_layer())
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(propagate_request_id_layer())
                .layer(CatchPanicLayer::new())
                .layer(TimeoutLayer::new(self.request_timeout)),
        )
    }

    /// Run the server, accepting connections on the given listener until
    /// `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: ShutdownListener,
    ) -> Result<(), io::Error> {
        let local_addr = listener.local_addr()?;
        tracing::info!(address = %local_addr, "Proxy server starting");

        let app = self
            .router(local_addr)
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown.wait().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("Proxy server stopped");
        Ok(())
    }
}

fn make_span(request: &Request<Body>) -> tracing::Span {
    tracing::info_span!(
        "request",
        method = %request.method(),
        uri = %request.uri().path(),
        request_id = request_id(request).unwrap_or("unknown"),
    )
}

/// Catch-all handler: buffer the body, then hand the request to the relay.
async fn relay_handler(
    State(state): State<ServeState>,
    ConnectInfo(remote_addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let (parts, body) = request.into_parts();

    let body = match axum::body::to_bytes(body, state.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(error = %e, limit = state.max_body_bytes, "Failed to buffer request body");
            return (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large").into_response();
        }
    };

    let inbound = Inbound::new(
        parts,
        body,
        Connection {
            remote_addr,
            local_addr: state.local_addr,
            encrypted: false,
        },
    );

    state.relay.forward(inbound).await
}
