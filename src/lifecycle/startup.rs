//! Startup orchestration.
//!
//! # Responsibilities
//! - Re-check the configuration before acting on it
//! - Compile the chain map or single target
//! - Build the CORS policy and the server
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Binding the listener is left to the caller

use std::net::IpAddr;
use std::time::Duration;

use axum::http::{HeaderName, HeaderValue, Method};
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};

use crate::config::validation::validate_config;
use crate::config::{ChainsConfig, CorsConfig, ProxyConfig, ValidationError};
use crate::http::{BuildError, ProxyServer};
use crate::proxy::HeaderIp;
use crate::routing::{ChainIdSource, ChainMap, Upstream};
use crate::rpc::MultiChainRpc;

/// Errors turning configuration into a running server.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid configuration: {}", join(.0))]
    Invalid(Vec<ValidationError>),

    #[error("invalid CORS {field} entry '{value}'")]
    Cors { field: &'static str, value: String },

    #[error(transparent)]
    Build(#[from] BuildError),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl From<ValidationError> for StartupError {
    fn from(error: ValidationError) -> Self {
        StartupError::Invalid(vec![error])
    }
}

/// Build a server from configuration.
pub fn build_server(config: &ProxyConfig) -> Result<ProxyServer, StartupError> {
    validate_config(config).map_err(StartupError::Invalid)?;

    let bind_host: IpAddr = config
        .listener
        .bind_host
        .parse()
        .map_err(|_| ValidationError::InvalidBindHost(config.listener.bind_host.clone()))?;

    let mut builder = ProxyServer::builder()
        .bind_host(bind_host)
        .port(config.listener.port)
        .connect_timeout(Duration::from_secs(config.timeouts.connect_secs))
        .request_timeout(Duration::from_secs(config.timeouts.request_secs))
        .max_body_bytes(config.listener.max_body_bytes);

    if let Some(target) = &config.forwarding.target {
        let upstream = Upstream::parse(target).map_err(ValidationError::from)?;
        tracing::info!(target = %upstream.url(), "Forwarding to single target");
        builder = builder.target(upstream);
    }

    if let Some(chains) = &config.forwarding.chains {
        builder = builder.chain_rpc(multichain(chains)?);
    }

    if let Some(cors) = &config.cors {
        builder = builder.cors(cors_layer(cors)?);
    }

    Ok(builder.build()?)
}

fn multichain(config: &ChainsConfig) -> Result<MultiChainRpc, StartupError> {
    let mut entries = Vec::with_capacity(config.endpoints.len());
    for (key, url) in &config.endpoints {
        let chain_id: i64 = key
            .trim()
            .parse()
            .map_err(|_| ValidationError::InvalidChainId(key.clone()))?;
        entries.push((chain_id, url.as_str()));
    }
    let chains = ChainMap::from_urls(entries).map_err(ValidationError::from)?;

    let source = match &config.query_param {
        Some(param) => ChainIdSource::Query(param.trim().to_string()),
        None => ChainIdSource::Body,
    };

    tracing::info!(
        chains = ?chains.chain_ids().iter().map(|id| id.0).collect::<Vec<_>>(),
        source = ?source,
        "Multi-chain RPC routing enabled"
    );

    let mut rpc = MultiChainRpc::with_source(chains, source);
    if let Some(header) = &config.client_ip_header {
        let name = HeaderName::try_from(header.as_str())
            .map_err(|_| ValidationError::InvalidHeaderName(header.clone()))?;
        rpc = rpc.with_client_ip_resolver(HeaderIp::new(name));
    }
    Ok(rpc)
}

fn cors_layer(config: &CorsConfig) -> Result<CorsLayer, StartupError> {
    let mut layer = CorsLayer::new();

    layer = if config.allowed_origins.iter().any(|o| o == "*") {
        layer.allow_origin(Any)
    } else {
        let origins = config
            .allowed_origins
            .iter()
            .map(|o| {
                HeaderValue::from_str(o).map_err(|_| StartupError::Cors {
                    field: "allowed_origins",
                    value: o.clone(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        layer.allow_origin(origins)
    };

    layer = if config.allowed_methods.is_empty() {
        layer.allow_methods(Any)
    } else {
        let methods = config
            .allowed_methods
            .iter()
            .map(|m| {
                Method::from_bytes(m.to_ascii_uppercase().as_bytes()).map_err(|_| {
                    StartupError::Cors {
                        field: "allowed_methods",
                        value: m.clone(),
                    }
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        layer.allow_methods(methods)
    };

    layer = if config.allowed_headers.is_empty() {
        layer.allow_headers(Any)
    } else {
        let headers = config
            .allowed_headers
            .iter()
            .map(|h| {
                HeaderName::try_from(h.as_str()).map_err(|_| StartupError::Cors {
                    field: "allowed_headers",
                    value: h.clone(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        layer.allow_headers(headers)
    };

    if let Some(secs) = config.max_age_secs {
        layer = layer.max_age(Duration::from_secs(secs));
    }

    Ok(layer)
}
