//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Exactly one forwarding strategy is configured
//! - Upstream URLs are absolute http(s) URLs and chain keys are integers
//! - Validate value ranges (timeouts > 0, body limit > 0)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::{IpAddr, SocketAddr};

use thiserror::Error;

use crate::config::schema::ProxyConfig;
use crate::routing::{Upstream, UpstreamError};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("no forwarding strategy configured (set forwarding.target or forwarding.chains)")]
    MissingForwarding,

    #[error("forwarding.target and forwarding.chains are mutually exclusive")]
    ConflictingForwarding,

    #[error(transparent)]
    InvalidUpstream(#[from] UpstreamError),

    #[error("chain key '{0}' is not an integer")]
    InvalidChainId(String),

    #[error("forwarding.chains.query_param must not be empty")]
    EmptyQueryParam,

    #[error("invalid header name '{0}' in forwarding.chains.client_ip_header")]
    InvalidHeaderName(String),

    #[error("invalid listener.bind_host '{0}'")]
    InvalidBindHost(String),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("invalid observability.metrics_address '{0}'")]
    InvalidMetricsAddress(String),
}

/// Validate a parsed configuration, collecting every violation.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let forwarding = &config.forwarding;
    match (&forwarding.target, &forwarding.chains) {
        (None, None) => errors.push(ValidationError::MissingForwarding),
        (Some(_), Some(_)) => errors.push(ValidationError::ConflictingForwarding),
        _ => {}
    }

    if let Some(target) = &forwarding.target {
        check_upstream(target, &mut errors);
    }

    if let Some(chains) = &forwarding.chains {
        for (key, url) in &chains.endpoints {
            if key.trim().parse::<i64>().is_err() {
                errors.push(ValidationError::InvalidChainId(key.clone()));
            }
            check_upstream(url, &mut errors);
        }

        if let Some(param) = &chains.query_param {
            if param.trim().is_empty() {
                errors.push(ValidationError::EmptyQueryParam);
            }
        }

        if let Some(header) = &chains.client_ip_header {
            if axum::http::HeaderName::try_from(header.as_str()).is_err() {
                errors.push(ValidationError::InvalidHeaderName(header.clone()));
            }
        }
    }

    if config.listener.bind_host.parse::<IpAddr>().is_err() {
        errors.push(ValidationError::InvalidBindHost(config.listener.bind_host.clone()));
    }
    if config.listener.max_body_bytes == 0 {
        errors.push(ValidationError::Zero("listener.max_body_bytes"));
    }
    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::Zero("timeouts.connect_secs"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::Zero("timeouts.request_secs"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_upstream(url: &str, errors: &mut Vec<ValidationError>) {
    if let Err(e) = Upstream::parse(url) {
        errors.push(e.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::ChainsConfig;

    fn chain_config(endpoints: &[(&str, &str)]) -> ProxyConfig {
        let mut config = ProxyConfig::default();
        config.forwarding.chains = Some(ChainsConfig {
            endpoints: endpoints
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            ..Default::default()
        });
        config
    }

    #[test]
    fn test_default_config_has_no_strategy() {
        let errors = validate_config(&ProxyConfig::default()).unwrap_err();
        assert_eq!(errors, vec![ValidationError::MissingForwarding]);
    }

    #[test]
    fn test_conflicting_strategies() {
        let mut config = chain_config(&[("1", "https://rpc.ankr.com/eth")]);
        config.forwarding.target = Some("https://example.com".into());
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::ConflictingForwarding));
    }

    #[test]
    fn test_valid_chain_config() {
        let config = chain_config(&[
            ("1", "https://rpc.ankr.com/eth"),
            ("43114", "https://api.avax.network/ext/bc/C/rpc"),
        ]);
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = chain_config(&[("mainnet", "not a url"), ("5", "ftp://files.example.com")]);
        config.timeouts.request_secs = 0;

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::InvalidChainId("mainnet".into())));
        assert!(errors.contains(&ValidationError::Zero("timeouts.request_secs")));
        let invalid_urls = errors
            .iter()
            .filter(|e| matches!(e, ValidationError::InvalidUpstream(_)))
            .count();
        assert_eq!(invalid_urls, 2);
    }

    #[test]
    fn test_empty_query_param() {
        let mut config = chain_config(&[("1", "https://rpc.ankr.com/eth")]);
        if let Some(chains) = config.forwarding.chains.as_mut() {
            chains.query_param = Some("  ".into());
        }
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors, vec![ValidationError::EmptyQueryParam]);
    }

    #[test]
    fn test_signed_chain_keys() {
        let config = chain_config(&[("-1", "http://127.0.0.1:8545"), (" 1 ", "https://rpc.ankr.com/eth")]);
        assert!(validate_config(&config).is_ok());

        let config = chain_config(&[("1.5", "https://rpc.ankr.com/eth")]);
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors, vec![ValidationError::InvalidChainId("1.5".into())]);
    }
}
