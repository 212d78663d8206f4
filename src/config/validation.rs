//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses and value ranges
//! - Check scan prefixes are absolute paths
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Validation is a pure function over the parsed config

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::GatewayConfig;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Listener bind address does not parse.
    #[error("Invalid bind address '{0}'")]
    InvalidBindAddress(String),

    /// Upstream address does not parse.
    #[error("Invalid upstream address '{0}'")]
    InvalidUpstreamAddress(String),

    /// Metrics address does not parse.
    #[error("Invalid metrics address '{0}'")]
    InvalidMetricsAddress(String),

    /// Request timeout must be positive.
    #[error("Request timeout must be greater than zero")]
    ZeroRequestTimeout,

    /// Body scan limit must be positive.
    #[error("WAF max_body_bytes must be greater than zero")]
    ZeroBodyLimit,

    /// Allow-list and upload prefixes are matched against the URL path.
    #[error("{field} entry '{value}' must start with '/'")]
    RelativePrefix {
        field: &'static str,
        value: String,
    },

    /// TLS requires both a certificate and a key path.
    #[error("TLS {0} path is empty")]
    EmptyTlsPath(&'static str),
}

/// Validate a parsed configuration, collecting every problem.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(
            config.listener.bind_address.clone(),
        ));
    }
    if config.upstream.address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidUpstreamAddress(
            config.upstream.address.clone(),
        ));
    }
    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroRequestTimeout);
    }
    if config.waf.max_body_bytes == 0 {
        errors.push(ValidationError::ZeroBodyLimit);
    }

    for prefix in &config.waf.allowlist {
        if !prefix.starts_with('/') {
            errors.push(ValidationError::RelativePrefix {
                field: "waf.allowlist",
                value: prefix.clone(),
            });
        }
    }
    for prefix in &config.waf.upload_prefixes {
        if !prefix.starts_with('/') {
            errors.push(ValidationError::RelativePrefix {
                field: "waf.upload_prefixes",
                value: prefix.clone(),
            });
        }
    }

    if let Some(tls) = &config.listener.tls {
        if tls.cert_path.is_empty() {
            errors.push(ValidationError::EmptyTlsPath("certificate"));
        }
        if tls.key_path.is_empty() {
            errors.push(ValidationError::EmptyTlsPath("key"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
