//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check that the bind address agrees with the network family
//! - Validate value ranges (timeouts and intervals > 0)
//! - Check backend and format names
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::ProxyConfig;
use crate::net::listener::parse_bind_address;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Check every semantic constraint and collect all failures.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let listener = &config.listener;
    if let Err(message) = parse_bind_address(&listener.network, &listener.bind_address) {
        errors.push(ValidationError::new("listener.bind_address", message));
    }

    if config.dns.cache_ttl_secs == 0 {
        errors.push(ValidationError::new("dns.cache_ttl_secs", "must be greater than 0"));
    }
    if config.dns.sweep_interval_secs == 0 {
        errors.push(ValidationError::new("dns.sweep_interval_secs", "must be greater than 0"));
    }

    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::new("timeouts.connect_secs", "must be greater than 0"));
    }
    if config.timeouts.idle_secs == 0 {
        errors.push(ValidationError::new("timeouts.idle_secs", "must be greater than 0"));
    }

    let observability = &config.observability;
    match observability.metrics_backend.as_str() {
        "prometheus" => {
            if observability.metrics_address.parse::<SocketAddr>().is_err() {
                errors.push(ValidationError::new(
                    "observability.metrics_address",
                    format!("invalid socket address {:?}", observability.metrics_address),
                ));
            }
        }
        "none" => {}
        other => errors.push(ValidationError::new(
            "observability.metrics_backend",
            format!("unknown backend {other:?}, expected \"prometheus\" or \"none\""),
        )),
    }

    if !matches!(observability.log_format.as_str(), "pretty" | "json") {
        errors.push(ValidationError::new(
            "observability.log_format",
            format!("unknown format {:?}, expected \"pretty\" or \"json\"", observability.log_format),
        ));
    }
    if observability.monitor_interval_secs == 0 {
        errors.push(ValidationError::new(
            "observability.monitor_interval_secs",
            "must be greater than 0",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(validate_config(&ProxyConfig::default()).is_ok());
    }

    #[test]
    fn reports_every_error() {
        let mut config = ProxyConfig::default();
        config.listener.network = "udp".into();
        config.dns.cache_ttl_secs = 0;
        config.observability.metrics_backend = "statsd".into();

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            ["listener.bind_address", "dns.cache_ttl_secs", "observability.metrics_backend"]
        );
    }

    #[test]
    fn family_must_match_network() {
        let mut config = ProxyConfig::default();
        config.listener.network = "tcp6".into();
        config.listener.bind_address = "127.0.0.1:1080".into();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "listener.bind_address");
    }

    #[test]
    fn metrics_address_ignored_when_disabled() {
        let mut config = ProxyConfig::default();
        config.observability.metrics_backend = "none".into();
        config.observability.metrics_address = "not an address".into();

        assert!(validate_config(&config).is_ok());
    }
}
