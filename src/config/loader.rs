//! Configuration loading from disk and the environment.

use std::fs;
use std::net::IpAddr;
use std::path::Path;

use crate::config::schema::ProxyConfig;
use crate::config::validation::ValidationError;

/// Environment variable that restricts clients to a single source address.
pub const ALLOWED_IP_ENV: &str = "ALLOWED_IP";

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Env { name: &'static str, value: String },
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Env { name, value } => write!(f, "Invalid {}: {:?}", name, value),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Parse a TOML document. Missing sections fall back to defaults.
pub fn parse_config(content: &str) -> Result<ProxyConfig, ConfigError> {
    toml::from_str(content).map_err(ConfigError::Parse)
}

/// Read a TOML file without validating it.
pub fn read_config(path: &Path) -> Result<ProxyConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    parse_config(&content)
}

/// Apply an `ALLOWED_IP`-style override. Empty values are ignored.
pub fn apply_allowed_ip(config: &mut ProxyConfig, value: Option<String>) -> Result<(), ConfigError> {
    let Some(value) = value.filter(|v| !v.trim().is_empty()) else {
        return Ok(());
    };

    let ip: IpAddr = value.trim().parse().map_err(|_| ConfigError::Env {
        name: ALLOWED_IP_ENV,
        value: value.clone(),
    })?;
    config.listener.allowed_ip = Some(ip);
    Ok(())
}

/// Apply overrides from the process environment.
pub fn apply_env_overrides(config: &mut ProxyConfig) -> Result<(), ConfigError> {
    apply_allowed_ip(config, std::env::var(ALLOWED_IP_ENV).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let config = parse_config(
            r#"
            [listener]
            bind_address = "127.0.0.1:1080"
            allowed_ip = "10.0.0.5"

            [dns]
            cache_ttl_secs = 30
            "#,
        )
        .unwrap();

        assert_eq!(config.listener.bind_address, "127.0.0.1:1080");
        assert_eq!(config.listener.network, "tcp");
        assert_eq!(config.listener.allowed_ip, Some("10.0.0.5".parse().unwrap()));
        assert_eq!(config.dns.cache_ttl_secs, 30);
        assert_eq!(config.dns.sweep_interval_secs, 60);
        assert_eq!(config.timeouts.connect_secs, 10);
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let err = parse_config("[listener\nbind_address = 1").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    use crate::config::validation::validate_config;

    #[test]
    fn file_values_are_validated() {
        let path = std::env::temp_dir().join(format!("socks-proxy-config-{}.toml", std::process::id()));
        fs::write(&path, "[timeouts]\nconnect_secs = 0\nidle_secs = 0\n").unwrap();

        let config = read_config(&path);
        let _ = fs::remove_file(&path);

        let errors = validate_config(&config.unwrap()).unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn allowed_ip_override() {
        let mut config = ProxyConfig::default();

        apply_allowed_ip(&mut config, Some(String::new())).unwrap();
        assert_eq!(config.listener.allowed_ip, None);

        apply_allowed_ip(&mut config, Some("192.0.2.1".into())).unwrap();
        assert_eq!(config.listener.allowed_ip, Some("192.0.2.1".parse().unwrap()));

        assert!(matches!(
            apply_allowed_ip(&mut config, Some("nope".into())),
            Err(ConfigError::Env { .. })
        ));
    }
}
