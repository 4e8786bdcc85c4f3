use std::{env, net::SocketAddr, time::Duration};

use thiserror::Error;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const RPC_PORT: u16 = 8000;
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub bind_port: u16,
    pub shutdown_timeout: Duration,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("PORT must be a valid u16")]
    InvalidPort,
    #[error("SHUTDOWN_TIMEOUT_SECS must be a non-negative integer")]
    InvalidShutdownTimeout,
    #[error("invalid bind address or port")]
    InvalidSocket,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Parses the item server configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind_addr = lookup("BIND_ADDR")
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_port = lookup("PORT")
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .map(|value| value.parse::<u16>().map_err(|_| ConfigError::InvalidPort))
            .transpose()?
            .unwrap_or(DEFAULT_PORT);
        let shutdown_timeout = lookup("SHUTDOWN_TIMEOUT_SECS")
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .map(|value| {
                value
                    .parse::<u64>()
                    .map(Duration::from_secs)
                    .map_err(|_| ConfigError::InvalidShutdownTimeout)
            })
            .transpose()?
            .unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT);

        let config = Self {
            bind_addr,
            bind_port,
            shutdown_timeout,
        };

        let _ = config.bind_socket()?;
        Ok(config)
    }

    /// The JSON-RPC sum server always listens on the same address.
    pub fn rpc() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            bind_port: RPC_PORT,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    pub fn bind_socket(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.bind_addr, self.bind_port)
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::InvalidSocket)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn parse(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn parse_defaults() {
        let config = parse(&[]).expect("config should parse");
        assert_eq!(config.bind_addr, "0.0.0.0");
        assert_eq!(config.bind_port, 8080);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(5));
    }

    #[test]
    fn port_override() {
        let config = parse(&[("PORT", "9090")]).expect("config should parse");
        assert_eq!(config.bind_port, 9090);
        assert_eq!(
            config.bind_socket().expect("valid socket"),
            "0.0.0.0:9090".parse().expect("valid addr")
        );
    }

    #[test]
    fn empty_port_falls_back_to_default() {
        let config = parse(&[("PORT", "  ")]).expect("config should parse");
        assert_eq!(config.bind_port, 8080);
    }

    #[test]
    fn invalid_port_fails() {
        let err = parse(&[("PORT", "http")]).expect_err("expected invalid port error");
        assert!(matches!(err, ConfigError::InvalidPort));

        let err = parse(&[("PORT", "70000")]).expect_err("expected invalid port error");
        assert!(matches!(err, ConfigError::InvalidPort));
    }

    #[test]
    fn invalid_bind_addr_fails() {
        let err = parse(&[("BIND_ADDR", "not an address")]).expect_err("expected socket error");
        assert!(matches!(err, ConfigError::InvalidSocket));
    }

    #[test]
    fn shutdown_timeout_override() {
        let config = parse(&[("SHUTDOWN_TIMEOUT_SECS", "30")]).expect("config should parse");
        assert_eq!(config.shutdown_timeout, Duration::from_secs(30));

        let err = parse(&[("SHUTDOWN_TIMEOUT_SECS", "-1")]).expect_err("expected timeout error");
        assert!(matches!(err, ConfigError::InvalidShutdownTimeout));
    }

    #[test]
    fn rpc_config_is_fixed() {
        let config = Config::rpc();
        assert_eq!(
            config.bind_socket().expect("valid socket"),
            "0.0.0.0:8000".parse().expect("valid addr")
        );
    }
}
