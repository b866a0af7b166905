//! Aggregator configuration loaded from environment variables.
//!
//! Everything except the credential table has a default. An unusable
//! carrier or credential list fails startup; other invalid values are
//! logged and replaced by their defaults.

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use rps_shared::constants::{DEFAULT_PORT, FRESHNESS_WINDOW_SECS, MAX_REPORT_SIZE};
use rps_shared::Carrier;

use crate::credentials::StaticCredentials;
use crate::error::ServerError;

#[derive(Clone)]
pub struct ServerConfig {
    /// Env: `RPS_LISTEN_ADDR`
    /// Default: `0.0.0.0:6568`
    pub listen_addr: SocketAddr,

    /// Env: `RPS_TRANSPORT` (`udp` or `tcp`)
    /// Default: `udp`
    pub carrier: Carrier,

    /// Env: `RPS_CREDENTIALS` as `user=secret,user=secret`
    pub credentials: StaticCredentials,

    /// Maximum accepted distance between a report timestamp and now.
    /// Env: `RPS_FRESHNESS_WINDOW_SECS`
    /// Default: `120`
    pub freshness_window: u32,

    /// Largest report read from a datagram or connection.
    /// Env: `RPS_MAX_REPORT_SIZE`
    /// Default: `320000`
    pub max_report_size: usize,

    /// Env: `RPS_SWEEP_PROBABILITY`
    /// Default: `0.01`
    pub sweep_probability: f64,

    /// Period of the background replay-guard sweep.
    /// Env: `RPS_SWEEP_INTERVAL_SECS`
    /// Default: `60`
    pub sweep_interval: Duration,
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("listen_addr", &self.listen_addr)
            .field("carrier", &self.carrier)
            .field("users", &self.credentials.len())
            .field("freshness_window", &self.freshness_window)
            .field("max_report_size", &self.max_report_size)
            .field("sweep_probability", &self.sweep_probability)
            .field("sweep_interval", &self.sweep_interval)
            .finish()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: ([0, 0, 0, 0], DEFAULT_PORT).into(),
            carrier: Carrier::Udp,
            credentials: StaticCredentials::new(),
            freshness_window: FRESHNESS_WINDOW_SECS,
            max_report_size: MAX_REPORT_SIZE,
            sweep_probability: 0.01,
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ServerError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ServerError> {
        let mut config = Self::default();

        if let Some(addr) = lookup("RPS_LISTEN_ADDR") {
            match addr.parse::<SocketAddr>() {
                Ok(parsed) => config.listen_addr = parsed,
                Err(_) => tracing::warn!(value = %addr, "Invalid RPS_LISTEN_ADDR, using default"),
            }
        }

        if let Some(val) = lookup("RPS_TRANSPORT") {
            config.carrier = val
                .parse()
                .map_err(|reason| ServerError::InvalidSetting {
                    name: "RPS_TRANSPORT",
                    reason,
                })?;
        }

        if let Some(list) = lookup("RPS_CREDENTIALS") {
            config.credentials = StaticCredentials::parse(&list).map_err(|reason| {
                ServerError::InvalidSetting {
                    name: "RPS_CREDENTIALS",
                    reason,
                }
            })?;
        }
        if config.credentials.is_empty() {
            return Err(ServerError::NoCredentials);
        }

        if let Some(val) = lookup("RPS_FRESHNESS_WINDOW_SECS") {
            match val.parse::<u32>() {
                Ok(secs) => config.freshness_window = secs,
                Err(_) => tracing::warn!(
                    value = %val,
                    "Invalid RPS_FRESHNESS_WINDOW_SECS, using default"
                ),
            }
        }

        if let Some(val) = lookup("RPS_MAX_REPORT_SIZE") {
            match val.parse::<usize>() {
                Ok(size) if size > 0 => config.max_report_size = size,
                _ => tracing::warn!(value = %val, "Invalid RPS_MAX_REPORT_SIZE, using default"),
            }
        }

        if let Some(val) = lookup("RPS_SWEEP_PROBABILITY") {
            match val.parse::<f64>() {
                Ok(p) if (0.0..=1.0).contains(&p) => config.sweep_probability = p,
                _ => tracing::warn!(value = %val, "Invalid RPS_SWEEP_PROBABILITY, using default"),
            }
        }

        if let Some(val) = lookup("RPS_SWEEP_INTERVAL_SECS") {
            match val.parse::<u64>() {
                Ok(secs) if secs > 0 => config.sweep_interval = Duration::from_secs(secs),
                _ => tracing::warn!(value = %val, "Invalid RPS_SWEEP_INTERVAL_SECS, using default"),
            }
        }

        // RUST_LOG is read by tracing-subscriber's EnvFilter directly.

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::CredentialProvider;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.listen_addr, ([0, 0, 0, 0], 6568).into());
        assert_eq!(config.carrier, Carrier::Udp);
        assert_eq!(config.freshness_window, 120);
        assert_eq!(config.max_report_size, 320_000);
    }

    #[test]
    fn test_credentials_required() {
        assert!(matches!(
            ServerConfig::from_lookup(lookup(&[])),
            Err(ServerError::NoCredentials)
        ));
        assert!(matches!(
            ServerConfig::from_lookup(lookup(&[("RPS_CREDENTIALS", "nonsense")])),
            Err(ServerError::InvalidSetting { .. })
        ));
    }

    #[test]
    fn test_overrides_and_fallbacks() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("RPS_CREDENTIALS", "dfs=foo"),
            ("RPS_LISTEN_ADDR", "127.0.0.1:7000"),
            ("RPS_TRANSPORT", "TCP"),
            ("RPS_FRESHNESS_WINDOW_SECS", "30"),
            ("RPS_SWEEP_PROBABILITY", "1.5"),
            ("RPS_SWEEP_INTERVAL_SECS", "0"),
        ]))
        .unwrap();

        assert_eq!(config.listen_addr, "127.0.0.1:7000".parse().unwrap());
        assert_eq!(config.carrier, Carrier::Tcp);
        assert_eq!(config.freshness_window, 30);
        assert_eq!(config.sweep_probability, 0.01);
        assert_eq!(config.sweep_interval, Duration::from_secs(60));
        assert_eq!(config.credentials.get_password("dfs"), Some(b"foo".to_vec()));
    }

    #[test]
    fn test_invalid_transport_is_rejected() {
        let err = ServerConfig::from_lookup(lookup(&[
            ("RPS_CREDENTIALS", "dfs=foo"),
            ("RPS_TRANSPORT", "sctp"),
        ]))
        .unwrap_err();
        assert!(matches!(
            err,
            ServerError::InvalidSetting {
                name: "RPS_TRANSPORT",
                ..
            }
        ));
    }

    #[test]
    fn test_debug_hides_credentials() {
        let config =
            ServerConfig::from_lookup(lookup(&[("RPS_CREDENTIALS", "dfs=hunter2")])).unwrap();
        assert!(!format!("{config:?}").contains("hunter2"));
    }
}
