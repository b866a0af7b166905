//! Sensor configuration loaded from environment variables.
//!
//! The server address and credentials are required; everything else has a
//! default.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use rps_shared::constants::{DEFAULT_PORT, MIN_REPORT_SIZE};

use crate::assembler::ReportAssembler;
use crate::error::{AssemblyError, ClientError};
use crate::transport::{self, Carrier, Transport};

#[derive(Clone)]
pub struct ClientConfig {
    /// Aggregator address as `host[:port]`.
    /// Env: `RPS_SERVER`
    pub server: String,

    /// Env: `RPS_TRANSPORT` (`udp` or `tcp`)
    /// Default: `udp`
    pub carrier: Carrier,

    /// Env: `RPS_USERNAME`
    pub username: String,

    /// Shared HMAC secret.
    /// Env: `RPS_PASSWORD`
    pub password: String,

    /// Socket write timeout; also bounds TCP connection setup.
    /// Env: `RPS_TIMEOUT_SECS`
    /// Default: `5`
    pub timeout: Duration,

    /// Env: `RPS_SOFTWARE_NAME`
    pub software_name: Option<String>,

    /// Env: `RPS_SOFTWARE_VERSION`
    pub software_version: Option<String>,

    /// Opaque end-user identifier forwarded to the aggregator.
    /// Env: `RPS_END_USER`
    pub end_user: Option<String>,

    /// Reports smaller than this are held back unless flushed with force.
    /// Env: `RPS_MIN_REPORT_SIZE`
    /// Default: `400`
    pub min_report_size: usize,
}

// The password must never end up in logs.
impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("server", &self.server)
            .field("carrier", &self.carrier)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("timeout", &self.timeout)
            .field("software_name", &self.software_name)
            .field("software_version", &self.software_version)
            .field("end_user", &self.end_user)
            .field("min_report_size", &self.min_report_size)
            .finish()
    }
}

impl ClientConfig {
    pub fn new(
        server: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            server: with_default_port(&server.into()),
            carrier: Carrier::default(),
            username: username.into(),
            password: password.into(),
            timeout: Duration::from_secs(5),
            software_name: None,
            software_version: None,
            end_user: None,
            min_report_size: MIN_REPORT_SIZE,
        }
    }

    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name to its
    /// value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ClientError> {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.is_empty())
                .ok_or(ClientError::MissingSetting(name))
        };
        let optional = |name: &str| lookup(name).filter(|v| !v.is_empty());

        let mut config = Self::new(
            required("RPS_SERVER")?,
            required("RPS_USERNAME")?,
            required("RPS_PASSWORD")?,
        );

        if let Some(val) = optional("RPS_TRANSPORT") {
            config.carrier = val
                .parse()
                .map_err(|reason| ClientError::InvalidSetting {
                    name: "RPS_TRANSPORT",
                    reason,
                })?;
        }

        if let Some(val) = optional("RPS_TIMEOUT_SECS") {
            match val.parse::<u64>() {
                Ok(secs) if secs > 0 => config.timeout = Duration::from_secs(secs),
                _ => tracing::warn!(value = %val, "Invalid RPS_TIMEOUT_SECS, using default"),
            }
        }

        if let Some(val) = optional("RPS_MIN_REPORT_SIZE") {
            match val.parse::<usize>() {
                Ok(size) => config.min_report_size = size,
                Err(_) => {
                    tracing::warn!(value = %val, "Invalid RPS_MIN_REPORT_SIZE, using default")
                }
            }
        }

        config.software_name = optional("RPS_SOFTWARE_NAME");
        config.software_version = optional("RPS_SOFTWARE_VERSION");
        config.end_user = optional("RPS_END_USER");

        Ok(config)
    }

    /// Apply the metadata and size settings to an assembler.
    pub fn configure<T: Transport>(&self, mut assembler: ReportAssembler<T>) -> ReportAssembler<T> {
        if let Some(name) = &self.software_name {
            assembler = assembler.with_software_name(name.as_str());
        }
        if let Some(version) = &self.software_version {
            assembler = assembler.with_software_version(version.as_str());
        }
        if let Some(end_user) = &self.end_user {
            assembler = assembler.with_end_user(end_user.as_bytes());
        }
        assembler.with_min_report_size(self.min_report_size)
    }

    /// Open the configured transport and build an assembler on top of it.
    pub fn connect(&self) -> Result<ReportAssembler<Box<dyn Transport + Send>>, ClientError> {
        let transport = transport::open(self.carrier, &self.server, self.timeout)?;
        let assembler = ReportAssembler::new(
            self.username.as_str(),
            self.password.as_bytes(),
            transport,
        )
        .map_err(AssemblyError::from)?;
        Ok(self.configure(assembler))
    }
}

/// Append the standard port when `server` does not name one.
pub fn with_default_port(server: &str) -> String {
    let server = server.trim();
    if server.parse::<SocketAddr>().is_ok() {
        return server.to_string();
    }
    if let Ok(ip) = server.parse::<IpAddr>() {
        return SocketAddr::new(ip, DEFAULT_PORT).to_string();
    }
    if server.starts_with('[') && server.ends_with(']') {
        return format!("{server}:{DEFAULT_PORT}");
    }
    match server.rsplit_once(':') {
        Some((_, port)) if port.parse::<u16>().is_ok() => server.to_string(),
        _ => format!("{server}:{DEFAULT_PORT}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    const REQUIRED: [(&str, &str); 3] = [
        ("RPS_SERVER", "rps.example.com"),
        ("RPS_USERNAME", "dfs"),
        ("RPS_PASSWORD", "foo"),
    ];

    #[test]
    fn test_defaults() {
        let config = ClientConfig::from_lookup(lookup(&REQUIRED)).unwrap();
        assert_eq!(config.server, "rps.example.com:6568");
        assert_eq!(config.carrier, Carrier::Udp);
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.min_report_size, MIN_REPORT_SIZE);
        assert!(config.software_name.is_none());
    }

    #[test]
    fn test_missing_required_setting() {
        let err = ClientConfig::from_lookup(lookup(&REQUIRED[..2])).unwrap_err();
        assert!(matches!(err, ClientError::MissingSetting("RPS_PASSWORD")));
    }

    #[test]
    fn test_overrides() {
        let mut vars = REQUIRED.to_vec();
        vars.extend([
            ("RPS_TRANSPORT", "tcp"),
            ("RPS_TIMEOUT_SECS", "2"),
            ("RPS_MIN_REPORT_SIZE", "0"),
            ("RPS_SOFTWARE_NAME", "MIMEDefang"),
            ("RPS_END_USER", "customer-17"),
        ]);
        let config = ClientConfig::from_lookup(lookup(&vars)).unwrap();
        assert_eq!(config.carrier, Carrier::Tcp);
        assert_eq!(config.timeout, Duration::from_secs(2));
        assert_eq!(config.min_report_size, 0);
        assert_eq!(config.software_name.as_deref(), Some("MIMEDefang"));
        assert_eq!(config.end_user.as_deref(), Some("customer-17"));
    }

    #[test]
    fn test_invalid_numbers_fall_back() {
        let mut vars = REQUIRED.to_vec();
        vars.extend([("RPS_TIMEOUT_SECS", "soon"), ("RPS_MIN_REPORT_SIZE", "-1")]);
        let config = ClientConfig::from_lookup(lookup(&vars)).unwrap();
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.min_report_size, MIN_REPORT_SIZE);
    }

    #[test]
    fn test_invalid_transport_is_an_error() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("RPS_TRANSPORT", "carrier-pigeon"));
        assert!(matches!(
            ClientConfig::from_lookup(lookup(&vars)),
            Err(ClientError::InvalidSetting { name: "RPS_TRANSPORT", .. })
        ));
    }

    #[test]
    fn test_debug_redacts_password() {
        let config = ClientConfig::new("127.0.0.1", "dfs", "hunter2");
        let debug = format!("{config:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_with_default_port() {
        assert_eq!(with_default_port("192.0.2.1"), "192.0.2.1:6568");
        assert_eq!(with_default_port("192.0.2.1:7000"), "192.0.2.1:7000");
        assert_eq!(with_default_port("2001:db8::1"), "[2001:db8::1]:6568");
        assert_eq!(with_default_port("[2001:db8::1]"), "[2001:db8::1]:6568");
        assert_eq!(with_default_port("[2001:db8::1]:7000"), "[2001:db8::1]:7000");
        assert_eq!(with_default_port("rps.example.com"), "rps.example.com:6568");
        assert_eq!(with_default_port("rps.example.com:99"), "rps.example.com:99");
    }
}
