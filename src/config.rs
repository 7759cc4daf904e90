// ABOUTME: Server-wide configuration record consumed by Server::new, deserializable so a hosting
// ABOUTME: binary can load it from TOML/JSON/env without this crate depending on a specific source

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Transport protocol. Only TCP is modeled; UDP and other datagram transports are a Non-goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Protocol {
    #[default]
    Tcp,
}

/// Immutable, validated server configuration.
///
/// Constructed once by the caller and handed to [`crate::server::Server::new`]. The core never
/// reads this from a file or environment itself, that wiring belongs to the hosting binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Local address to bind, e.g. `"127.0.0.1"` or `"0.0.0.0"`.
    pub ip_address: String,
    /// Local port to bind. `0` requests an OS-assigned ephemeral port.
    pub port: u16,
    #[serde(default)]
    pub protocol: Protocol,
    /// Admission capacity: the maximum number of concurrently live sessions.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Per-session receive buffer size, in bytes.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

fn default_max_connections() -> usize {
    1
}

fn default_buffer_size() -> usize {
    4096
}

impl ServerConfig {
    /// Construct a config with the documented defaults (`max_connections = 1`, `buffer_size = 4096`).
    pub fn new(ip_address: impl Into<String>, port: u16) -> Self {
        Self {
            ip_address: ip_address.into(),
            port,
            protocol: Protocol::Tcp,
            max_connections: default_max_connections(),
            buffer_size: default_buffer_size(),
        }
    }

    pub fn with_max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = max_connections;
        self
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    /// Enforce the invariants from the data model: non-empty bind address, at least one
    /// admission slot, and a positive receive buffer. Bind-time resolution failures (bad
    /// hostname, port already in use) are a separate, later failure surfaced from `run`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ip_address.is_empty() {
            return Err(ConfigError::EmptyBindAddress);
        }
        if self.max_connections == 0 {
            return Err(ConfigError::ZeroMaxConnections);
        }
        if self.buffer_size == 0 {
            return Err(ConfigError::ZeroBufferSize);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ServerConfig::new("127.0.0.1", 0);
        assert!(config.validate().is_ok());
        assert_eq!(config.max_connections, 1);
        assert_eq!(config.buffer_size, 4096);
    }

    #[test]
    fn rejects_empty_bind_address() {
        let config = ServerConfig::new("", 1234);
        assert_eq!(config.validate(), Err(ConfigError::EmptyBindAddress));
    }

    #[test]
    fn rejects_zero_max_connections() {
        let config = ServerConfig::new("127.0.0.1", 1234).with_max_connections(0);
        assert_eq!(config.validate(), Err(ConfigError::ZeroMaxConnections));
    }

    #[test]
    fn rejects_zero_buffer_size() {
        let config = ServerConfig::new("127.0.0.1", 1234).with_buffer_size(0);
        assert_eq!(config.validate(), Err(ConfigError::ZeroBufferSize));
    }

    #[test]
    fn round_trips_through_json_with_defaults_filled_in() {
        let json = r#"{"ip_address": "0.0.0.0", "port": 9000}"#;
        let config: ServerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.max_connections, 1);
        assert_eq!(config.buffer_size, 4096);
        assert_eq!(config.protocol, Protocol::Tcp);

        let config = config.with_max_connections(50);
        let round_tripped: ServerConfig = serde_json::from_str(&serde_json::to_string(&config).unwrap()).unwrap();
        assert_eq!(round_tripped.max_connections, 50);
    }
}
