//! # Configuration Management
//!
//! Centralized configuration for endpoints, the session listener and logging.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - Direct instantiation with defaults
//! - Environment-specific overrides via `from_env()`
//!
//! Durations are written as milliseconds in TOML.

use crate::error::{ProtocolError, Result};
use crate::utils::timeout;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Transport-level ceiling for one datagram
pub const MAX_DATAGRAM_SIZE: usize = 1024;

/// Payload bytes that fit in the first datagram next to the length header
pub const FIRST_CHUNK_CAPACITY: usize = MAX_DATAGRAM_SIZE - 4;

/// Default upper bound on a tagged payload (16 MB)
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Default bound on datagrams parked for other peers
pub const PENDING_QUEUE_CAPACITY: usize = 1024;

/// Well-known port the demo server answers handshakes on
pub const DEFAULT_HANDSHAKE_PORT: u16 = 9876;

/// Main network configuration structure that contains all configurable settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct NetworkConfig {
    /// Listener configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Client configuration
    #[serde(default)]
    pub client: ClientConfig,

    /// Transport configuration
    #[serde(default)]
    pub transport: TransportConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl NetworkConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("UDP_SESSION_SERVER_ADDRESS") {
            config.server.address = addr;
        }

        if let Ok(addr) = std::env::var("UDP_SESSION_CLIENT_ADDRESS") {
            config.client.address = addr;
        }

        if let Ok(port) = std::env::var("UDP_SESSION_PORT_START") {
            if let Ok(val) = port.parse::<u16>() {
                config.server.session_port_start = val;
            }
        }

        if let Ok(timeout) = std::env::var("UDP_SESSION_CONNECTION_TIMEOUT_MS") {
            if let Ok(val) = timeout.parse::<u64>() {
                config.client.connection_timeout = Duration::from_millis(val);
            }
        }

        if let Ok(timeout) = std::env::var("UDP_SESSION_FRAGMENT_TIMEOUT_MS") {
            if let Ok(val) = timeout.parse::<u64>() {
                config.transport.fragment_timeout = Duration::from_millis(val);
            }
        }

        if let Ok(capacity) = std::env::var("UDP_SESSION_PENDING_QUEUE_CAPACITY") {
            if let Ok(val) = capacity.parse::<usize>() {
                config.transport.pending_queue_capacity = val;
            }
        }

        Ok(config)
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.server.validate());
        errors.extend(self.client.validate());
        errors.extend(self.transport.validate());
        errors.extend(self.logging.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ProtocolError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

/// Listener configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Address the handshake listener binds (e.g., "0.0.0.0:9876")
    pub address: String,

    /// First port handed out to accepted sessions; 0 lets the OS pick each one
    pub session_port_start: u16,

    /// Maximum number of sessions served at once
    pub max_sessions: usize,

    /// Timeout for graceful listener shutdown
    #[serde(with = "duration_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: format!("0.0.0.0:{DEFAULT_HANDSHAKE_PORT}"),
            session_port_start: DEFAULT_HANDSHAKE_PORT + 1,
            max_sessions: 256,
            shutdown_timeout: timeout::SHUTDOWN_TIMEOUT,
        }
    }
}

impl ServerConfig {
    /// Validate listener configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        match self.address.parse::<std::net::SocketAddr>() {
            _ if self.address.is_empty() => {
                errors.push("Server address cannot be empty".to_string());
            }
            Err(_) => errors.push(format!(
                "Invalid server address format: '{}' (expected format: '0.0.0.0:9876')",
                self.address
            )),
            Ok(addr) => {
                if self.session_port_start != 0 && self.session_port_start == addr.port() {
                    errors.push(
                        "Session port range cannot start at the handshake port".to_string(),
                    );
                }
            }
        }

        if self.max_sessions == 0 {
            errors.push("Max sessions must be greater than 0".to_string());
        } else if self.max_sessions > 10_000 {
            errors.push(format!(
                "Max sessions very high: {} (each session holds its own socket)",
                self.max_sessions
            ));
        }

        if self.session_port_start != 0
            && usize::from(self.session_port_start) + self.max_sessions > usize::from(u16::MAX)
        {
            errors.push("Session port range runs past 65535".to_string());
        }

        if self.shutdown_timeout.as_secs() < 1 {
            errors.push("Shutdown timeout too short (minimum: 1s)".to_string());
        } else if self.shutdown_timeout.as_secs() > 60 {
            errors.push("Shutdown timeout too long (maximum: 60s)".to_string());
        }

        errors
    }
}

/// Client-specific configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClientConfig {
    /// Handshake address of the server ("host:port")
    pub address: String,

    /// How long to wait for the connection echo
    #[serde(with = "duration_serde")]
    pub connection_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            address: format!("127.0.0.1:{DEFAULT_HANDSHAKE_PORT}"),
            connection_timeout: timeout::HANDSHAKE_TIMEOUT,
        }
    }
}

impl ClientConfig {
    /// Split `address` into host and port. Brackets around an IPv6 host are removed.
    pub fn host_and_port(&self) -> Result<(&str, u16)> {
        let invalid = || {
            ProtocolError::ConfigError(format!(
                "Invalid client address format: '{}' (expected format: 'example.com:9876')",
                self.address
            ))
        };
        let (host, port) = self.address.rsplit_once(':').ok_or_else(invalid)?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        let port = port.parse::<u16>().map_err(|_| invalid())?;
        if host.is_empty() {
            return Err(invalid());
        }
        Ok((host, port))
    }

    /// Validate client configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        // Host names are resolved at connect time, so only the shape is checked
        if self.address.is_empty() {
            errors.push("Client address cannot be empty".to_string());
        } else if let Err(e) = self.host_and_port() {
            errors.push(e.to_string());
        }

        if self.connection_timeout.as_millis() < 10 {
            errors.push("Connection timeout too short (minimum: 10ms)".to_string());
        } else if self.connection_timeout.as_secs() > 60 {
            errors.push("Connection timeout too long (maximum: 60s)".to_string());
        }

        errors
    }
}

/// Transport configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransportConfig {
    /// Wait for each continuation datagram of a fragmented message
    #[serde(with = "duration_serde")]
    pub fragment_timeout: Duration,

    /// Datagrams parked for other peers before the oldest is evicted
    pub pending_queue_capacity: usize,

    /// Maximum tagged payload size in bytes
    pub max_message_size: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            fragment_timeout: timeout::FRAGMENT_TIMEOUT,
            pending_queue_capacity: PENDING_QUEUE_CAPACITY,
            max_message_size: MAX_MESSAGE_SIZE,
        }
    }
}

impl TransportConfig {
    /// Validate transport configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.fragment_timeout.is_zero() {
            errors.push("Fragment timeout cannot be 0".to_string());
        } else if self.fragment_timeout.as_secs() > 10 {
            errors.push("Fragment timeout too long (maximum: 10s)".to_string());
        }

        if self.pending_queue_capacity == 0 {
            errors.push("Pending queue capacity must be greater than 0".to_string());
        } else if self.pending_queue_capacity > 1_000_000 {
            errors.push(format!(
                "Pending queue capacity too large: {} (max recommended: 1,000,000)",
                self.pending_queue_capacity
            ));
        }

        if self.max_message_size == 0 {
            errors.push("Max message size cannot be 0".to_string());
        } else if self.max_message_size > u32::MAX as usize {
            errors.push(format!(
                "Max message size too large: {} bytes (length header is 32 bits)",
                self.max_message_size
            ));
        }

        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to print the event target
    pub with_target: bool,

    /// Whether to print thread ids
    pub with_thread_ids: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("udp-session"),
            log_level: Level::INFO,
            with_target: false,
            with_thread_ids: true,
        }
    }
}

impl LoggingConfig {
    /// Validate logging configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "Application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        errors
    }
}

/// Helper module for Duration serialization/deserialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis() as u64;
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let level_str = match *level {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };
        level_str.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}
