//! Server configuration
//!
//! Settings come from an optional `chat_relay.toml`, then `CHAT_RELAY_*`
//! environment variables. The binary lets the first command-line
//! argument override the bind address.

use ::config::builder::DefaultState;
use ::config::{Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;

/// Default server address
pub const DEFAULT_ADDR: &str = "127.0.0.1:8080";

/// Default config file name (extension resolved by the config crate)
const DEFAULT_CONFIG_FILE: &str = "chat_relay";

/// How steady-state messages are cut out of the byte stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Framing {
    /// One receive of up to `read_chunk_size` bytes is one message
    #[default]
    Chunk,
    /// Each newline-terminated line is one message
    Line,
}

/// Relay configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the listener binds to
    pub bind_addr: String,
    /// Maximum bytes taken by a single receive in chunk framing
    pub read_chunk_size: usize,
    /// Capacity of each connection's outbound queue
    pub outbound_buffer: usize,
    /// Capacity of the registry actor's command queue
    pub registry_buffer: usize,
    /// Concurrent connection cap, 0 means unlimited
    pub max_connections: usize,
    /// Message framing for the Active state
    pub framing: Framing,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_ADDR.to_string(),
            read_chunk_size: 1024,
            outbound_buffer: 32,
            registry_buffer: 256,
            max_connections: 0,
            framing: Framing::Chunk,
        }
    }
}

impl ServerConfig {
    /// Load configuration from the config file and environment
    ///
    /// The file is optional; its path can be changed with `CHAT_RELAY_CONFIG`.
    pub fn load() -> Result<Self, ConfigError> {
        let path =
            std::env::var("CHAT_RELAY_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());

        Self::from_builder(
            Config::builder()
                .add_source(File::with_name(&path).required(false))
                .add_source(Environment::with_prefix("CHAT_RELAY")),
        )
    }

    /// Build and validate a configuration from prepared sources
    pub fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let config: ServerConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Connection cap as an option, `None` when unlimited
    pub fn connection_limit(&self) -> Option<usize> {
        (self.max_connections > 0).then_some(self.max_connections)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.bind_addr.trim().is_empty() {
            return Err(ConfigError::Message("bind_addr cannot be empty".into()));
        }
        if self.read_chunk_size == 0 {
            return Err(ConfigError::Message(
                "read_chunk_size must be greater than 0".into(),
            ));
        }
        if self.outbound_buffer == 0 || self.registry_buffer == 0 {
            return Err(ConfigError::Message(
                "channel buffers must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ::config::FileFormat;

    fn from_toml(toml: &str) -> Result<ServerConfig, ConfigError> {
        ServerConfig::from_builder(
            Config::builder().add_source(File::from_str(toml, FileFormat::Toml)),
        )
    }

    #[test]
    fn test_defaults_match_original_server() {
        let config = from_toml("").unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:8080");
        assert_eq!(config.read_chunk_size, 1024);
        assert_eq!(config.framing, Framing::Chunk);
        assert!(config.connection_limit().is_none());
    }

    #[test]
    fn test_overrides_from_file() {
        let config = from_toml(
            r#"
            bind_addr = "0.0.0.0:9000"
            framing = "line"
            max_connections = 50
            "#,
        )
        .unwrap();

        assert_eq!(config.bind_addr, "0.0.0.0:9000");
        assert_eq!(config.framing, Framing::Line);
        assert_eq!(config.connection_limit(), Some(50));
        assert_eq!(config.outbound_buffer, 32);
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        assert!(from_toml("read_chunk_size = 0").is_err());
    }

    #[test]
    fn test_zero_buffer_rejected() {
        assert!(from_toml("outbound_buffer = 0").is_err());
    }
}
