//! Node configuration.
//!
//! Read from TOML. Every field has a default, so an empty document is a
//! valid configuration:
//!
//! ```
//! use edge_node::config::NodeConfig;
//!
//! let config = NodeConfig::from_toml_str("").unwrap();
//! assert_eq!(config.listen.port(), 4000);
//! assert_eq!(config.read_buffer_size, 8192);
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use edge_http::connection::RequestLimits;
use edge_http::tls::{ClientAuth, TlsTerminator};
use serde::Deserialize;
use tracing::Level;

use crate::error::ServerError;

/// Largest header block a request may carry, whatever the configuration says.
pub const MAX_HEADER_BYTES_LIMIT: usize = 64 * 1024;

/// Largest single read, every read allocates a buffer of this size.
pub const READ_BUFFER_SIZE_LIMIT: usize = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NodeConfig {
    pub listen: SocketAddr,
    /// Capacity of a single read from a connection.
    pub read_buffer_size: usize,
    pub max_header_bytes: usize,
    pub max_body_bytes: u64,
    /// How long a single read may wait for the peer, also bounds the TLS handshake.
    pub idle_timeout_secs: u64,
    pub keep_alive: bool,
    pub max_connections: Option<usize>,
    pub log_level: String,
    pub tls: Option<TlsSettings>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TlsSettings {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    /// When set, clients must present a certificate issued by one of these CAs.
    #[serde(default)]
    pub client_ca_path: Option<PathBuf>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 4000)),
            read_buffer_size: 8 * 1024,
            max_header_bytes: 8 * 1024,
            max_body_bytes: 1024 * 1024,
            idle_timeout_secs: 30,
            keep_alive: true,
            max_connections: None,
            log_level: "info".to_string(),
            tls: None,
        }
    }
}

impl NodeConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ServerError> {
        let config: NodeConfig = toml::from_str(content).map_err(ServerError::config)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates the TOML file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ServerError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ServerError::config(format!("can't read {}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), ServerError> {
        if self.read_buffer_size == 0 || self.read_buffer_size > READ_BUFFER_SIZE_LIMIT {
            return Err(ServerError::config(format!("read_buffer_size must be between 1 and {READ_BUFFER_SIZE_LIMIT}")));
        }
        if self.max_header_bytes == 0 || self.max_header_bytes > MAX_HEADER_BYTES_LIMIT {
            return Err(ServerError::config(format!("max_header_bytes must be between 1 and {MAX_HEADER_BYTES_LIMIT}")));
        }
        if self.idle_timeout_secs == 0 {
            return Err(ServerError::config("idle_timeout_secs must be greater than 0"));
        }
        if self.max_connections == Some(0) {
            return Err(ServerError::config("max_connections must be greater than 0"));
        }
        self.log_level()?;
        Ok(())
    }

    pub fn log_level(&self) -> Result<Level, ServerError> {
        self.log_level.parse::<Level>().map_err(|_e| ServerError::config(format!("unknown log_level '{}'", self.log_level)))
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn limits(&self) -> RequestLimits {
        RequestLimits {
            max_header_bytes: self.max_header_bytes,
            max_body_bytes: self.max_body_bytes,
            idle_timeout: self.idle_timeout(),
        }
    }

    /// Builds the terminator described by the `tls` section, disabled when it is absent.
    pub fn tls_terminator(&self) -> Result<TlsTerminator, ServerError> {
        let Some(tls) = &self.tls else {
            return Ok(TlsTerminator::disabled());
        };

        let client_auth = match &tls.client_ca_path {
            Some(ca_path) => ClientAuth::required_from_pem_file(ca_path)?,
            None => ClientAuth::None,
        };
        Ok(TlsTerminator::from_pem_files(&tls.cert_path, &tls.key_path, client_auth)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    #[test]
    fn defaults() {
        let config = NodeConfig::from_toml_str("").unwrap();
        assert_eq!(config, NodeConfig::default());
        assert_eq!(config.limits(), RequestLimits::default());
        assert!(!config.tls_terminator().unwrap().is_enabled());
    }

    #[test]
    fn overrides() {
        let content = indoc! {r#"
            listen = "127.0.0.1:8443"
            read_buffer_size = 4096
            max_body_bytes = 10485760
            keep_alive = false
            max_connections = 256
            log_level = "debug"

            [tls]
            cert_path = "/etc/edge/node.crt"
            key_path = "/etc/edge/node.key"
        "#};

        let config = NodeConfig::from_toml_str(content).unwrap();
        assert_eq!(config.listen, "127.0.0.1:8443".parse::<SocketAddr>().unwrap());
        assert_eq!(config.read_buffer_size, 4096);
        assert_eq!(config.max_header_bytes, 8192);
        assert_eq!(config.max_body_bytes, 10 * 1024 * 1024);
        assert!(!config.keep_alive);
        assert_eq!(config.max_connections, Some(256));
        assert_eq!(config.log_level().unwrap(), Level::DEBUG);

        let tls = config.tls.unwrap();
        assert_eq!(tls.cert_path, PathBuf::from("/etc/edge/node.crt"));
        assert_eq!(tls.client_ca_path, None);
    }

    #[test]
    fn rejects_invalid_values() {
        for content in [
            "read_buffer_size = 0",
            "read_buffer_size = 1048577",
            "max_header_bytes = 0",
            "max_header_bytes = 1048576",
            "idle_timeout_secs = 0",
            "max_connections = 0",
            "log_level = \"chatty\"",
            "listen = \"not an address\"",
            "unknown_key = 1",
        ] {
            let result = NodeConfig::from_toml_str(content);
            assert!(matches!(result, Err(ServerError::Config { .. })), "accepted: {content}");
        }
    }

    #[test]
    fn read_buffer_size_upper_bound_is_accepted() {
        let config = NodeConfig::from_toml_str("read_buffer_size = 1048576").unwrap();
        assert_eq!(config.read_buffer_size, READ_BUFFER_SIZE_LIMIT);
    }

    #[test]
    fn missing_tls_files() {
        let config = NodeConfig {
            tls: Some(TlsSettings {
                cert_path: PathBuf::from("/nonexistent/node.crt"),
                key_path: PathBuf::from("/nonexistent/node.key"),
                client_ca_path: None,
            }),
            ..NodeConfig::default()
        };
        assert!(matches!(config.tls_terminator(), Err(ServerError::Tls { .. })));
    }

    #[test]
    fn missing_file() {
        assert!(matches!(NodeConfig::load("/nonexistent/edge-node.toml"), Err(ServerError::Config { .. })));
    }
}
