//! Configuration types and builders.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// Transport selection.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransportConfig {
    /// Standard input/output transport (default for MCP).
    #[default]
    Stdio,

    /// HTTP transport with JSON-RPC over POST.
    Http(HttpConfig),
}

impl TransportConfig {
    /// Parse the `--http` flag value (`host:port` or `:port`).
    pub fn http_from_addr(addr: &str) -> Result<Self, ConfigError> {
        Ok(Self::Http(HttpConfig::from_addr(addr)?))
    }

    /// Description of this transport for startup logs.
    pub fn description(&self) -> String {
        match self {
            Self::Stdio => "stdio (stdin/stdout)".to_string(),
            Self::Http(cfg) => format!("HTTP on {}:{}{}", cfg.host, cfg.port, cfg.rpc_path),
        }
    }
}

/// HTTP transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port number to listen on.
    pub port: u16,

    /// Path for the JSON-RPC endpoint.
    #[serde(default = "default_rpc_path")]
    pub rpc_path: String,

    /// Enable CORS for browser clients.
    #[serde(default = "default_cors")]
    pub enable_cors: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_rpc_path() -> String {
    "/mcp".to_string()
}

fn default_cors() -> bool {
    true
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: 8080,
            rpc_path: default_rpc_path(),
            enable_cors: default_cors(),
        }
    }
}

impl HttpConfig {
    /// Parse a `host:port` bind address. A bare `:port` binds all interfaces
    /// the way the original flag did.
    pub fn from_addr(addr: &str) -> Result<Self, ConfigError> {
        let (host, port) = addr.rsplit_once(':').ok_or_else(|| ConfigError::InvalidValue {
            field: "http".into(),
            message: format!("expected host:port, got '{addr}'").into(),
        })?;

        let port: u16 = port.parse().map_err(|_| ConfigError::InvalidValue {
            field: "http".into(),
            message: format!("invalid port: '{port}'").into(),
        })?;

        Ok(Self {
            host: if host.is_empty() {
                "0.0.0.0".to_string()
            } else {
                host.to_string()
            },
            port,
            ..Default::default()
        })
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub name: Cow<'static, str>,
    pub version: Cow<'static, str>,
    pub transport: TransportConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "greeter".into(),
            version: env!("CARGO_PKG_VERSION").into(),
            transport: TransportConfig::default(),
            instructions: None,
        }
    }
}

impl ServerConfig {
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }
}

/// Builder for ServerConfig.
#[derive(Default)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    pub fn name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.config.name = name.into();
        self
    }

    pub fn version(mut self, version: impl Into<Cow<'static, str>>) -> Self {
        self.config.version = version.into();
        self
    }

    pub fn transport(mut self, transport: TransportConfig) -> Self {
        self.config.transport = transport;
        self
    }

    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.config.instructions = Some(instructions.into());
        self
    }

    pub fn build(self) -> ServerConfig {
        self.config
    }
}
