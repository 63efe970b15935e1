use crate::error::{LibError, Result};
use gatetun_core::{PlatformError, ProxyTunnel};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const DEFAULT_METHOD: &str = "chacha20-ietf-poly1305";

/// Log verbosity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Silent,
    Error,
    Warning,
    #[default]
    Info,
    Debug,
}

/// Proxy server configuration handed over by the platform extension
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub password: String,

    /// Cipher name
    #[serde(default = "default_method")]
    pub method: String,

    /// Salt prefix sent before the first payload, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tunnel_id: Option<String>,

    #[serde(default)]
    pub log_level: LogLevel,
}

fn default_method() -> String {
    DEFAULT_METHOD.to_string()
}

impl ServerConfig {
    pub fn new(host: impl Into<String>, port: u16, password: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            password: password.into(),
            method: default_method(),
            prefix: None,
            tunnel_id: None,
            log_level: LogLevel::default(),
        }
    }

    /// Reject configurations no dialer could be built from
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(LibError::Config("host must not be empty".to_string()));
        }
        if self.port == 0 {
            return Err(LibError::Config("port must not be zero".to_string()));
        }
        if self.password.is_empty() {
            return Err(LibError::Config("password must not be empty".to_string()));
        }
        Ok(())
    }

    /// `host:port`, bracketing IPv6 literals
    pub fn server_address(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Prefix bytes, or empty when no prefix is configured
    pub fn prefix_bytes(&self) -> Vec<u8> {
        self.prefix
            .as_deref()
            .map(|p| p.as_bytes().to_vec())
            .unwrap_or_default()
    }
}

/// Outcome of a connect call. Exactly one field is populated.
#[derive(Clone)]
pub struct ConnectTunnelResult {
    pub tunnel: Option<Arc<ProxyTunnel>>,
    pub error: Option<PlatformError>,
}

impl ConnectTunnelResult {
    pub fn connected(tunnel: Arc<ProxyTunnel>) -> Self {
        Self {
            tunnel: Some(tunnel),
            error: None,
        }
    }

    pub fn failed(error: PlatformError) -> Self {
        Self {
            tunnel: None,
            error: Some(error),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.tunnel.is_some()
    }
}

impl std::fmt::Debug for ConnectTunnelResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectTunnelResult")
            .field("tunnel", &self.tunnel.is_some())
            .field("error", &self.error)
            .finish()
    }
}
