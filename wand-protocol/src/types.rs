//! Shared data types for the wand wire protocol

use std::fmt;
use std::str::FromStr;

use crate::{DEFAULT_HOST, DEFAULT_PORT};

/// Reasons an endpoint cannot be constructed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EndpointError {
    #[error("host must not be empty")]
    EmptyHost,

    #[error("port must be in 1..=65535")]
    ZeroPort,

    #[error("missing port (expected host:port)")]
    MissingPort,

    #[error("invalid port '{0}'")]
    InvalidPort(String),
}

/// Server address a session connects to
///
/// Immutable once built; port 0 is rejected. IPv6 literals are stored
/// without brackets and bracketed again by [`Endpoint::authority`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Result<Self, EndpointError> {
        let host = host.into();
        let host = host.trim();
        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);

        if host.is_empty() {
            return Err(EndpointError::EmptyHost);
        }
        if port == 0 {
            return Err(EndpointError::ZeroPort);
        }

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// `host:port`, with IPv6 literals bracketed
    pub fn authority(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.authority())
    }
}

impl FromStr for Endpoint {
    type Err = EndpointError;

    /// Parse `host:port` or `[v6addr]:port`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (host, port) = if let Some(rest) = s.strip_prefix('[') {
            let (host, tail) = rest.split_once(']').ok_or(EndpointError::MissingPort)?;
            let port = tail.strip_prefix(':').ok_or(EndpointError::MissingPort)?;
            (host, port)
        } else {
            s.rsplit_once(':').ok_or(EndpointError::MissingPort)?
        };

        let port: u16 = port
            .parse()
            .map_err(|_| EndpointError::InvalidPort(port.to_string()))?;

        Self::new(host, port)
    }
}
