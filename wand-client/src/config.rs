//! Client-side configuration loading
//!
//! Settings come from `~/.config/wand/config.toml` and are then
//! overridden by command-line flags. Anything left unset falls back to the
//! compiled-in defaults.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use wand_protocol::{Endpoint, DEFAULT_HOST, DEFAULT_PORT, MAX_RECEIVE_LEN};
use wand_utils::{Result, WandError};

use crate::cli::Args;
use crate::connection::SessionOptions;

/// Shortest handshake bound accepted from config or flags
pub const MIN_CONNECT_TIMEOUT_MS: u64 = 100;

/// Full client configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub server: ServerConfig,
    pub terminal: TerminalConfig,
}

/// Where and how to connect
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Bound on the TCP handshake, in milliseconds
    pub connect_timeout_ms: u64,
    /// Most bytes requested by one receive (1..=65536)
    pub max_read_len: usize,
    pub nodelay: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let options = SessionOptions::default();
        Self {
            host: DEFAULT_HOST.into(),
            port: DEFAULT_PORT,
            connect_timeout_ms: options.connect_timeout.as_millis() as u64,
            max_read_len: options.max_read_len,
            nodelay: options.nodelay,
        }
    }
}

/// Front-end behavior
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TerminalConfig {
    /// Terminator appended to each typed line before it is sent
    pub line_ending: LineEnding,
}

/// Line terminator for submitted commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineEnding {
    None,
    #[default]
    Lf,
    Crlf,
}

impl LineEnding {
    pub fn as_str(self) -> &'static str {
        match self {
            LineEnding::None => "",
            LineEnding::Lf => "\n",
            LineEnding::Crlf => "\r\n",
        }
    }

    /// Terminate a typed line
    pub fn apply(self, line: &str) -> String {
        format!("{}{}", line, self.as_str())
    }
}

impl ClientConfig {
    /// Load configuration
    ///
    /// An explicit `path` must exist and parse. Without one, the default
    /// config file is optional and a broken file only produces a warning.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from(path),
            None => {
                let Some(path) = wand_utils::config_file() else {
                    tracing::debug!("No home directory, using default config");
                    return Ok(Self::default());
                };
                if !path.exists() {
                    tracing::debug!("{} not found, using defaults", path.display());
                    return Ok(Self::default());
                }
                match Self::load_from(&path) {
                    Ok(config) => Ok(config),
                    Err(e) => {
                        tracing::warn!("{}, using defaults", e);
                        Ok(Self::default())
                    }
                }
            }
        }
    }

    /// Read and parse a config file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| WandError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: ClientConfig =
            toml::from_str(&content).map_err(|e| WandError::ConfigInvalid {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        tracing::debug!(
            "Loaded config from {}: server={}:{}",
            path.display(),
            config.server.host,
            config.server.port
        );
        Ok(config)
    }

    /// Apply command-line overrides
    ///
    /// `--addr` replaces host and port together; `--host`/`--port` then
    /// override individual parts.
    pub fn apply_args(&mut self, args: &Args) -> Result<()> {
        if let Some(addr) = &args.addr {
            let endpoint = parse_addr(addr)?;
            self.server.host = endpoint.host().to_string();
            self.server.port = endpoint.port();
        }
        if let Some(host) = &args.host {
            self.server.host = host.clone();
        }
        if let Some(port) = args.port {
            self.server.port = port;
        }
        if let Some(timeout) = args.connect_timeout {
            self.server.connect_timeout_ms = timeout;
        }
        Ok(())
    }

    /// The endpoint sessions will connect to
    pub fn endpoint(&self) -> Result<Endpoint> {
        Endpoint::new(self.server.host.clone(), self.server.port).map_err(|e| {
            WandError::invalid_endpoint(
                format!("{}:{}", self.server.host, self.server.port),
                e.to_string(),
            )
        })
    }

    pub fn session_options(&self) -> SessionOptions {
        let max_read_len = self.server.max_read_len.clamp(1, MAX_RECEIVE_LEN);
        if max_read_len != self.server.max_read_len {
            tracing::warn!(
                "max_read_len {} out of range, using {}",
                self.server.max_read_len,
                max_read_len
            );
        }

        let connect_timeout_ms = self.server.connect_timeout_ms.max(MIN_CONNECT_TIMEOUT_MS);
        if connect_timeout_ms != self.server.connect_timeout_ms {
            tracing::warn!(
                "connect_timeout_ms {} too short, using {}",
                self.server.connect_timeout_ms,
                connect_timeout_ms
            );
        }

        SessionOptions {
            connect_timeout: Duration::from_millis(connect_timeout_ms),
            max_read_len,
            nodelay: self.server.nodelay,
        }
    }
}

/// Parse `tcp://host:port` or plain `host:port`
pub fn parse_addr(addr: &str) -> Result<Endpoint> {
    if addr.contains("://") {
        let url = Url::parse(addr)
            .map_err(|e| WandError::invalid_endpoint(addr, e.to_string()))?;

        if url.scheme() != "tcp" {
            return Err(WandError::invalid_endpoint(
                addr,
                format!("unsupported scheme '{}'", url.scheme()),
            ));
        }

        let host = url
            .host_str()
            .ok_or_else(|| WandError::invalid_endpoint(addr, "missing host"))?;
        let port = url
            .port()
            .ok_or_else(|| WandError::invalid_endpoint(addr, "missing port"))?;

        Endpoint::new(host, port).map_err(|e| WandError::invalid_endpoint(addr, e.to_string()))
    } else {
        addr.parse()
            .map_err(|e: wand_protocol::EndpointError| {
                WandError::invalid_endpoint(addr, e.to_string())
            })
    }
}
