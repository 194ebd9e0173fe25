//! Command-line argument parsing for the wand client
//!
//! Uses clap for argument parsing with derive macros.

use clap::Parser;
use std::path::PathBuf;

/// wand - line-mode client for a remote shell server
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Server address (tcp://host:port or host:port)
    ///
    /// Overrides the host and port from the config file.
    /// Example: tcp://192.168.4.22:8080
    #[arg(long, env = "WAND_ADDR")]
    pub addr: Option<String>,

    /// Server host, applied after --addr
    #[arg(long)]
    pub host: Option<String>,

    /// Server port, applied after --addr
    #[arg(long, short = 'p')]
    pub port: Option<u16>,

    /// Connect timeout in milliseconds
    #[arg(long, value_name = "MS")]
    pub connect_timeout: Option<u64>,

    /// Config file to use instead of ~/.config/wand/config.toml
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Start disconnected; use :connect to connect
    #[arg(long, default_value_t = false)]
    pub no_connect: bool,

    /// Write logs to the state directory instead of stderr
    #[arg(long, default_value_t = false)]
    pub log_file: bool,
}

impl Args {
    /// Parse command-line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Whether to connect as soon as the client starts
    pub fn auto_connect(&self) -> bool {
        !self.no_connect
    }
}
