//! wand client - line-mode terminal for a remote shell server
//!
//! Connects to a wand server over TCP, sends each typed line as a command
//! and prints whatever the server writes back.

use wand_utils::{init_logging_with_config, LogConfig, Result};

mod adapter;
mod cli;
mod commands;
mod config;
mod connection;
mod ui;

use adapter::Adapter;
use cli::Args;
use config::ClientConfig;
use ui::{App, AppOptions};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments first so --help works without side effects
    let args = Args::parse_args();

    let log_config = if args.log_file {
        LogConfig::client_file()
    } else {
        LogConfig::client()
    };
    init_logging_with_config(log_config)?;
    tracing::info!("wand client starting");
    tracing::debug!("CLI args: {:?}", args);

    match run_app(args).await {
        Ok(()) => {
            tracing::info!("wand client exiting normally");
            Ok(())
        }
        Err(e) => {
            tracing::error!("wand client error: {}", e);
            eprintln!("Error: {}", e);
            Err(e)
        }
    }
}

async fn run_app(args: Args) -> Result<()> {
    let mut config = ClientConfig::load(args.config.as_deref())?;
    config.apply_args(&args)?;

    let endpoint = config.endpoint()?;
    tracing::info!(%endpoint, "Using server endpoint");

    let adapter = Adapter::new(endpoint, config.session_options());
    let options = AppOptions {
        line_ending: config.terminal.line_ending,
        auto_connect: args.auto_connect(),
    };

    let mut app = App::new(adapter, options, tokio::io::stdout());
    app.start_input(std::io::BufReader::new(std::io::stdin()));
    app.run().await
}
