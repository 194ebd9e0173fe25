//! Main application loop
//!
//! The App struct is the central coordinator for the line-mode client: it
//! owns the [`Adapter`], feeds it typed lines and session events, and
//! writes whatever became visible to the output.

use std::io::BufRead;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use wand_utils::{Result, WandError};

use crate::adapter::{Adapter, Indicator};
use crate::commands::{parse_line, Line, LocalCommand, ParseError, HELP};
use crate::config::LineEnding;

use super::event::{AppEvent, EventHandler};

/// Prefix for lines the client writes about itself
const STATUS_PREFIX: &str = "[wand]";

/// Front-end settings
#[derive(Debug, Clone, Copy)]
pub struct AppOptions {
    /// Terminator appended to each typed line
    pub line_ending: LineEnding,
    /// Connect before reading any input
    pub auto_connect: bool,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            line_ending: LineEnding::default(),
            auto_connect: true,
        }
    }
}

/// Main application
pub struct App<W> {
    adapter: Adapter,
    events: EventHandler,
    options: AppOptions,
    out: W,
    /// Bytes of the transcript already written to `out`
    rendered: usize,
    /// Whether `out` is at the start of a line
    at_line_start: bool,
    /// Indicator as of the last status line
    shown_indicator: Indicator,
    quitting: bool,
}

impl<W: AsyncWrite + Unpin> App<W> {
    pub fn new(adapter: Adapter, options: AppOptions, out: W) -> Self {
        let shown_indicator = adapter.indicator();
        Self {
            adapter,
            events: EventHandler::new(),
            options,
            out,
            rendered: 0,
            at_line_start: true,
            shown_indicator,
            quitting: false,
        }
    }

    /// Feed typed lines from `reader`
    pub fn start_input<R: BufRead + Send + 'static>(&self, reader: R) {
        self.events.start_input_reading(reader);
    }

    /// Get a sender for injecting events
    pub fn sender(&self) -> mpsc::UnboundedSender<AppEvent> {
        self.events.sender()
    }

    /// Check if application should quit
    pub fn should_quit(&self) -> bool {
        self.quitting
    }

    /// Run until `:quit` or end of input
    ///
    /// The session is always torn down before this returns, including when
    /// the loop fails.
    pub async fn run(&mut self) -> Result<()> {
        let result = self.event_loop().await;

        self.adapter.shutdown().await;
        let flushed = self.render().await;

        tracing::info!("Event loop finished");
        result.and(flushed)
    }

    async fn event_loop(&mut self) -> Result<()> {
        if self.options.auto_connect {
            self.connect().await?;
        } else {
            self.status(&format!(
                "not connected to {}; type :connect to connect",
                self.adapter.endpoint()
            ))
            .await?;
        }

        while !self.should_quit() {
            self.render().await?;

            let event = tokio::select! {
                Some(event) = self.events.next() => event,
                Some(event) = self.adapter.next_event() => AppEvent::Session(event),
                else => break,
            };

            self.handle_event(event).await?;
        }

        Ok(())
    }

    /// Handle an application event
    async fn handle_event(&mut self, event: AppEvent) -> Result<()> {
        match event {
            AppEvent::Input(line) => self.handle_line(&line).await?,
            AppEvent::InputClosed => {
                tracing::debug!("Input closed");
                self.quitting = true;
            }
            AppEvent::Session(event) => self.adapter.handle_event(event),
        }
        Ok(())
    }

    async fn handle_line(&mut self, line: &str) -> Result<()> {
        match parse_line(line) {
            Ok(Line::Remote(text)) => {
                let command = self.options.line_ending.apply(&text);
                self.adapter.set_input(command);
                self.submit().await
            }
            Ok(Line::Local(command)) => self.handle_local(command).await,
            Err(ParseError::Empty) => Ok(()),
            Err(e) => self.status(&e.to_string()).await,
        }
    }

    async fn handle_local(&mut self, command: LocalCommand) -> Result<()> {
        match command {
            LocalCommand::Connect => self.connect().await,
            LocalCommand::Disconnect => {
                self.adapter.disconnect();
                Ok(())
            }
            LocalCommand::Retry => {
                if self.adapter.input().is_empty() {
                    self.status("nothing to retry").await
                } else {
                    self.submit().await
                }
            }
            LocalCommand::Status => {
                let mut message = format!(
                    "{} ({})",
                    self.adapter.indicator(),
                    self.adapter.endpoint()
                );
                if let Some(error) = self.adapter.last_error() {
                    message.push_str(&format!("; last error: {}", error));
                }
                self.status(&message).await
            }
            LocalCommand::Help => {
                for line in HELP.lines() {
                    self.status(line).await?;
                }
                Ok(())
            }
            LocalCommand::Quit => {
                self.quitting = true;
                Ok(())
            }
        }
    }

    async fn connect(&mut self) -> Result<()> {
        if let Err(e) = self.adapter.connect() {
            tracing::error!("Failed to start session: {}", e);
            return self.status(&format!("cannot connect: {}", e)).await;
        }
        Ok(())
    }

    /// Submit the adapter's input, reporting a rejection without losing it
    async fn submit(&mut self) -> Result<()> {
        match self.adapter.submit() {
            Ok(id) => {
                tracing::debug!(%id, "Command submitted");
                Ok(())
            }
            Err(e @ (WandError::NotConnected { .. } | WandError::SendPending)) => {
                self.status(&format!("not sent: {} (:retry to resend)", e))
                    .await
            }
            Err(e) => self.status(&format!("not sent: {}", e)).await,
        }
    }

    /// Write new transcript text and any indicator change
    async fn render(&mut self) -> Result<()> {
        let transcript = self.adapter.transcript();
        if self.rendered < transcript.len() {
            let fresh = transcript[self.rendered..].to_string();
            self.rendered = transcript.len();
            self.out.write_all(fresh.as_bytes()).await?;
            self.at_line_start = fresh.ends_with('\n');
        }

        let indicator = self.adapter.indicator();
        if indicator != self.shown_indicator {
            self.shown_indicator = indicator;
            let message = match indicator {
                Indicator::Connecting => format!("connecting to {}", self.adapter.endpoint()),
                Indicator::Connected => format!("connected to {}", self.adapter.endpoint()),
                Indicator::Disconnected => "disconnected".to_string(),
                Indicator::Failed => match self.adapter.last_error() {
                    Some(error) => format!("connection failed: {}", error),
                    None => "connection failed".to_string(),
                },
            };
            self.status(&message).await?;
        }

        self.out.flush().await?;
        Ok(())
    }

    /// Write a client status line on its own line
    async fn status(&mut self, message: &str) -> Result<()> {
        let mut line = String::new();
        if !self.at_line_start {
            line.push('\n');
        }
        line.push_str(&format!("{} {}\n", STATUS_PREFIX, message));

        self.out.write_all(line.as_bytes()).await?;
        self.at_line_start = true;
        Ok(())
    }
}
