//! Presentation adapter
//!
//! Turns session events into what the user sees (a connection indicator
//! and a transcript of commands and output) and turns submitted input
//! into session sends. All of its state is mutated from the application
//! event loop only.

use std::fmt;

use wand_protocol::Endpoint;
use wand_utils::{Result, WandError};

use crate::connection::{
    dispatch, SendId, Session, SessionError, SessionEvent, SessionHandler, SessionOptions,
    SessionState,
};

/// Prompt prefixed to echoed commands
pub const ECHO_PROMPT: &str = "$ ";

/// User-visible connection status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indicator {
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

impl fmt::Display for Indicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Indicator::Disconnected => "disconnected",
            Indicator::Connecting => "connecting",
            Indicator::Connected => "connected",
            Indicator::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// A submitted command waiting for its write to complete
#[derive(Debug, Clone)]
struct PendingCommand {
    id: SendId,
    command: String,
}

/// Bridge between one [`Session`] and the user-visible log
pub struct Adapter {
    endpoint: Endpoint,
    options: SessionOptions,
    session: Option<Session>,
    indicator: Indicator,
    transcript: String,
    input: String,
    pending: Option<PendingCommand>,
    last_error: Option<String>,
}

impl Adapter {
    pub fn new(endpoint: Endpoint, options: SessionOptions) -> Self {
        Self {
            endpoint,
            options,
            session: None,
            indicator: Indicator::Disconnected,
            transcript: String::new(),
            input: String::new(),
            pending: None,
            last_error: None,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn indicator(&self) -> Indicator {
        self.indicator
    }

    /// Everything received plus echoes of sent commands, in order
    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    /// Current input buffer
    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn set_input(&mut self, text: impl Into<String>) {
        self.input = text.into();
    }

    /// Most recent session failure, if any
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// State of the current session, `None` before the first connect
    pub fn session_state(&self) -> Option<SessionState> {
        self.session.as_ref().map(Session::state)
    }

    /// Whether a submitted command is still waiting to be written
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Start a fresh session, closing the previous one first
    pub fn connect(&mut self) -> Result<()> {
        if let Some(mut previous) = self.session.take() {
            previous.disconnect();
        }
        self.pending = None;

        let mut session = Session::new(self.endpoint.clone(), self.options.clone());
        session.connect()?;

        self.session = Some(session);
        self.indicator = Indicator::Connecting;
        self.last_error = None;
        Ok(())
    }

    /// Close the current session, if any
    pub fn disconnect(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.disconnect();
        }
    }

    /// Disconnect and wait for the transport to be released
    pub async fn shutdown(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.disconnect();
            session.wait_released().await;
        }
        self.pending = None;
        self.indicator = Indicator::Disconnected;
    }

    /// Send the input buffer
    ///
    /// The buffer is only cleared once the session confirms the write, so
    /// a rejected or failed send leaves it in place for a retry.
    pub fn submit(&mut self) -> Result<SendId> {
        if self.input.is_empty() {
            return Err(WandError::EmptyCommand);
        }
        if self.pending.is_some() {
            return Err(WandError::SendPending);
        }

        let session = self
            .session
            .as_ref()
            .ok_or_else(|| WandError::not_connected(SessionState::Idle))?;
        let id = session.send(&self.input)?;

        self.pending = Some(PendingCommand {
            id,
            command: self.input.clone(),
        });
        Ok(id)
    }

    /// Next event from the current session; never resolves without one
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        match self.session.as_mut() {
            Some(session) => session.next_event().await,
            None => std::future::pending().await,
        }
    }

    /// Apply a session event to the visible state
    pub fn handle_event(&mut self, event: SessionEvent) {
        dispatch(self, event);
    }

    fn take_pending(&mut self, id: SendId) -> Option<PendingCommand> {
        match &self.pending {
            Some(pending) if pending.id == id => self.pending.take(),
            _ => None,
        }
    }
}

impl SessionHandler for Adapter {
    fn on_state(&mut self, state: SessionState) {
        self.indicator = match state {
            SessionState::Idle | SessionState::Closed => Indicator::Disconnected,
            SessionState::Connecting => Indicator::Connecting,
            SessionState::Ready => Indicator::Connected,
            SessionState::Closing => self.indicator,
            SessionState::Failed => Indicator::Failed,
        };

        if state.is_terminal() && self.pending.take().is_some() {
            tracing::debug!("Session ended with a command in flight; input kept");
        }
    }

    fn on_chunk(&mut self, text: &str) {
        self.transcript.push_str(text);
    }

    fn on_sent(&mut self, id: SendId, _bytes: usize) {
        let Some(pending) = self.take_pending(id) else {
            tracing::debug!(%id, "Ignoring confirmation for unknown command");
            return;
        };

        self.transcript
            .push_str(&format!("\n{}{}\n", ECHO_PROMPT, pending.command));
        if self.input == pending.command {
            self.input.clear();
        }
    }

    fn on_error(&mut self, error: &SessionError) {
        tracing::warn!("{}", error);
        self.last_error = Some(error.to_string());

        if let SessionError::Send { id, .. } = error {
            if self.take_pending(*id).is_some() {
                tracing::debug!(%id, "Send failed; input kept for retry");
            }
        }
    }
}
