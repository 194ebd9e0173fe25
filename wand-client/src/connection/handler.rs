//! Session event handler trait and dispatch

use super::session::{SendId, SessionError, SessionEvent, SessionState};

/// Trait for consumers of session events
pub trait SessionHandler {
    /// Called for every state transition, in order
    fn on_state(&mut self, state: SessionState);

    /// Called with decoded server output
    fn on_chunk(&mut self, text: &str);

    /// Called when a queued command has been written
    fn on_sent(&mut self, _id: SendId, _bytes: usize) {}

    /// Called when the session reports a failure
    fn on_error(&mut self, _error: &SessionError) {}
}

/// Route one event to the matching handler callback
pub fn dispatch<H: SessionHandler + ?Sized>(handler: &mut H, event: SessionEvent) {
    match event {
        SessionEvent::StateChanged(state) => handler.on_state(state),
        SessionEvent::Chunk(text) => handler.on_chunk(&text),
        SessionEvent::Sent { id, bytes } => handler.on_sent(id, bytes),
        SessionEvent::Error(error) => handler.on_error(&error),
    }
}
