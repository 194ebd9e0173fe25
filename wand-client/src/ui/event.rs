//! Event handling for the application
//!
//! Typed lines arrive from a reader thread; session events are pulled from
//! the adapter by the main loop. Both end up as [`AppEvent`]s.

use std::io::BufRead;

use tokio::sync::mpsc;

use crate::connection::SessionEvent;

/// Application events combining input and session activity
#[derive(Debug)]
pub enum AppEvent {
    /// One typed line, without its terminator
    Input(String),
    /// The input stream ended
    InputClosed,
    /// Event from the current session
    Session(SessionEvent),
}

/// Event handler that owns the input channel
pub struct EventHandler {
    tx: mpsc::UnboundedSender<AppEvent>,
    rx: mpsc::UnboundedReceiver<AppEvent>,
}

impl EventHandler {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx }
    }

    /// Get a sender clone for injecting events
    pub fn sender(&self) -> mpsc::UnboundedSender<AppEvent> {
        self.tx.clone()
    }

    /// Read lines from `reader` on a background thread
    ///
    /// Runs on a detached thread: a blocking stdin read cannot be
    /// cancelled and must not hold up runtime shutdown.
    pub fn start_input_reading<R>(&self, reader: R)
    where
        R: BufRead + Send + 'static,
    {
        let tx = self.tx.clone();

        std::thread::spawn(move || {
            for line in reader.lines() {
                match line {
                    Ok(line) => {
                        if tx.send(AppEvent::Input(line)).is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        tracing::error!("Error reading input: {}", e);
                        break;
                    }
                }
            }
            let _ = tx.send(AppEvent::InputClosed);
        });
    }

    /// Receive next event
    pub async fn next(&mut self) -> Option<AppEvent> {
        self.rx.recv().await
    }
}

impl Default for EventHandler {
    fn default() -> Self {
        Self::new()
    }
}
