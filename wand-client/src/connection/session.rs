//! TCP session to the wand server
//!
//! The socket lives inside a single I/O task spawned by
//! [`Session::connect`]. That task performs the handshake, runs the
//! receive loop and executes queued writes; the [`Session`] handle only
//! talks to it through channels. State is published through a `watch`
//! channel and every transition is pushed onto the event channel while the
//! watch lock is held, so subscribers see transitions in the order they
//! happened.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::codec::{Decoder, Encoder};
use tokio_util::sync::CancellationToken;

use wand_protocol::{Endpoint, TextCodec, MAX_RECEIVE_LEN};
use wand_utils::{Result, WandError};

/// Default bound on the TCP handshake
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, connect not yet requested
    Idle,
    /// TCP handshake in progress
    Connecting,
    /// Connected; sends are accepted and the receive loop is running
    Ready,
    /// Peer closed its side; shutting down our write half
    Closing,
    /// Connect, send or receive failed
    Failed,
    /// Transport released
    Closed,
}

impl SessionState {
    /// `Closed` and `Failed` end the session's I/O
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Failed)
    }

    /// Legal edges of the session state machine
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;

        matches!(
            (self, next),
            (Idle, Connecting)
                | (Idle, Closed)
                | (Connecting, Ready)
                | (Connecting, Failed)
                | (Connecting, Closed)
                | (Ready, Closing)
                | (Ready, Failed)
                | (Ready, Closed)
                | (Closing, Closed)
                | (Closing, Failed)
                | (Failed, Closed)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Identifies one accepted [`Session::send`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SendId(pub(crate) u64);

impl fmt::Display for SendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Failures reported asynchronously by the I/O task
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("failed to connect to {endpoint}: {message}")]
    Connect { endpoint: String, message: String },

    #[error("connecting to {endpoint} timed out after {millis}ms")]
    ConnectTimeout { endpoint: String, millis: u64 },

    #[error("failed to send command {id}: {message}")]
    Send { id: SendId, message: String },

    #[error("failed to receive: {message}")]
    Receive { message: String },
}

/// Everything a session reports to its owner
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    StateChanged(SessionState),
    /// Decoded server output, in arrival order
    Chunk(String),
    /// A command was fully written to the socket
    Sent { id: SendId, bytes: usize },
    Error(SessionError),
}

/// Tunables for a session
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Bound on the TCP handshake
    pub connect_timeout: Duration,
    /// Most bytes requested by a single receive
    pub max_read_len: usize,
    /// Disable Nagle so short commands go out immediately
    pub nodelay: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_read_len: MAX_RECEIVE_LEN,
            nodelay: true,
        }
    }
}

enum Command {
    Send { id: SendId, text: String },
}

/// State shared between the handle and the I/O task
struct Shared {
    state: watch::Sender<SessionState>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl Shared {
    /// Apply `next` if the state machine allows it. Returns whether the
    /// state changed; the matching event is queued under the watch lock.
    fn transition(&self, next: SessionState) -> bool {
        self.transition_with(next, None)
    }

    /// Like [`Shared::transition`], queueing `cause` just ahead of the
    /// state event. A refused transition queues nothing.
    fn transition_with(&self, next: SessionState, cause: Option<SessionEvent>) -> bool {
        self.state.send_if_modified(|state| {
            if !state.can_transition_to(next) {
                tracing::trace!(from = %state, to = %next, "Ignoring session transition");
                return false;
            }

            tracing::debug!(from = %state, to = %next, "Session state changed");
            *state = next;
            if let Some(event) = cause {
                let _ = self.events.send(event);
            }
            let _ = self.events.send(SessionEvent::StateChanged(next));
            true
        })
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    /// Report `error` and move to `Failed`, unless the session already ended
    fn fail(&self, error: SessionError) {
        let message = error.to_string();
        if self.transition_with(SessionState::Failed, Some(SessionEvent::Error(error))) {
            tracing::warn!("Session failed: {}", message);
        } else {
            tracing::debug!("Dropping error from a finished session: {}", message);
        }
    }
}

/// Client session to one endpoint
///
/// Dropping the handle cancels the I/O task, which releases the socket.
pub struct Session {
    endpoint: Endpoint,
    options: SessionOptions,
    shared: Arc<Shared>,
    state_rx: watch::Receiver<SessionState>,
    events_rx: mpsc::UnboundedReceiver<SessionEvent>,
    commands: Option<mpsc::UnboundedSender<Command>>,
    cancel: CancellationToken,
    task_handle: Option<JoinHandle<()>>,
    next_send_id: AtomicU64,
}

impl Session {
    /// Create a session in the `Idle` state
    pub fn new(endpoint: Endpoint, options: SessionOptions) -> Self {
        let (state_tx, state_rx) = watch::channel(SessionState::Idle);
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Self {
            endpoint,
            options,
            shared: Arc::new(Shared {
                state: state_tx,
                events: events_tx,
            }),
            state_rx,
            events_rx,
            commands: None,
            cancel: CancellationToken::new(),
            task_handle: None,
            next_send_id: AtomicU64::new(0),
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Get current session state
    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    /// Receiver that observes every state change
    pub fn state_watch(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }

    /// Start connecting in the background
    ///
    /// Only valid from `Idle`. The outcome arrives as events: `Ready`
    /// followed by output chunks, or an error followed by `Failed`.
    pub fn connect(&mut self) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| WandError::internal(format!("No async runtime: {}", e)))?;

        if !self.shared.transition(SessionState::Connecting) {
            return Err(WandError::connection(format!(
                "cannot connect a session that is {}",
                self.state()
            )));
        }

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        self.commands = Some(commands_tx);

        tracing::info!(endpoint = %self.endpoint, "Connecting to server");

        let task = IoTask {
            endpoint: self.endpoint.clone(),
            options: self.options.clone(),
            shared: Arc::clone(&self.shared),
            cancel: self.cancel.clone(),
        };
        self.task_handle = Some(runtime.spawn(task.run(commands_rx)));

        Ok(())
    }

    /// Queue `text` as a single write
    ///
    /// Rejected without touching the socket when `text` is empty or the
    /// session is not `Ready`. Completion is reported as
    /// [`SessionEvent::Sent`] with the returned id.
    pub fn send(&self, text: &str) -> Result<SendId> {
        if text.is_empty() {
            return Err(WandError::EmptyCommand);
        }

        let state = self.state();
        if state != SessionState::Ready {
            tracing::debug!(%state, "Rejecting send on a session that is not ready");
            return Err(WandError::not_connected(state));
        }

        let commands = self
            .commands
            .as_ref()
            .ok_or_else(|| WandError::not_connected(state))?;

        let id = SendId(self.next_send_id.fetch_add(1, Ordering::Relaxed) + 1);
        commands
            .send(Command::Send {
                id,
                text: text.to_owned(),
            })
            .map_err(|_| WandError::ConnectionClosed)?;

        tracing::debug!(%id, bytes = text.len(), "Queued command");
        Ok(id)
    }

    /// Close the session. Safe to call any number of times from any state.
    pub fn disconnect(&mut self) {
        self.cancel.cancel();
        self.commands = None;

        if self.shared.transition(SessionState::Closed) {
            tracing::info!(endpoint = %self.endpoint, "Disconnected from server");
        }
    }

    /// Wait until the I/O task has exited and the socket is released
    pub async fn wait_released(&mut self) {
        if let Some(handle) = self.task_handle.take() {
            if let Err(e) = handle.await {
                tracing::error!("Session task ended abnormally: {}", e);
            }
        }
    }

    /// Receive the next event
    ///
    /// The handle keeps the channel open, so after a terminal state this
    /// waits forever; callers select it against other sources.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.events_rx.recv().await
    }

    /// Try to receive an event without waiting
    pub fn try_next_event(&mut self) -> Option<SessionEvent> {
        self.events_rx.try_recv().ok()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// What the receive loop does after handling one command
enum Flow {
    Continue,
    Stop,
}

/// The only owner of the socket
struct IoTask {
    endpoint: Endpoint,
    options: SessionOptions,
    shared: Arc<Shared>,
    cancel: CancellationToken,
}

impl IoTask {
    async fn run(self, mut commands: mpsc::UnboundedReceiver<Command>) {
        if let Some(stream) = self.establish().await {
            let (reader, writer) = stream.into_split();
            self.pump(&mut commands, reader, writer).await;
        }
        tracing::debug!(endpoint = %self.endpoint, "Session transport released");
    }

    async fn establish(&self) -> Option<TcpStream> {
        let attempt = tokio::time::timeout(
            self.options.connect_timeout,
            TcpStream::connect((self.endpoint.host(), self.endpoint.port())),
        );

        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                tracing::debug!(endpoint = %self.endpoint, "Connect cancelled by disconnect");
                return None;
            }
            result = attempt => result,
        };

        let stream = match result {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                self.shared.fail(SessionError::Connect {
                    endpoint: self.endpoint.to_string(),
                    message: e.to_string(),
                });
                return None;
            }
            Err(_) => {
                self.shared.fail(SessionError::ConnectTimeout {
                    endpoint: self.endpoint.to_string(),
                    millis: self.options.connect_timeout.as_millis() as u64,
                });
                return None;
            }
        };

        if self.options.nodelay {
            if let Err(e) = stream.set_nodelay(true) {
                tracing::warn!("Failed to set TCP_NODELAY: {}", e);
            }
        }

        // A disconnect that raced the handshake wins; the stream drops here
        if !self.shared.transition(SessionState::Ready) {
            tracing::debug!("Session closed while connecting");
            return None;
        }

        tracing::info!(endpoint = %self.endpoint, "Connected to server");
        Some(stream)
    }

    /// Receive loop. Exactly one read future exists per iteration, so at
    /// most one receive is ever outstanding.
    async fn pump(
        &self,
        commands: &mut mpsc::UnboundedReceiver<Command>,
        mut reader: OwnedReadHalf,
        mut writer: OwnedWriteHalf,
    ) {
        let mut codec = TextCodec::new();
        let mut inbound = BytesMut::new();
        let mut buf = vec![0u8; self.options.max_read_len.clamp(1, MAX_RECEIVE_LEN)];

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    tracing::debug!("Receive loop cancelled");
                    return;
                }
                Some(command) = commands.recv() => {
                    let Command::Send { id, text } = command;
                    if let Flow::Stop = self.write(&mut writer, &mut codec, id, &text).await {
                        return;
                    }
                }
                result = reader.read(&mut buf) => match result {
                    Ok(0) => {
                        self.peer_closed(&mut codec, &mut inbound, &mut writer).await;
                        return;
                    }
                    Ok(n) => {
                        tracing::trace!(bytes = n, "Received data from server");
                        inbound.extend_from_slice(&buf[..n]);
                        match codec.decode(&mut inbound) {
                            Ok(Some(text)) => self.shared.emit(SessionEvent::Chunk(text)),
                            Ok(None) => {}
                            Err(e) => {
                                self.shared.fail(SessionError::Receive {
                                    message: e.to_string(),
                                });
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        self.shared.fail(SessionError::Receive {
                            message: e.to_string(),
                        });
                        return;
                    }
                }
            }
        }
    }

    async fn write(
        &self,
        writer: &mut OwnedWriteHalf,
        codec: &mut TextCodec,
        id: SendId,
        text: &str,
    ) -> Flow {
        let mut frame = BytesMut::with_capacity(text.len());
        if let Err(e) = codec.encode(text, &mut frame) {
            self.shared.fail(SessionError::Send {
                id,
                message: e.to_string(),
            });
            return Flow::Stop;
        }

        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                tracing::debug!(%id, "Send abandoned by disconnect");
                return Flow::Stop;
            }
            result = async {
                writer.write_all(&frame).await?;
                writer.flush().await
            } => result,
        };

        match result {
            Ok(()) => {
                tracing::debug!(%id, bytes = frame.len(), "Sent command");
                self.shared.emit(SessionEvent::Sent {
                    id,
                    bytes: frame.len(),
                });
                Flow::Continue
            }
            Err(e) => {
                self.shared.fail(SessionError::Send {
                    id,
                    message: e.to_string(),
                });
                Flow::Stop
            }
        }
    }

    async fn peer_closed(
        &self,
        codec: &mut TextCodec,
        inbound: &mut BytesMut,
        writer: &mut OwnedWriteHalf,
    ) {
        if let Ok(Some(text)) = codec.decode_eof(inbound) {
            self.shared.emit(SessionEvent::Chunk(text));
        }

        tracing::info!(endpoint = %self.endpoint, "Server closed connection");

        if self.shared.transition(SessionState::Closing) {
            if let Err(e) = writer.shutdown().await {
                tracing::debug!("Write half shutdown failed: {}", e);
            }
            self.shared.transition(SessionState::Closed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    const WAIT: Duration = Duration::from_secs(5);

    async fn listener() -> (TcpListener, Endpoint) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, Endpoint::new("127.0.0.1", port).unwrap())
    }

    async fn next_event(session: &mut Session) -> SessionEvent {
        tokio::time::timeout(WAIT, session.next_event())
            .await
            .expect("timed out waiting for session event")
            .expect("event channel closed")
    }

    async fn wait_for_state(session: &Session, wanted: SessionState) {
        let mut watch = session.state_watch();
        tokio::time::timeout(WAIT, watch.wait_for(|s| *s == wanted))
            .await
            .expect("timed out waiting for state")
            .unwrap();
    }

    /// Connected session plus the server side of the socket
    async fn connected() -> (Session, TcpStream) {
        let (listener, endpoint) = listener().await;
        let mut session = Session::new(endpoint, SessionOptions::default());
        session.connect().unwrap();
        let (server, _) = listener.accept().await.unwrap();
        wait_for_state(&session, SessionState::Ready).await;
        (session, server)
    }

    /// Drain events until `expected` bytes of text have arrived
    async fn collect_text(session: &mut Session, expected: usize) -> String {
        let mut text = String::new();
        while text.len() < expected {
            if let SessionEvent::Chunk(chunk) = next_event(session).await {
                text.push_str(&chunk);
            }
        }
        text
    }

    #[test]
    fn test_transition_table() {
        use SessionState::*;

        assert!(Idle.can_transition_to(Connecting));
        assert!(Connecting.can_transition_to(Ready));
        assert!(Ready.can_transition_to(Closing));
        assert!(Closing.can_transition_to(Closed));
        assert!(Failed.can_transition_to(Closed));

        assert!(!Idle.can_transition_to(Ready));
        assert!(!Closed.can_transition_to(Closed));
        assert!(!Closed.can_transition_to(Connecting));
        assert!(!Failed.can_transition_to(Ready));
    }

    #[test]
    fn test_terminal_states() {
        assert!(SessionState::Closed.is_terminal());
        assert!(SessionState::Failed.is_terminal());
        assert!(!SessionState::Ready.is_terminal());
        assert!(!SessionState::Closing.is_terminal());
    }

    #[test]
    fn test_initial_state_idle() {
        let session = Session::new(Endpoint::default(), SessionOptions::default());
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.endpoint(), &Endpoint::default());
    }

    #[test]
    fn test_connect_without_runtime_is_rejected() {
        let mut session = Session::new(Endpoint::default(), SessionOptions::default());
        assert!(session.connect().is_err());
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_send_when_idle_is_rejected() {
        let mut session = Session::new(Endpoint::default(), SessionOptions::default());

        let err = session.send("ls\n").unwrap_err();
        assert!(matches!(err, WandError::NotConnected { .. }));
        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.try_next_event().is_none());
    }

    #[tokio::test]
    async fn test_connect_unreachable_fails() {
        let (listener, endpoint) = listener().await;
        drop(listener);

        let mut session = Session::new(endpoint, SessionOptions::default());
        session.connect().unwrap();

        assert_eq!(
            next_event(&mut session).await,
            SessionEvent::StateChanged(SessionState::Connecting)
        );
        assert!(matches!(
            next_event(&mut session).await,
            SessionEvent::Error(SessionError::Connect { .. })
        ));
        assert_eq!(
            next_event(&mut session).await,
            SessionEvent::StateChanged(SessionState::Failed)
        );

        // The task exits without ever posting a receive
        session.wait_released().await;
        assert_eq!(session.state(), SessionState::Failed);
        assert!(session.try_next_event().is_none());
    }

    #[tokio::test]
    async fn test_connect_twice_is_rejected() {
        let (_listener, endpoint) = listener().await;
        let mut session = Session::new(endpoint, SessionOptions::default());

        session.connect().unwrap();
        assert!(session.connect().is_err());
        assert_eq!(session.state(), SessionState::Connecting);
    }

    #[tokio::test]
    async fn test_send_writes_exact_bytes() {
        let (mut session, mut server) = connected().await;

        let id = session.send("ls\n").unwrap();

        let mut received = [0u8; 3];
        server.read_exact(&mut received).await.unwrap();
        assert_eq!(received, [0x6c, 0x73, 0x0a]);

        loop {
            match next_event(&mut session).await {
                SessionEvent::Sent { id: sent, bytes } => {
                    assert_eq!(sent, id);
                    assert_eq!(bytes, 3);
                    break;
                }
                SessionEvent::StateChanged(_) => {}
                other => panic!("unexpected event: {:?}", other),
            }
        }
        assert_eq!(session.state(), SessionState::Ready);
    }

    #[tokio::test]
    async fn test_send_empty_is_rejected() {
        let (session, _server) = connected().await;

        assert!(matches!(session.send(""), Err(WandError::EmptyCommand)));
        assert_eq!(session.state(), SessionState::Ready);
    }

    #[tokio::test]
    async fn test_send_ids_increase() {
        let (session, _server) = connected().await;

        let first = session.send("a").unwrap();
        let second = session.send("b").unwrap();
        assert!(second > first);
    }

    #[tokio::test]
    async fn test_chunks_concatenate_in_order() {
        let (mut session, mut server) = connected().await;

        server.write_all(b"he").await.unwrap();
        server.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        server.write_all(b"llo").await.unwrap();

        assert_eq!(collect_text(&mut session, 5).await, "hello");
    }

    #[tokio::test]
    async fn test_multibyte_split_across_reads() {
        let (mut session, mut server) = connected().await;

        server.write_all(b"caf\xC3").await.unwrap();
        server.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        server.write_all(b"\xA9").await.unwrap();

        assert_eq!(collect_text(&mut session, "café".len()).await, "café");
    }

    #[tokio::test]
    async fn test_small_reads_preserve_order() {
        let (listener, endpoint) = listener().await;
        let options = SessionOptions {
            max_read_len: 3,
            ..SessionOptions::default()
        };
        let mut session = Session::new(endpoint, options);
        session.connect().unwrap();
        let (mut server, _) = listener.accept().await.unwrap();

        let payload = "0123456789abcdefghij".repeat(50);
        server.write_all(payload.as_bytes()).await.unwrap();

        assert_eq!(collect_text(&mut session, payload.len()).await, payload);
    }

    #[tokio::test]
    async fn test_peer_close_transitions_to_closed() {
        let (mut session, mut server) = connected().await;

        server.write_all(b"bye").await.unwrap();
        drop(server);

        let mut text = String::new();
        let mut states = Vec::new();
        while !states.contains(&SessionState::Closed) {
            match next_event(&mut session).await {
                SessionEvent::Chunk(chunk) => text.push_str(&chunk),
                SessionEvent::StateChanged(state) => states.push(state),
                other => panic!("unexpected event: {:?}", other),
            }
        }

        assert_eq!(text, "bye");
        assert_eq!(
            states,
            vec![
                SessionState::Connecting,
                SessionState::Ready,
                SessionState::Closing,
                SessionState::Closed,
            ]
        );

        session.wait_released().await;
        assert!(matches!(
            session.send("ls\n"),
            Err(WandError::NotConnected { .. })
        ));
    }

    #[tokio::test]
    async fn test_disconnect_twice_is_noop() {
        let (mut session, mut server) = connected().await;

        session.disconnect();
        session.disconnect();
        assert_eq!(session.state(), SessionState::Closed);

        let mut closed = 0;
        while let Some(event) = session.try_next_event() {
            if event == SessionEvent::StateChanged(SessionState::Closed) {
                closed += 1;
            }
        }
        assert_eq!(closed, 1);

        // The server sees EOF once the transport is released
        session.wait_released().await;
        let mut buf = [0u8; 1];
        assert_eq!(server.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_disconnect_from_idle() {
        let mut session = Session::new(Endpoint::default(), SessionOptions::default());

        session.disconnect();
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(
            session.try_next_event(),
            Some(SessionEvent::StateChanged(SessionState::Closed))
        );

        session.disconnect();
        assert!(session.try_next_event().is_none());
        assert!(session.connect().is_err());
    }

    #[tokio::test]
    async fn test_disconnect_while_connecting() {
        let (_listener, endpoint) = listener().await;
        let mut session = Session::new(endpoint, SessionOptions::default());

        session.connect().unwrap();
        session.disconnect();
        session.wait_released().await;

        assert_eq!(session.state(), SessionState::Closed);
        let events: Vec<_> = std::iter::from_fn(|| session.try_next_event()).collect();
        assert_eq!(
            events,
            vec![
                SessionEvent::StateChanged(SessionState::Connecting),
                SessionEvent::StateChanged(SessionState::Closed),
            ]
        );
    }

    #[tokio::test]
    async fn test_drop_releases_transport() {
        let (session, mut server) = connected().await;

        drop(session);

        let mut buf = [0u8; 1];
        let read = tokio::time::timeout(WAIT, server.read(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(read, 0);
    }

    #[tokio::test]
    async fn test_connect_timeout_fails() {
        // A listener whose accept queue is full drops further SYNs
        let socket = tokio::net::TcpSocket::new_v4().unwrap();
        socket.bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let listener = socket.listen(1).unwrap();
        let addr = listener.local_addr().unwrap();

        let mut backlog = Vec::new();
        for _ in 0..16 {
            match tokio::time::timeout(Duration::from_millis(200), TcpStream::connect(addr)).await
            {
                Ok(Ok(stream)) => backlog.push(stream),
                _ => break,
            }
        }
        assert!(backlog.len() < 16, "accept queue never filled");

        let options = SessionOptions {
            connect_timeout: Duration::from_millis(250),
            ..SessionOptions::default()
        };
        let mut session = Session::new(Endpoint::new("127.0.0.1", addr.port()).unwrap(), options);
        session.connect().unwrap();

        assert_eq!(
            next_event(&mut session).await,
            SessionEvent::StateChanged(SessionState::Connecting)
        );
        assert!(matches!(
            next_event(&mut session).await,
            SessionEvent::Error(SessionError::ConnectTimeout { millis: 250, .. })
        ));
        assert_eq!(
            next_event(&mut session).await,
            SessionEvent::StateChanged(SessionState::Failed)
        );

        session.wait_released().await;
        assert!(session.try_next_event().is_none());
    }

    #[tokio::test]
    async fn test_reset_by_peer_fails_receive() {
        let (mut session, server) = connected().await;

        // Linger 0 turns close into a RST
        server.set_linger(Some(Duration::ZERO)).unwrap();
        drop(server);

        let mut events = Vec::new();
        while !events.contains(&SessionEvent::StateChanged(SessionState::Failed)) {
            events.push(next_event(&mut session).await);
        }

        assert_eq!(
            events[..2],
            [
                SessionEvent::StateChanged(SessionState::Connecting),
                SessionEvent::StateChanged(SessionState::Ready),
            ]
        );
        assert!(matches!(
            events[2],
            SessionEvent::Error(SessionError::Receive { .. })
        ));
        assert_eq!(events.len(), 4);

        session.wait_released().await;
        assert!(matches!(
            session.send("ls\n"),
            Err(WandError::NotConnected { .. })
        ));
    }

    #[test]
    fn test_failure_after_close_is_not_reported() {
        let (state, _state_rx) = watch::channel(SessionState::Ready);
        let (events, mut events_rx) = mpsc::unbounded_channel();
        let shared = Shared { state, events };

        assert!(shared.transition(SessionState::Closed));
        shared.fail(SessionError::Receive {
            message: "reset".into(),
        });

        assert_eq!(
            events_rx.try_recv().unwrap(),
            SessionEvent::StateChanged(SessionState::Closed)
        );
        assert!(events_rx.try_recv().is_err());
        assert_eq!(*shared.state.borrow(), SessionState::Closed);
    }

    #[test]
    fn test_failure_reports_error_before_state() {
        let (state, _state_rx) = watch::channel(SessionState::Ready);
        let (events, mut events_rx) = mpsc::unbounded_channel();
        let shared = Shared { state, events };

        shared.fail(SessionError::Receive {
            message: "reset".into(),
        });

        assert!(matches!(
            events_rx.try_recv().unwrap(),
            SessionEvent::Error(SessionError::Receive { .. })
        ));
        assert_eq!(
            events_rx.try_recv().unwrap(),
            SessionEvent::StateChanged(SessionState::Failed)
        );
    }

    #[test]
    fn test_session_error_display() {
        let err = SessionError::ConnectTimeout {
            endpoint: "10.0.0.1:8080".into(),
            millis: 500,
        };
        assert_eq!(
            err.to_string(),
            "connecting to 10.0.0.1:8080 timed out after 500ms"
        );
        assert_eq!(SendId(7).to_string(), "#7");
    }
}
