//! The public connection handle.

use bytes::Bytes;
use log::debug;
use tokio::sync::{mpsc, oneshot, watch};

use super::{
    error::{ConnectError, SendError},
    manager::{Command, ConnectRequest, ConnectionManager, LinkState},
    observer::WebSocketObserver,
    tracing_config::TracingConfig,
};
use crate::{frame::MAX_CONTROL_PAYLOAD, message::Message, options::WebSocketOptions};

/// Handle to a client WebSocket connection.
///
/// Creating a handle spawns a manager task on the current Tokio runtime. The
/// handle is cheap to clone; every clone drives the same connection. When the
/// last clone is dropped the manager closes any live transport and exits.
///
/// Transport outcomes are reported to the [`WebSocketObserver`] passed to
/// [`connect`](Self::connect), not through return values.
///
/// # Examples
///
/// ```no_run
/// use websock::{CloseKind, WebSocketConnection, WebSocketObserver};
///
/// struct Printer;
///
/// impl WebSocketObserver for Printer {
///     fn on_open(&mut self) { println!("open"); }
///     fn on_close(&mut self, kind: CloseKind, reason: &str) { println!("{kind}: {reason}"); }
///     fn on_text_message(&mut self, payload: String) { println!("{payload}"); }
/// }
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let connection = WebSocketConnection::new();
/// connection.connect("ws://127.0.0.1:9000/echo", Printer).await?;
/// connection.send_text_message("hello")?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct WebSocketConnection {
    commands: mpsc::UnboundedSender<Command>,
    link: watch::Receiver<LinkState>,
}

impl Default for WebSocketConnection {
    fn default() -> Self { Self::new() }
}

impl WebSocketConnection {
    /// Create an idle connection with default tracing.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    #[must_use]
    pub fn new() -> Self { Self::with_tracing(TracingConfig::default()) }

    /// Create an idle connection with custom tracing.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    #[must_use]
    pub fn with_tracing(tracing: TracingConfig) -> Self {
        let (commands, commands_rx) = mpsc::unbounded_channel();
        let (link_tx, link) = watch::channel(LinkState::Down);
        tokio::spawn(ConnectionManager::new(commands_rx, link_tx, tracing).run());
        Self { commands, link }
    }

    /// Connect to `uri` with default options and no subprotocols.
    ///
    /// # Errors
    ///
    /// See [`connect_with`](Self::connect_with).
    pub async fn connect<O>(&self, uri: &str, observer: O) -> Result<(), ConnectError>
    where
        O: WebSocketObserver,
    {
        self.connect_with(uri, Vec::new(), observer, WebSocketOptions::default())
            .await
    }

    /// Connect to a `ws://` or `wss://` URI.
    ///
    /// Returns once the connect attempt has finished. A failed TCP or TLS
    /// connect is reported to the observer as
    /// [`CloseKind::CannotConnect`](super::CloseKind::CannotConnect); the
    /// handshake outcome arrives later as `on_open` or `on_close`.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectError::AlreadyConnected`] if a transport is open, a
    /// URI error if `uri` is unusable, or [`ConnectError::Closed`] if the
    /// manager has stopped.
    pub async fn connect_with<O>(
        &self,
        uri: &str,
        subprotocols: Vec<String>,
        observer: O,
        options: WebSocketOptions,
    ) -> Result<(), ConnectError>
    where
        O: WebSocketObserver,
    {
        let (reply, response) = oneshot::channel();
        let request = ConnectRequest {
            uri: uri.to_owned(),
            subprotocols,
            observer: Box::new(observer),
            options,
        };
        self.commands
            .send(Command::Connect { request, reply })
            .map_err(|_| ConnectError::Closed)?;
        response.await.map_err(|_| ConnectError::Closed)?
    }

    /// Start a graceful close. Automatic reconnection is cancelled.
    ///
    /// Once the close frame is queued, sends fail with
    /// [`SendError::Closing`] and anything already queued behind it is
    /// dropped.
    pub fn disconnect(&self) {
        if self.commands.send(Command::Disconnect).is_err() {
            debug!("disconnect ignored: connection manager has stopped");
        }
    }

    /// Reconnect to the last target if no transport is open.
    ///
    /// Returns `true` if a connect attempt was started.
    pub async fn reconnect(&self) -> bool {
        let (reply, response) = oneshot::channel();
        if self.commands.send(Command::Reconnect { reply }).is_err() {
            return false;
        }
        response.await.unwrap_or(false)
    }

    /// Send a text message.
    ///
    /// Messages sent after [`connect`](Self::connect) returns but before
    /// `on_open` are held until the server accepts the upgrade, and dropped
    /// if it refuses.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::NotConnected`] when no transport is open and
    /// [`SendError::Closing`] once the closing handshake has started.
    pub fn send_text_message(&self, payload: impl Into<String>) -> Result<(), SendError> {
        self.send(Message::Text(payload.into()))
    }

    /// Send pre-encoded UTF-8 bytes as a text message.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::NotConnected`] when no transport is open.
    pub fn send_raw_text_message(&self, payload: impl Into<Bytes>) -> Result<(), SendError> {
        self.send(Message::RawText(payload.into()))
    }

    /// Send a binary message.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::NotConnected`] when no transport is open.
    pub fn send_binary_message(&self, payload: impl Into<Bytes>) -> Result<(), SendError> {
        self.send(Message::Binary(payload.into()))
    }

    /// Send a ping. The matching pong is only logged.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::ControlPayloadTooLong`] for payloads over 125
    /// bytes and [`SendError::NotConnected`] when no transport is open.
    pub fn send_ping(&self, payload: impl Into<Bytes>) -> Result<(), SendError> {
        let payload = payload.into();
        if payload.len() > MAX_CONTROL_PAYLOAD {
            return Err(SendError::ControlPayloadTooLong(payload.len()));
        }
        self.send(Message::Ping(payload))
    }

    /// Whether a transport is currently open.
    #[must_use]
    pub fn is_connected(&self) -> bool { *self.link.borrow() != LinkState::Down }

    fn send(&self, message: Message) -> Result<(), SendError> {
        match *self.link.borrow() {
            LinkState::Down => return Err(SendError::NotConnected),
            LinkState::Closing => return Err(SendError::Closing),
            LinkState::Open => {}
        }
        self.commands
            .send(Command::Send(message))
            .map_err(|_| SendError::Closed)
    }
}
