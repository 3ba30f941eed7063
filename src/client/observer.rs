//! Application callbacks and close classification.

use std::fmt;

use bytes::Bytes;

/// Why a connection closed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CloseKind {
    /// Closed cleanly by either side.
    Normal,
    /// The TCP or TLS connection could not be established.
    CannotConnect,
    /// The transport failed after it was established.
    ConnectionLost,
    /// The server violated the WebSocket protocol.
    ProtocolError,
    /// A client-side fault, such as a worker panic.
    InternalError,
    /// The server answered the upgrade with an HTTP error.
    ServerError,
    /// The connection was lost and a reconnect is scheduled.
    Reconnect,
}

impl CloseKind {
    /// Upper-case name, also used as a metric label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "NORMAL",
            Self::CannotConnect => "CANNOT_CONNECT",
            Self::ConnectionLost => "CONNECTION_LOST",
            Self::ProtocolError => "PROTOCOL_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
            Self::ServerError => "SERVER_ERROR",
            Self::Reconnect => "RECONNECT",
        }
    }
}

impl fmt::Display for CloseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Receives connection lifecycle events and inbound messages.
///
/// Callbacks run on the connection's manager task, one at a time and in the
/// order the events occurred. A callback must not block; a panicking callback
/// is logged and otherwise ignored.
///
/// Only [`on_open`](Self::on_open), [`on_close`](Self::on_close) and
/// [`on_text_message`](Self::on_text_message) are required.
pub trait WebSocketObserver: Send + 'static {
    /// The opening handshake succeeded.
    fn on_open(&mut self);

    /// The connection closed. `reason` is a human-readable explanation.
    fn on_close(&mut self, kind: CloseKind, reason: &str);

    /// A text message arrived.
    fn on_text_message(&mut self, payload: String);

    /// A text message arrived and raw delivery is enabled.
    fn on_raw_text_message(&mut self, payload: Bytes) { let _ = payload; }

    /// A binary message arrived.
    fn on_binary_message(&mut self, payload: Bytes) { let _ = payload; }
}
