//! Messages exchanged between the connection manager, the reader and the
//! writer.
//!
//! The writer consumes the outbound variants, the reader produces the inbound
//! ones, and [`Message::Quit`] stops the writer. Each value is moved across
//! exactly one channel.

use bytes::Bytes;

use crate::{frame::CloseFrame, handshake::HandshakeRequest};

/// A unit of work for the writer or a signal from the reader.
#[derive(Debug)]
pub enum Message {
    /// Opening handshake request; written once, before any frame.
    ClientHandshake(HandshakeRequest),
    /// Outcome of the server's handshake response.
    ServerHandshake {
        /// Whether the server accepted the upgrade.
        success: bool,
        /// Subprotocol the server selected, if any.
        subprotocol: Option<String>,
    },
    /// Text message as a decoded string.
    Text(String),
    /// Text message as undecoded UTF-8 bytes.
    RawText(Bytes),
    /// Binary message.
    Binary(Bytes),
    /// Ping with its payload.
    Ping(Bytes),
    /// Pong with its payload.
    Pong(Bytes),
    /// Close frame.
    Close(CloseFrame),
    /// The transport failed or reached end of stream.
    ConnectionLost,
    /// The peer broke the protocol.
    ProtocolViolation(String),
    /// An internal fault such as a worker panic.
    Error(String),
    /// The server rejected the upgrade with an HTTP status.
    ServerError {
        /// HTTP status code.
        status: u16,
        /// Reason phrase.
        reason: String,
    },
    /// Stop the writer.
    Quit,
}

impl Message {
    /// Short variant name for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ClientHandshake(_) => "client_handshake",
            Self::ServerHandshake { .. } => "server_handshake",
            Self::Text(_) => "text",
            Self::RawText(_) => "raw_text",
            Self::Binary(_) => "binary",
            Self::Ping(_) => "ping",
            Self::Pong(_) => "pong",
            Self::Close(_) => "close",
            Self::ConnectionLost => "connection_lost",
            Self::ProtocolViolation(_) => "protocol_violation",
            Self::Error(_) => "error",
            Self::ServerError { .. } => "server_error",
            Self::Quit => "quit",
        }
    }
}
