#![doc(html_root_url = "https://docs.rs/websock/latest")]
//! Client-side WebSocket (RFC 6455) connections.
//!
//! A [`WebSocketConnection`] opens a `ws://` or `wss://` URI, performs the
//! opening handshake and delivers inbound messages and lifecycle events to a
//! [`WebSocketObserver`]. Lost connections can be re-established
//! automatically after a configurable interval.
//!
//! The lower layers are public as well: [`codec::FrameCodec`] is a
//! `tokio_util` codec for unfragmented frames and [`handshake`] renders and
//! validates the HTTP upgrade.

pub mod client;
pub mod codec;
pub mod frame;
pub mod handshake;
pub mod message;
pub mod metrics;
pub mod options;
pub mod panic;

pub use client::{
    CloseKind,
    ConnectError,
    ConnectorError,
    SendError,
    TracingConfig,
    WebSocketConnection,
    WebSocketObserver,
};
pub use codec::{CodecError, FrameCodec, FramingError, Role};
pub use frame::{CloseFrame, Frame, OpCode};
pub use message::Message;
pub use options::WebSocketOptions;
