//! WebSocket frame model.
//!
//! A [`Frame`] is a single, unfragmented RFC 6455 frame after unmasking. The
//! codec in [`crate::codec`] converts between frames and wire bytes; this
//! module only describes what a frame carries.

use bytes::{BufMut, Bytes, BytesMut};

use crate::codec::FramingError;

/// Largest payload a control frame (close, ping, pong) may carry.
pub const MAX_CONTROL_PAYLOAD: usize = 125;

/// Close status code for a normal closure.
pub const CLOSE_NORMAL: u16 = 1000;

/// Frame opcode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpCode {
    /// Continuation of a fragmented message (`0x0`).
    Continuation,
    /// UTF-8 text data (`0x1`).
    Text,
    /// Binary data (`0x2`).
    Binary,
    /// Connection close (`0x8`).
    Close,
    /// Ping (`0x9`).
    Ping,
    /// Pong (`0xA`).
    Pong,
}

impl OpCode {
    /// Wire value of this opcode.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::Continuation => 0x0,
            Self::Text => 0x1,
            Self::Binary => 0x2,
            Self::Close => 0x8,
            Self::Ping => 0x9,
            Self::Pong => 0xA,
        }
    }

    /// Parse a wire opcode, returning `None` for reserved values.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x0 => Some(Self::Continuation),
            0x1 => Some(Self::Text),
            0x2 => Some(Self::Binary),
            0x8 => Some(Self::Close),
            0x9 => Some(Self::Ping),
            0xA => Some(Self::Pong),
            _ => None,
        }
    }

    /// Whether this opcode denotes a control frame.
    #[must_use]
    pub const fn is_control(self) -> bool { matches!(self, Self::Close | Self::Ping | Self::Pong) }
}

/// A complete, unmasked frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    /// Frame opcode.
    pub opcode: OpCode,
    /// Unmasked payload bytes.
    pub payload: Bytes,
}

impl Frame {
    /// Build a frame from an opcode and payload.
    pub fn new(opcode: OpCode, payload: impl Into<Bytes>) -> Self {
        Self {
            opcode,
            payload: payload.into(),
        }
    }

    /// Text frame carrying `text` as UTF-8.
    #[must_use]
    pub fn text(text: String) -> Self { Self::new(OpCode::Text, text.into_bytes()) }

    /// Binary frame.
    pub fn binary(payload: impl Into<Bytes>) -> Self { Self::new(OpCode::Binary, payload) }

    /// Ping frame.
    pub fn ping(payload: impl Into<Bytes>) -> Self { Self::new(OpCode::Ping, payload) }

    /// Pong frame.
    pub fn pong(payload: impl Into<Bytes>) -> Self { Self::new(OpCode::Pong, payload) }

    /// Close frame carrying the encoded form of `close`.
    #[must_use]
    pub fn close(close: &CloseFrame) -> Self { Self::new(OpCode::Close, close.encode()) }
}

/// Status code and reason carried by a close frame.
///
/// An empty close payload is represented by `code == None` and an empty
/// reason.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CloseFrame {
    /// Close status code, absent when the payload was empty.
    pub code: Option<u16>,
    /// UTF-8 close reason.
    pub reason: String,
}

impl CloseFrame {
    /// Close frame with status [`CLOSE_NORMAL`] and no reason.
    #[must_use]
    pub fn normal() -> Self {
        Self {
            code: Some(CLOSE_NORMAL),
            reason: String::new(),
        }
    }

    /// Close frame with the given status code and reason.
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            reason: reason.into(),
        }
    }

    /// Parse a close payload.
    ///
    /// # Errors
    ///
    /// Returns [`FramingError::TruncatedCloseCode`] for a one-byte payload and
    /// [`FramingError::InvalidCloseReason`] when the reason is not UTF-8.
    pub fn parse(payload: &[u8]) -> Result<Self, FramingError> {
        match payload {
            [] => Ok(Self::default()),
            [_] => Err(FramingError::TruncatedCloseCode),
            [hi, lo, reason @ ..] => {
                let reason = std::str::from_utf8(reason)
                    .map_err(|_| FramingError::InvalidCloseReason)?
                    .to_owned();
                Ok(Self {
                    code: Some(u16::from_be_bytes([*hi, *lo])),
                    reason,
                })
            }
        }
    }

    /// Encode as a close payload: big-endian status code followed by the
    /// reason. A frame without a code encodes to an empty payload.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let Some(code) = self.code else {
            return Bytes::new();
        };
        let mut buf = BytesMut::with_capacity(2 + self.reason.len());
        buf.put_u16(code);
        buf.put_slice(self.reason.as_bytes());
        buf.freeze()
    }
}
