//! Error types for the frame codec.
//!
//! [`FramingError`] covers every way a byte stream can violate RFC 6455
//! framing rules. [`CodecError`] wraps it together with transport I/O
//! failures so the codec can satisfy `tokio_util`'s `From<io::Error>` bound.

use std::io;

use thiserror::Error;

/// Wire-level framing violations.
///
/// Every variant maps to a protocol violation at the connection layer.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FramingError {
    /// Declared payload length exceeds the configured maximum.
    #[error("payload exceeds max length: {size} > {max}")]
    OversizedPayload {
        /// Payload length declared by the header.
        size: u64,
        /// Maximum permitted payload length.
        max: usize,
    },

    /// One of RSV1..RSV3 is set although no extension was negotiated.
    #[error("reserved header bits set without a negotiated extension")]
    ReservedBits,

    /// Opcode is one of the reserved values.
    #[error("unknown opcode: {0:#x}")]
    UnknownOpcode(u8),

    /// Frame is part of a fragmented message (FIN clear or continuation).
    #[error("fragmented frames are not supported (opcode {opcode:#x})")]
    Fragmented {
        /// Opcode of the offending frame.
        opcode: u8,
    },

    /// Control frame payload is longer than 125 bytes.
    #[error("control frame payload too long: {0} bytes")]
    ControlFrameTooLong(u64),

    /// Frame from the server carried a masking key.
    #[error("server frames must not be masked")]
    UnexpectedMask,

    /// Frame from a client arrived unmasked.
    #[error("client frames must be masked")]
    MissingMask,

    /// 64-bit extended length has its most significant bit set.
    #[error("invalid 64-bit payload length")]
    InvalidLength,

    /// Close payload of exactly one byte.
    #[error("close payload too short for a status code")]
    TruncatedCloseCode,

    /// Close reason is not valid UTF-8.
    #[error("close reason is not valid UTF-8")]
    InvalidCloseReason,
}

/// Top-level codec error.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Framing rule violation.
    #[error("framing error: {0}")]
    Framing(#[from] FramingError),

    /// Transport I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl CodecError {
    /// Short label for the error category, used in logs and metrics.
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Framing(_) => "framing",
            Self::Io(_) => "io",
        }
    }

    /// Whether this error is a protocol violation rather than a transport
    /// failure.
    #[must_use]
    pub fn is_protocol_violation(&self) -> bool { matches!(self, Self::Framing(_)) }
}

impl From<CodecError> for io::Error {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Io(e) => e,
            CodecError::Framing(e) => io::Error::new(io::ErrorKind::InvalidData, e),
        }
    }
}
