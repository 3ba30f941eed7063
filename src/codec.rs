//! RFC 6455 frame codec.
//!
//! [`FrameCodec`] implements `tokio_util`'s [`Decoder`] and [`Encoder`] for
//! single, unfragmented frames. The [`Role`] decides which side masks: a
//! client masks everything it sends and rejects masked input, a server does
//! the opposite.
//!
//! Decoding validates the header before waiting for the payload so a
//! malformed frame is reported as soon as its first bytes arrive.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::frame::{Frame, MAX_CONTROL_PAYLOAD, OpCode};

pub mod error;

pub use error::{CodecError, FramingError};

/// Smallest permitted inbound payload limit.
pub const MIN_PAYLOAD_LIMIT: usize = MAX_CONTROL_PAYLOAD;

/// Largest permitted inbound payload limit (16 MiB).
pub const MAX_PAYLOAD_LIMIT: usize = 16 * 1024 * 1024;

/// Default inbound payload limit (128 KiB).
pub const DEFAULT_PAYLOAD_LIMIT: usize = 128 * 1024;

/// Upper bound on the size of a frame header.
pub const MAX_HEADER_LEN: usize = 14;

const FIN_BIT: u8 = 0x80;
const RSV_BITS: u8 = 0x70;
const OPCODE_BITS: u8 = 0x0F;
const MASK_BIT: u8 = 0x80;
const LEN_BITS: u8 = 0x7F;
const LEN_16: u8 = 126;
const LEN_64: u8 = 127;

pub(crate) fn clamp_payload_limit(value: usize) -> usize {
    value.clamp(MIN_PAYLOAD_LIMIT, MAX_PAYLOAD_LIMIT)
}

/// Which end of the connection a codec serves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    /// Masks outbound frames; inbound frames must be unmasked.
    Client,
    /// Sends unmasked frames; inbound frames must be masked.
    Server,
}

impl Role {
    const fn masks_outbound(self) -> bool { matches!(self, Self::Client) }
}

/// Frame encoder and decoder.
#[derive(Clone, Debug)]
pub struct FrameCodec {
    role: Role,
    max_payload: usize,
}

impl FrameCodec {
    /// Create a codec for `role`, clamping `max_payload` to
    /// [`MIN_PAYLOAD_LIMIT`]..=[`MAX_PAYLOAD_LIMIT`].
    #[must_use]
    pub fn new(role: Role, max_payload: usize) -> Self {
        Self {
            role,
            max_payload: clamp_payload_limit(max_payload),
        }
    }

    /// Client-side codec.
    #[must_use]
    pub fn client(max_payload: usize) -> Self { Self::new(Role::Client, max_payload) }

    /// Server-side codec.
    #[must_use]
    pub fn server(max_payload: usize) -> Self { Self::new(Role::Server, max_payload) }

    /// Role this codec was built for.
    #[must_use]
    pub const fn role(&self) -> Role { self.role }

    /// Inbound payload limit after clamping.
    #[must_use]
    pub const fn max_payload(&self) -> usize { self.max_payload }
}

/// XOR `buf` with the four-byte masking `key`, in place.
///
/// Masking is an involution: applying the same key twice restores the input.
pub fn apply_mask(buf: &mut [u8], key: [u8; 4]) {
    for (byte, k) in buf.iter_mut().zip(key.iter().cycle()) {
        *byte ^= k;
    }
}

/// Encode `frame` into `dst`, masking the payload when `mask` is given.
///
/// The FIN bit is always set and the RSV bits are always clear.
///
/// # Errors
///
/// Returns [`FramingError::ControlFrameTooLong`] if a control frame payload
/// exceeds 125 bytes.
pub fn encode_frame(
    frame: &Frame,
    mask: Option<[u8; 4]>,
    dst: &mut BytesMut,
) -> Result<(), FramingError> {
    let payload_len = frame.payload.len();
    if frame.opcode.is_control() && payload_len > MAX_CONTROL_PAYLOAD {
        return Err(FramingError::ControlFrameTooLong(payload_len as u64));
    }

    dst.reserve(MAX_HEADER_LEN + payload_len);
    dst.put_u8(FIN_BIT | frame.opcode.as_u8());

    let mask_bit = if mask.is_some() { MASK_BIT } else { 0 };
    if let Ok(len) = u8::try_from(payload_len)
        && len < LEN_16
    {
        dst.put_u8(mask_bit | len);
    } else if let Ok(len) = u16::try_from(payload_len) {
        dst.put_u8(mask_bit | LEN_16);
        dst.put_u16(len);
    } else {
        dst.put_u8(mask_bit | LEN_64);
        dst.put_u64(payload_len as u64);
    }

    match mask {
        Some(key) => {
            dst.put_slice(&key);
            let start = dst.len();
            dst.extend_from_slice(&frame.payload);
            apply_mask(&mut dst[start..], key);
        }
        None => dst.extend_from_slice(&frame.payload),
    }
    Ok(())
}

/// Parsed fixed part of a frame header.
struct Header {
    opcode: OpCode,
    masked: bool,
    header_len: usize,
    payload_len: u64,
}

impl FrameCodec {
    /// Parse and validate the header at the start of `src`.
    ///
    /// Returns `Ok(None)` when more bytes are needed to read the length.
    fn parse_header(&self, src: &[u8]) -> Result<Option<Header>, FramingError> {
        let [b0, b1, ..] = *src else {
            return Ok(None);
        };

        if b0 & RSV_BITS != 0 {
            return Err(FramingError::ReservedBits);
        }
        let raw_opcode = b0 & OPCODE_BITS;
        let opcode = OpCode::from_u8(raw_opcode).ok_or(FramingError::UnknownOpcode(raw_opcode))?;

        let masked = b1 & MASK_BIT != 0;
        match (self.role, masked) {
            (Role::Client, true) => return Err(FramingError::UnexpectedMask),
            (Role::Server, false) => return Err(FramingError::MissingMask),
            _ => {}
        }

        let fin = b0 & FIN_BIT != 0;
        if !fin || opcode == OpCode::Continuation {
            return Err(FramingError::Fragmented { opcode: raw_opcode });
        }

        let mut rest = &src[2..];
        let (header_len, payload_len) = match b1 & LEN_BITS {
            LEN_16 => {
                if rest.len() < 2 {
                    return Ok(None);
                }
                (4, u64::from(rest.get_u16()))
            }
            LEN_64 => {
                if rest.len() < 8 {
                    return Ok(None);
                }
                let len = rest.get_u64();
                if len & (1 << 63) != 0 {
                    return Err(FramingError::InvalidLength);
                }
                (10, len)
            }
            len => (2, u64::from(len)),
        };

        if opcode.is_control() && payload_len > MAX_CONTROL_PAYLOAD as u64 {
            return Err(FramingError::ControlFrameTooLong(payload_len));
        }
        if payload_len > self.max_payload as u64 {
            return Err(FramingError::OversizedPayload {
                size: payload_len,
                max: self.max_payload,
            });
        }

        Ok(Some(Header {
            opcode,
            masked,
            header_len,
            payload_len,
        }))
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(header) = self.parse_header(src)? else {
            return Ok(None);
        };

        // Bounded by `max_payload`, which always fits in usize.
        let payload_len =
            usize::try_from(header.payload_len).map_err(|_| FramingError::OversizedPayload {
                size: header.payload_len,
                max: self.max_payload,
            })?;
        let mask_len = if header.masked { 4 } else { 0 };
        let total = header.header_len + mask_len + payload_len;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        let mut frame_bytes = src.split_to(total);
        frame_bytes.advance(header.header_len);
        if header.masked {
            let mut key = [0_u8; 4];
            frame_bytes.copy_to_slice(&mut key);
            apply_mask(&mut frame_bytes, key);
        }

        Ok(Some(Frame {
            opcode: header.opcode,
            payload: frame_bytes.freeze(),
        }))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let mask = self.role.masks_outbound().then(rand::random::<[u8; 4]>);
        encode_frame(&item, mask, dst)?;
        Ok(())
    }
}
