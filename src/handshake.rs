//! Opening handshake: the HTTP/1.1 upgrade request and its response.
//!
//! [`HandshakeRequest`] renders the client's upgrade request.
//! [`HandshakeDecoder`] is a `tokio_util` [`Decoder`] that consumes exactly
//! one response head from the read buffer and validates it against the key
//! and subprotocols that were sent. Bytes following the blank line stay in
//! the buffer for the frame decoder.

use base64::{Engine as _, prelude::BASE64_STANDARD};
use bytes::{BufMut, BytesMut};
use sha1::{Digest, Sha1};
use thiserror::Error;
use tokio_util::codec::Decoder;

/// GUID appended to the client key before hashing (RFC 6455 section 1.3).
pub const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Protocol version sent in `Sec-WebSocket-Version`.
pub const WEBSOCKET_VERSION: &str = "13";

/// Largest response head accepted before the blank line.
pub const MAX_RESPONSE_HEAD: usize = 16 * 1024;

const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Errors raised while reading the server's handshake response.
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// Status line or a header line could not be parsed.
    #[error("malformed handshake response: {0}")]
    MalformedResponse(String),

    /// No blank line within [`MAX_RESPONSE_HEAD`] bytes.
    #[error("handshake response head exceeds {limit} bytes")]
    HeaderTooLarge {
        /// Configured limit.
        limit: usize,
    },

    /// Server answered with a status other than 101.
    #[error("server rejected upgrade: {status} {reason}")]
    ServerStatus {
        /// HTTP status code.
        status: u16,
        /// Reason phrase from the status line.
        reason: String,
    },

    /// `Upgrade` or `Connection` header does not describe a WebSocket
    /// upgrade.
    #[error("response is not a websocket upgrade")]
    NotUpgrade,

    /// `Sec-WebSocket-Accept` header is absent.
    #[error("missing Sec-WebSocket-Accept header")]
    MissingAccept,

    /// `Sec-WebSocket-Accept` does not match the key that was sent.
    #[error("Sec-WebSocket-Accept does not match the request key")]
    AcceptMismatch,

    /// Server selected a subprotocol the client did not offer, or none when
    /// one was required.
    #[error("server selected subprotocol {}", .0.as_deref().unwrap_or("<none>"))]
    SubprotocolMismatch(Option<String>),

    /// Transport failure while reading the response.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// The 16-byte nonce sent in `Sec-WebSocket-Key`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HandshakeKey([u8; 16]);

impl HandshakeKey {
    /// Draw a fresh random key.
    #[must_use]
    pub fn random() -> Self { Self(rand::random()) }

    /// Use a fixed key.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 16]) -> Self { Self(bytes) }

    /// Base64 form sent on the wire.
    #[must_use]
    pub fn encoded(&self) -> String { BASE64_STANDARD.encode(self.0) }

    /// `Sec-WebSocket-Accept` value a compliant server must return.
    #[must_use]
    pub fn expected_accept(&self) -> String { accept_value(&self.encoded()) }
}

/// Compute the accept value for a base64-encoded client key.
#[must_use]
pub fn accept_value(encoded_key: &str) -> String {
    let mut sha1 = Sha1::new();
    sha1.update(encoded_key.as_bytes());
    sha1.update(WEBSOCKET_GUID.as_bytes());
    BASE64_STANDARD.encode(&sha1.finalize()[..])
}

/// Client upgrade request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HandshakeRequest {
    host: String,
    resource: String,
    key: HandshakeKey,
    origin: Option<String>,
    subprotocols: Vec<String>,
}

impl HandshakeRequest {
    /// Request for `resource` (path plus query) on `host` (the `Host`
    /// header value).
    pub fn new(host: impl Into<String>, resource: impl Into<String>, key: HandshakeKey) -> Self {
        Self {
            host: host.into(),
            resource: resource.into(),
            key,
            origin: None,
            subprotocols: Vec::new(),
        }
    }

    /// Send an `Origin` header.
    #[must_use]
    pub fn with_origin(mut self, origin: Option<String>) -> Self {
        self.origin = origin;
        self
    }

    /// Offer these subprotocols, in preference order.
    #[must_use]
    pub fn with_subprotocols(mut self, subprotocols: Vec<String>) -> Self {
        self.subprotocols = subprotocols;
        self
    }

    /// Key sent with this request.
    #[must_use]
    pub const fn key(&self) -> HandshakeKey { self.key }

    /// Offered subprotocols.
    #[must_use]
    pub fn subprotocols(&self) -> &[String] { &self.subprotocols }

    /// Render the request head into `dst`.
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.put_slice(b"GET ");
        dst.put_slice(self.resource.as_bytes());
        dst.put_slice(b" HTTP/1.1\r\n");

        let mut header = |name: &str, value: &str| {
            dst.put_slice(name.as_bytes());
            dst.put_slice(b": ");
            dst.put_slice(value.as_bytes());
            dst.put_slice(b"\r\n");
        };
        header("Host", &self.host);
        header("Upgrade", "websocket");
        header("Connection", "Upgrade");
        header("Sec-WebSocket-Key", &self.key.encoded());
        if let Some(origin) = &self.origin {
            header("Origin", origin);
        }
        if !self.subprotocols.is_empty() {
            header("Sec-WebSocket-Protocol", &self.subprotocols.join(", "));
        }
        header("Sec-WebSocket-Version", WEBSOCKET_VERSION);

        dst.put_slice(b"\r\n");
    }

    /// Decoder that validates the response to this request.
    #[must_use]
    pub fn response_decoder(&self) -> HandshakeDecoder {
        HandshakeDecoder::new(self.key.expected_accept(), self.subprotocols.clone())
    }
}

/// Outcome of a successful handshake.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HandshakeResponse {
    /// Subprotocol the server selected, if any.
    pub subprotocol: Option<String>,
}

/// Decoder for the server's handshake response head.
#[derive(Clone, Debug)]
pub struct HandshakeDecoder {
    expected_accept: String,
    offered: Vec<String>,
}

impl HandshakeDecoder {
    /// Validate against `expected_accept` and the `offered` subprotocols.
    #[must_use]
    pub fn new(expected_accept: String, offered: Vec<String>) -> Self {
        Self {
            expected_accept,
            offered,
        }
    }

    fn validate(&self, head: &str) -> Result<HandshakeResponse, HandshakeError> {
        let mut lines = head.split("\r\n");
        let (status, reason) = parse_status_line(lines.next().unwrap_or_default())?;
        if status != 101 {
            return Err(HandshakeError::ServerStatus {
                status,
                reason: reason.to_owned(),
            });
        }

        let headers = lines
            .filter(|l| !l.is_empty())
            .map(parse_header_line)
            .collect::<Result<Vec<_>, _>>()?;
        let find = |name: &str| {
            headers
                .iter()
                .find(|(n, _)| n.eq_ignore_ascii_case(name))
                .map(|(_, v)| *v)
        };

        let upgrade_ok = find("upgrade").is_some_and(|v| v.eq_ignore_ascii_case("websocket"));
        let connection_ok = find("connection")
            .is_some_and(|v| v.split(',').any(|t| t.trim().eq_ignore_ascii_case("upgrade")));
        if !upgrade_ok || !connection_ok {
            return Err(HandshakeError::NotUpgrade);
        }

        match find("sec-websocket-accept") {
            None => return Err(HandshakeError::MissingAccept),
            Some(accept) if accept != self.expected_accept => {
                return Err(HandshakeError::AcceptMismatch);
            }
            Some(_) => {}
        }

        let selected = find("sec-websocket-protocol").map(str::to_owned);
        let agreed = match &selected {
            Some(p) => self.offered.iter().any(|o| o == p),
            None => self.offered.is_empty(),
        };
        if !agreed {
            return Err(HandshakeError::SubprotocolMismatch(selected));
        }

        Ok(HandshakeResponse {
            subprotocol: selected,
        })
    }
}

fn parse_status_line(line: &str) -> Result<(u16, &str), HandshakeError> {
    let mut parts = line.splitn(3, ' ');
    let version = parts.next().unwrap_or_default();
    if !version.starts_with("HTTP/") {
        return Err(HandshakeError::MalformedResponse(format!(
            "bad status line: {line:?}"
        )));
    }
    let status = parts
        .next()
        .and_then(|s| s.parse::<u16>().ok())
        .ok_or_else(|| HandshakeError::MalformedResponse(format!("bad status code: {line:?}")))?;
    Ok((status, parts.next().unwrap_or_default()))
}

fn parse_header_line(line: &str) -> Result<(&str, &str), HandshakeError> {
    line.split_once(':')
        .map(|(name, value)| (name.trim(), value.trim()))
        .ok_or_else(|| HandshakeError::MalformedResponse(format!("bad header line: {line:?}")))
}

impl Decoder for HandshakeDecoder {
    type Item = HandshakeResponse;
    type Error = HandshakeError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(end) = src
            .windows(HEAD_TERMINATOR.len())
            .position(|w| w == HEAD_TERMINATOR)
        else {
            if src.len() > MAX_RESPONSE_HEAD {
                return Err(HandshakeError::HeaderTooLarge {
                    limit: MAX_RESPONSE_HEAD,
                });
            }
            return Ok(None);
        };
        if end > MAX_RESPONSE_HEAD {
            return Err(HandshakeError::HeaderTooLarge {
                limit: MAX_RESPONSE_HEAD,
            });
        }

        let head = src.split_to(end + HEAD_TERMINATOR.len());
        let head = std::str::from_utf8(&head[..end])
            .map_err(|_| HandshakeError::MalformedResponse("response head is not UTF-8".into()))?;
        self.validate(head).map(Some)
    }
}

#[cfg(test)]
mod tests;
