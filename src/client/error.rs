//! Error types for connection operations.

use std::io;

/// Errors returned by [`crate::WebSocketConnection::connect`].
///
/// Transport failures are not reported here; they reach the observer as a
/// [`CloseKind::CannotConnect`](super::CloseKind::CannotConnect) close.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    /// A transport is already open.
    #[error("already connected")]
    AlreadyConnected,
    /// The URI could not be parsed.
    #[error("invalid URI: {0}")]
    InvalidUri(#[from] url::ParseError),
    /// The URI has no host component.
    #[error("URI has no host")]
    MissingHost,
    /// The scheme is neither `ws` nor `wss`.
    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),
    /// The connection's manager task has stopped.
    #[error("connection manager has stopped")]
    Closed,
}

/// Errors returned by the `send_*` methods.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// No transport is open.
    #[error("not connected")]
    NotConnected,
    /// Control frame payloads are limited to 125 bytes.
    #[error("control frame payload too long: {0} bytes")]
    ControlPayloadTooLong(usize),
    /// The closing handshake has started; no more frames may be sent.
    #[error("connection is closing")]
    Closing,
    /// The connection's manager task has stopped.
    #[error("connection manager has stopped")]
    Closed,
}

/// Failures while opening the transport.
#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    /// Host name resolution failed.
    #[error("failed to resolve {host}: {source}")]
    Resolve {
        /// Host being resolved.
        host: String,
        /// Underlying resolver error.
        #[source]
        source: io::Error,
    },
    /// Resolution returned no addresses.
    #[error("no addresses found for {0}")]
    NoAddress(String),
    /// TCP connect plus TLS handshake exceeded the connect timeout.
    #[error("connect timed out after {0:?}")]
    Timeout(std::time::Duration),
    /// TCP connect failed.
    #[error("connect failed: {0}")]
    Io(#[from] io::Error),
    /// The host is not a valid TLS server name.
    #[error("invalid TLS server name: {0}")]
    ServerName(String),
    /// TLS handshake failed.
    #[error("TLS handshake failed: {0}")]
    Tls(#[source] io::Error),
    /// TLS configuration could not be built.
    #[error("TLS configuration error: {0}")]
    TlsConfig(String),
    /// `wss` was requested without the `tls` feature.
    #[error("TLS support is not enabled")]
    TlsUnavailable,
    /// The connector task stopped without a result.
    #[error("connector task failed: {0}")]
    Task(String),
}
