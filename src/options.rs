//! Per-connection options.

use std::time::Duration;

#[cfg(feature = "tls")]
use std::sync::Arc;

use crate::codec::{DEFAULT_PAYLOAD_LIMIT, clamp_payload_limit};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(6000);
const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_millis(200);

/// Options applied when opening a connection.
///
/// A zero connect timeout waits indefinitely and a zero receive timeout makes
/// the reader block on the socket without a poll interval. A zero reconnect
/// interval disables automatic reconnection.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use websock::WebSocketOptions;
///
/// let options = WebSocketOptions::default()
///     .reconnect_interval(Duration::from_secs(2))
///     .max_frame_payload_size(4096);
/// assert_eq!(options.reconnect_interval_value(), Duration::from_secs(2));
/// assert_eq!(options.max_frame_payload_size_value(), 4096);
/// ```
#[derive(Clone, Debug)]
pub struct WebSocketOptions {
    connect_timeout: Duration,
    receive_timeout: Duration,
    tcp_nodelay: bool,
    reconnect_interval: Duration,
    max_frame_payload_size: usize,
    receive_text_messages_raw: bool,
    origin: Option<String>,
    #[cfg(feature = "tls")]
    tls_config: Option<Arc<rustls::ClientConfig>>,
}

impl Default for WebSocketOptions {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            receive_timeout: DEFAULT_RECEIVE_TIMEOUT,
            tcp_nodelay: true,
            reconnect_interval: Duration::ZERO,
            max_frame_payload_size: DEFAULT_PAYLOAD_LIMIT,
            receive_text_messages_raw: false,
            origin: None,
            #[cfg(feature = "tls")]
            tls_config: None,
        }
    }
}

impl WebSocketOptions {
    /// Bound on TCP connect plus TLS handshake.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Interval at which the reader wakes to check for shutdown while the
    /// socket is idle. Expiry is never an error.
    #[must_use]
    pub fn receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout = timeout;
        self
    }

    /// Configure `TCP_NODELAY`.
    #[must_use]
    pub fn tcp_nodelay(mut self, enabled: bool) -> Self {
        self.tcp_nodelay = enabled;
        self
    }

    /// Delay before an automatic reconnect after a lost connection.
    #[must_use]
    pub fn reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }

    /// Largest inbound payload accepted, clamped to 125 bytes..=16 MiB.
    #[must_use]
    pub fn max_frame_payload_size(mut self, size: usize) -> Self {
        self.max_frame_payload_size = clamp_payload_limit(size);
        self
    }

    /// Deliver text messages as raw UTF-8 bytes instead of strings.
    #[must_use]
    pub fn receive_text_messages_raw(mut self, raw: bool) -> Self {
        self.receive_text_messages_raw = raw;
        self
    }

    /// Send an `Origin` header with the handshake.
    #[must_use]
    pub fn origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// Use a custom TLS client configuration for `wss` URIs instead of the
    /// bundled web PKI roots.
    #[cfg(feature = "tls")]
    #[must_use]
    pub fn tls_config(mut self, config: Arc<rustls::ClientConfig>) -> Self {
        self.tls_config = Some(config);
        self
    }

    /// Configured connect timeout.
    #[must_use]
    pub const fn connect_timeout_value(&self) -> Duration { self.connect_timeout }

    /// Configured receive poll interval.
    #[must_use]
    pub const fn receive_timeout_value(&self) -> Duration { self.receive_timeout }

    /// Whether `TCP_NODELAY` is set.
    #[must_use]
    pub const fn tcp_nodelay_value(&self) -> bool { self.tcp_nodelay }

    /// Configured reconnect interval.
    #[must_use]
    pub const fn reconnect_interval_value(&self) -> Duration { self.reconnect_interval }

    /// Configured inbound payload limit.
    #[must_use]
    pub const fn max_frame_payload_size_value(&self) -> usize { self.max_frame_payload_size }

    /// Whether text is delivered raw.
    #[must_use]
    pub const fn receive_text_messages_raw_value(&self) -> bool { self.receive_text_messages_raw }

    /// Configured `Origin` header.
    #[must_use]
    pub fn origin_value(&self) -> Option<&str> { self.origin.as_deref() }

    /// Custom TLS configuration, if any.
    #[cfg(feature = "tls")]
    #[must_use]
    pub fn tls_config_value(&self) -> Option<&Arc<rustls::ClientConfig>> {
        self.tls_config.as_ref()
    }

    /// Connect timeout, or `None` when it is disabled.
    pub(crate) fn connect_deadline(&self) -> Option<Duration> {
        (!self.connect_timeout.is_zero()).then_some(self.connect_timeout)
    }

    /// Receive poll interval, or `None` when it is disabled.
    pub(crate) fn receive_poll(&self) -> Option<Duration> {
        (!self.receive_timeout.is_zero()).then_some(self.receive_timeout)
    }
}
