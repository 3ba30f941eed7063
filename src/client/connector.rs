//! Opening the TCP or TLS transport.
//!
//! The connect attempt runs on its own task; [`connect`] waits for it under
//! the connect timeout and aborts it on expiry.

use std::{
    io,
    net::SocketAddr,
    pin::Pin,
    task::{Context, Poll},
};

#[cfg(feature = "tls")]
use std::sync::Arc;

use log::debug;
use tokio::{
    io::{AsyncRead, AsyncWrite, ReadBuf},
    net::{TcpSocket, TcpStream, lookup_host},
    time::timeout,
};
use url::{Host, Url};

use super::error::{ConnectError, ConnectorError};
use crate::options::WebSocketOptions;

/// Where and how to connect, derived from a `ws` or `wss` URI.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Endpoint {
    /// Host to resolve, without IPv6 brackets.
    pub(crate) host: String,
    pub(crate) port: u16,
    pub(crate) secure: bool,
    /// `Host` header value; carries the port only when it is not the
    /// scheme default.
    pub(crate) host_header: String,
    /// Request target: path plus query, `/` when the path is empty.
    pub(crate) resource: String,
}

impl Endpoint {
    pub(crate) fn from_url(url: &Url) -> Result<Self, ConnectError> {
        let secure = match url.scheme() {
            "ws" => false,
            "wss" => true,
            other => return Err(ConnectError::UnsupportedScheme(other.to_owned())),
        };
        let host = match url.host() {
            Some(Host::Domain(domain)) if !domain.is_empty() => domain.to_owned(),
            Some(Host::Ipv4(addr)) => addr.to_string(),
            Some(Host::Ipv6(addr)) => addr.to_string(),
            _ => return Err(ConnectError::MissingHost),
        };
        let host_str = url.host_str().ok_or(ConnectError::MissingHost)?;
        let port = url
            .port_or_known_default()
            .unwrap_or(if secure { 443 } else { 80 });
        let host_header = match url.port() {
            Some(port) => format!("{host_str}:{port}"),
            None => host_str.to_owned(),
        };
        let path = match url.path() {
            "" => "/",
            path => path,
        };
        let resource = match url.query() {
            Some(query) => format!("{path}?{query}"),
            None => path.to_owned(),
        };
        Ok(Self {
            host,
            port,
            secure,
            host_header,
            resource,
        })
    }
}

/// An open transport, plain or TLS.
pub(crate) enum Transport {
    Plain(TcpStream),
    #[cfg(feature = "tls")]
    Tls(Box<tokio_rustls::client::TlsStream<TcpStream>>),
}

impl Transport {
    pub(crate) fn peer_addr(&self) -> io::Result<SocketAddr> {
        match self {
            Self::Plain(stream) => stream.peer_addr(),
            #[cfg(feature = "tls")]
            Self::Tls(stream) => stream.get_ref().0.peer_addr(),
        }
    }
}

impl AsyncRead for Transport {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            #[cfg(feature = "tls")]
            Self::Tls(stream) => Pin::new(stream.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Transport {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            #[cfg(feature = "tls")]
            Self::Tls(stream) => Pin::new(stream.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_flush(cx),
            #[cfg(feature = "tls")]
            Self::Tls(stream) => Pin::new(stream.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            #[cfg(feature = "tls")]
            Self::Tls(stream) => Pin::new(stream.as_mut()).poll_shutdown(cx),
        }
    }
}

/// Open a transport to `endpoint`, bounded by the connect timeout.
///
/// The attempt runs on a separate task so an expired timeout can abort it
/// without leaving a half-open socket behind.
pub(crate) async fn connect(
    endpoint: Endpoint,
    options: WebSocketOptions,
) -> Result<Transport, ConnectorError> {
    let limit = options.connect_deadline();
    let mut attempt = tokio::spawn(open(endpoint, options));
    let joined = match limit {
        Some(limit) => match timeout(limit, &mut attempt).await {
            Ok(joined) => joined,
            Err(_) => {
                attempt.abort();
                return Err(ConnectorError::Timeout(limit));
            }
        },
        None => (&mut attempt).await,
    };
    joined.map_err(|e| ConnectorError::Task(e.to_string()))?
}

async fn open(endpoint: Endpoint, options: WebSocketOptions) -> Result<Transport, ConnectorError> {
    let stream = connect_tcp(&endpoint, options.tcp_nodelay_value()).await?;
    if endpoint.secure {
        wrap_tls(stream, &endpoint.host, &options).await
    } else {
        Ok(Transport::Plain(stream))
    }
}

/// Resolve the endpoint and connect to the first address that answers.
async fn connect_tcp(endpoint: &Endpoint, nodelay: bool) -> Result<TcpStream, ConnectorError> {
    let addrs = lookup_host((endpoint.host.as_str(), endpoint.port))
        .await
        .map_err(|source| ConnectorError::Resolve {
            host: endpoint.host.clone(),
            source,
        })?;
    connect_any(addrs, nodelay)
        .await
        .map_err(|e| {
            e.map_or_else(
                || ConnectorError::NoAddress(endpoint.host.clone()),
                ConnectorError::Io,
            )
        })
}

/// Try each address in turn. A failure on one address, including socket
/// setup, moves on to the next; the last failure is returned.
async fn connect_any(
    addrs: impl IntoIterator<Item = SocketAddr>,
    nodelay: bool,
) -> Result<TcpStream, Option<io::Error>> {
    let mut last_err = None;
    for addr in addrs {
        match connect_addr(addr, nodelay).await {
            Ok(stream) => {
                debug!("tcp connected: addr={addr}, nodelay={nodelay}");
                return Ok(stream);
            }
            Err(e) => {
                debug!("tcp connect failed: addr={addr}, error={e}");
                last_err = Some(e);
            }
        }
    }
    Err(last_err)
}

async fn connect_addr(addr: SocketAddr, nodelay: bool) -> io::Result<TcpStream> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_nodelay(nodelay)?;
    socket.connect(addr).await
}

#[cfg(feature = "tls")]
async fn wrap_tls(
    stream: TcpStream,
    host: &str,
    options: &WebSocketOptions,
) -> Result<Transport, ConnectorError> {
    use rustls::pki_types::ServerName;

    let config = match options.tls_config_value() {
        Some(config) => Arc::clone(config),
        None => default_tls_config()?,
    };
    let server_name = ServerName::try_from(host.to_owned())
        .map_err(|_| ConnectorError::ServerName(host.to_owned()))?;
    let stream = tokio_rustls::TlsConnector::from(config)
        .connect(server_name, stream)
        .await
        .map_err(ConnectorError::Tls)?;
    debug!("tls handshake complete: host={host}");
    Ok(Transport::Tls(Box::new(stream)))
}

#[cfg(not(feature = "tls"))]
#[expect(clippy::unused_async, reason = "mirrors the TLS-enabled signature")]
async fn wrap_tls(
    _stream: TcpStream,
    _host: &str,
    _options: &WebSocketOptions,
) -> Result<Transport, ConnectorError> {
    Err(ConnectorError::TlsUnavailable)
}

/// Client configuration trusting the bundled web PKI roots.
#[cfg(feature = "tls")]
fn default_tls_config() -> Result<Arc<rustls::ClientConfig>, ConnectorError> {
    let mut roots = rustls::RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let config = rustls::ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .map_err(|e| ConnectorError::TlsConfig(e.to_string()))?
    .with_root_certificates(roots)
    .with_no_client_auth();
    Ok(Arc::new(config))
}
