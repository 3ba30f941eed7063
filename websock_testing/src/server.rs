//! A scripted WebSocket server for driving clients in tests.

use std::{
    io,
    net::{Ipv4Addr, SocketAddr},
};

use bytes::BytesMut;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};
use tokio_util::codec::{Decoder, Encoder};
use websock::{
    Frame,
    FrameCodec,
    codec::DEFAULT_PAYLOAD_LIMIT,
    handshake::{WEBSOCKET_VERSION, accept_value},
};

/// A loopback listener handing out [`ServerPeer`]s.
pub struct TestServer {
    listener: TcpListener,
    addr: SocketAddr,
}

impl TestServer {
    /// Bind to an ephemeral localhost port.
    ///
    /// # Errors
    ///
    /// Returns any I/O error raised while binding.
    pub async fn bind() -> io::Result<Self> {
        let listener = TcpListener::bind(SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 0)).await?;
        let addr = listener.local_addr()?;
        Ok(Self { listener, addr })
    }

    #[must_use]
    pub fn addr(&self) -> SocketAddr { self.addr }

    /// `ws://` URI for `resource` on this server.
    #[must_use]
    pub fn uri(&self, resource: &str) -> String { format!("ws://{}{resource}", self.addr) }

    /// Accept one TCP connection without answering the upgrade.
    ///
    /// # Errors
    ///
    /// Returns any I/O error raised by `accept`.
    pub async fn accept(&self) -> io::Result<ServerPeer> {
        let (stream, _) = self.listener.accept().await?;
        Ok(ServerPeer::new(stream))
    }

    /// Accept one connection and complete the upgrade without a subprotocol.
    ///
    /// # Errors
    ///
    /// Returns an error if the request is malformed or the transport fails.
    pub async fn accept_upgrade(&self) -> io::Result<ServerPeer> {
        let mut peer = self.accept().await?;
        let request = peer.read_request().await?;
        peer.complete_upgrade(&request, None).await?;
        Ok(peer)
    }
}

/// The client's opening request.
#[derive(Clone, Debug)]
pub struct UpgradeRequest {
    head: String,
}

impl UpgradeRequest {
    /// The raw request head including the terminating blank line.
    #[must_use]
    pub fn head(&self) -> &str { &self.head }

    /// The request target from the request line.
    #[must_use]
    pub fn resource(&self) -> Option<&str> { self.head.lines().next()?.split(' ').nth(1) }

    /// Value of header `name`, matched case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.head.lines().skip(1).find_map(|line| {
            let (n, v) = line.split_once(':')?;
            n.trim().eq_ignore_ascii_case(name).then(|| v.trim())
        })
    }

    /// Offered subprotocols in order.
    #[must_use]
    pub fn subprotocols(&self) -> Vec<&str> {
        self.header("sec-websocket-protocol")
            .map(|v| v.split(',').map(str::trim).collect())
            .unwrap_or_default()
    }

    /// Check the headers every valid upgrade carries.
    ///
    /// # Errors
    ///
    /// Returns [`io::ErrorKind::InvalidData`] naming the first problem.
    pub fn validate(&self) -> io::Result<()> {
        let check = |ok: bool, what: &str| {
            if ok {
                Ok(())
            } else {
                Err(io::Error::new(io::ErrorKind::InvalidData, what.to_owned()))
            }
        };
        check(self.head.starts_with("GET "), "method is not GET")?;
        check(
            self.header("upgrade")
                .is_some_and(|v| v.eq_ignore_ascii_case("websocket")),
            "missing Upgrade: websocket",
        )?;
        check(
            self.header("connection")
                .is_some_and(|v| v.eq_ignore_ascii_case("upgrade")),
            "missing Connection: Upgrade",
        )?;
        check(
            self.header("sec-websocket-version") == Some(WEBSOCKET_VERSION),
            "unexpected Sec-WebSocket-Version",
        )?;
        check(
            self.header("sec-websocket-key").is_some(),
            "missing Sec-WebSocket-Key",
        )
    }

    /// A valid `101` response selecting `subprotocol`.
    ///
    /// # Errors
    ///
    /// Returns [`io::ErrorKind::InvalidData`] if the request has no key.
    pub fn accept_response(&self, subprotocol: Option<&str>) -> io::Result<String> {
        let key = self
            .header("sec-websocket-key")
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "missing key"))?;
        let mut response = format!(
            "HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: \
             Upgrade\r\nSec-WebSocket-Accept: {}\r\n",
            accept_value(key)
        );
        if let Some(protocol) = subprotocol {
            response.push_str(&format!("Sec-WebSocket-Protocol: {protocol}\r\n"));
        }
        response.push_str("\r\n");
        Ok(response)
    }
}

/// The server end of one accepted connection.
pub struct ServerPeer {
    stream: TcpStream,
    buffer: BytesMut,
    codec: FrameCodec,
}

impl ServerPeer {
    fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            buffer: BytesMut::new(),
            codec: FrameCodec::server(DEFAULT_PAYLOAD_LIMIT),
        }
    }

    /// Read the client's request head.
    ///
    /// # Errors
    ///
    /// Returns [`io::ErrorKind::UnexpectedEof`] if the client closes first.
    pub async fn read_request(&mut self) -> io::Result<UpgradeRequest> {
        loop {
            if let Some(end) = self.buffer.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = self.buffer.split_to(end + 4);
                let head = String::from_utf8(head.to_vec())
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                return Ok(UpgradeRequest { head });
            }
            if self.stream.read_buf(&mut self.buffer).await? == 0 {
                return Err(io::ErrorKind::UnexpectedEof.into());
            }
        }
    }

    /// Validate `request` and answer with `101`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request is invalid or the write fails.
    pub async fn complete_upgrade(
        &mut self,
        request: &UpgradeRequest,
        subprotocol: Option<&str>,
    ) -> io::Result<()> {
        request.validate()?;
        let response = request.accept_response(subprotocol)?;
        self.send_raw(response.as_bytes()).await
    }

    /// Write `bytes` verbatim.
    ///
    /// # Errors
    ///
    /// Returns any transport error.
    pub async fn send_raw(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.stream.write_all(bytes).await?;
        self.stream.flush().await
    }

    /// Write one unmasked frame.
    ///
    /// # Errors
    ///
    /// Returns a framing or transport error.
    pub async fn send_frame(&mut self, frame: Frame) -> io::Result<()> {
        let mut wire = BytesMut::new();
        self.codec.encode(frame, &mut wire)?;
        self.send_raw(&wire).await
    }

    /// Read the next client frame, or `None` at end of stream.
    ///
    /// # Errors
    ///
    /// Returns an error for frames a server must reject, such as unmasked
    /// ones, and for transport failures.
    pub async fn read_frame(&mut self) -> io::Result<Option<Frame>> {
        loop {
            if let Some(frame) = self.codec.decode(&mut self.buffer)? {
                return Ok(Some(frame));
            }
            if self.stream.read_buf(&mut self.buffer).await? == 0 {
                return Ok(None);
            }
        }
    }

    /// Skip frames until the client closes the transport.
    ///
    /// # Errors
    ///
    /// Returns any error from [`read_frame`](Self::read_frame).
    pub async fn expect_eof(&mut self) -> io::Result<()> {
        while self.read_frame().await?.is_some() {}
        Ok(())
    }
}
