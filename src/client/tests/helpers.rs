//! Shared helpers for connection tests: a recording observer and a scripted
//! server peer speaking the server side of the protocol.

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    sync::mpsc,
    time::timeout,
};
use tokio_util::codec::Decoder;

use crate::{
    client::{CloseKind, WebSocketObserver},
    codec::{DEFAULT_PAYLOAD_LIMIT, FrameCodec, encode_frame},
    frame::Frame,
    handshake::accept_value,
};

/// Upper bound on waiting for any single test event.
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Callback observed by [`Recorder`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Observed {
    Open,
    Close(CloseKind, String),
    Text(String),
    RawText(Bytes),
    Binary(Bytes),
}

/// Observer forwarding every callback to a channel.
pub struct Recorder {
    events: mpsc::UnboundedSender<Observed>,
    panic_on_open: bool,
}

impl Recorder {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Observed>) {
        let (events, rx) = mpsc::unbounded_channel();
        (
            Self {
                events,
                panic_on_open: false,
            },
            rx,
        )
    }

    /// Recorder whose `on_open` panics after recording.
    pub fn panicking() -> (Self, mpsc::UnboundedReceiver<Observed>) {
        let (mut recorder, rx) = Self::new();
        recorder.panic_on_open = true;
        (recorder, rx)
    }
}

impl WebSocketObserver for Recorder {
    fn on_open(&mut self) {
        let _ = self.events.send(Observed::Open);
        assert!(!self.panic_on_open, "observer failure");
    }

    fn on_close(&mut self, kind: CloseKind, reason: &str) {
        let _ = self.events.send(Observed::Close(kind, reason.to_owned()));
    }

    fn on_text_message(&mut self, payload: String) {
        let _ = self.events.send(Observed::Text(payload));
    }

    fn on_raw_text_message(&mut self, payload: Bytes) {
        let _ = self.events.send(Observed::RawText(payload));
    }

    fn on_binary_message(&mut self, payload: Bytes) {
        let _ = self.events.send(Observed::Binary(payload));
    }
}

/// Wait for the next observer event.
pub async fn next_event(events: &mut mpsc::UnboundedReceiver<Observed>) -> Observed {
    timeout(EVENT_TIMEOUT, events.recv())
        .await
        .expect("observer event should arrive in time")
        .expect("observer channel open")
}

/// Wait for the next close event and return its kind and reason.
pub async fn next_close(events: &mut mpsc::UnboundedReceiver<Observed>) -> (CloseKind, String) {
    match next_event(events).await {
        Observed::Close(kind, reason) => (kind, reason),
        other => panic!("expected a close, got {other:?}"),
    }
}

/// Bind a loopback listener and return it with its `ws://` URI.
pub async fn listen() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind listener");
    let addr = listener.local_addr().expect("listener addr");
    (listener, format!("ws://{addr}/test"))
}

/// Server side of one accepted connection.
pub struct Peer {
    stream: TcpStream,
    buffer: BytesMut,
    codec: FrameCodec,
}

impl Peer {
    pub async fn accept(listener: &TcpListener) -> Self {
        let (stream, _) = timeout(EVENT_TIMEOUT, listener.accept())
            .await
            .expect("client should connect in time")
            .expect("accept client");
        Self {
            stream,
            buffer: BytesMut::new(),
            codec: FrameCodec::server(DEFAULT_PAYLOAD_LIMIT),
        }
    }

    /// Accept and complete the opening handshake.
    pub async fn accept_open(listener: &TcpListener) -> Self {
        let mut peer = Self::accept(listener).await;
        let request = peer.read_request().await;
        peer.send_raw(switching_protocols(&request).as_bytes()).await;
        peer
    }

    /// Read the client's request head.
    pub async fn read_request(&mut self) -> String {
        loop {
            if let Some(end) = self.buffer.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = self.buffer.split_to(end + 4);
                return String::from_utf8(head.to_vec()).expect("request head is UTF-8");
            }
            self.fill().await;
        }
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.expect("server write");
    }

    /// Send `frame` unmasked, as a server must.
    pub async fn send_frame(&mut self, frame: &Frame) {
        let mut wire = BytesMut::new();
        encode_frame(frame, None, &mut wire).expect("encode frame");
        self.send_raw(&wire).await;
    }

    /// Read the next client frame; `None` on end of stream.
    pub async fn read_frame(&mut self) -> Option<Frame> {
        loop {
            let decoded = self.codec.decode(&mut self.buffer);
            if let Some(frame) = decoded.expect("client frame is valid") {
                return Some(frame);
            }
            if !self.try_fill().await {
                return None;
            }
        }
    }

    /// Assert the client writes nothing more for `window`.
    pub async fn expect_silence(&mut self, window: Duration) {
        assert!(self.buffer.is_empty(), "client wrote ahead of the server");
        let read = timeout(window, self.stream.read_buf(&mut self.buffer)).await;
        assert!(read.is_err(), "client wrote ahead of the server");
    }

    /// Wait until the client closes the transport.
    pub async fn expect_eof(&mut self) {
        while self.read_frame().await.is_some() {}
    }

    async fn fill(&mut self) {
        assert!(self.try_fill().await, "client closed the connection early");
    }

    async fn try_fill(&mut self) -> bool {
        let read = timeout(EVENT_TIMEOUT, self.stream.read_buf(&mut self.buffer))
            .await
            .expect("client data should arrive in time");
        matches!(read, Ok(n) if n > 0)
    }
}

/// Value of `name` in a request head, matched case-insensitively.
pub fn header<'a>(request: &'a str, name: &str) -> Option<&'a str> {
    request.lines().find_map(|line| {
        let (n, v) = line.split_once(':')?;
        n.trim().eq_ignore_ascii_case(name).then(|| v.trim())
    })
}

/// A valid 101 response to `request`.
pub fn switching_protocols(request: &str) -> String {
    let key = header(request, "sec-websocket-key").expect("request carries a key");
    format!(
        "HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: \
         Upgrade\r\nSec-WebSocket-Accept: {}\r\n\r\n",
        accept_value(key)
    )
}
