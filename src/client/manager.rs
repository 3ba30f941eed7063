//! Connection manager actor.
//!
//! The manager owns the observer, the connection target and the live session
//! (reader, writer and their shared event channel). It reacts to three
//! sources in a `tokio::select!` loop: commands from
//! [`WebSocketConnection`](super::WebSocketConnection) handles, signals from
//! the session's workers, and the reconnect timer. All observer callbacks
//! run here, so they are serialised and ordered.

use std::{panic::AssertUnwindSafe, time::Duration};

use futures::future;
use log::{debug, error, info, warn};
use tokio::{
    io::{AsyncWriteExt, ReadHalf, WriteHalf},
    sync::{mpsc, oneshot, watch},
    time::{Instant, sleep_until, timeout},
};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use url::Url;

use super::{
    connector::{self, Endpoint, Transport},
    error::ConnectError,
    observer::{CloseKind, WebSocketObserver},
    reader::{FrameReader, ReaderHandle, spawn_reader},
    tracing_config::TracingConfig,
    tracing_helpers::{close_span, connect_span, emit_timing_event, start_timer},
    writer::{FrameWriter, WriterHandle, spawn_writer},
};
use crate::{
    codec::FrameCodec,
    frame::CloseFrame,
    handshake::{HandshakeKey, HandshakeRequest},
    message::Message,
    metrics,
    options::WebSocketOptions,
    panic::format_panic,
};

/// Upper bound on waiting for the writer to drain and the transport to shut
/// down during teardown.
const TEARDOWN_GRACE: Duration = Duration::from_secs(1);

/// Reason reported when a session is torn down because every handle was
/// dropped.
const HANDLE_DROPPED: &str = "connection handle dropped";

/// Request to open a connection.
pub(crate) struct ConnectRequest {
    pub(crate) uri: String,
    pub(crate) subprotocols: Vec<String>,
    pub(crate) observer: Box<dyn WebSocketObserver>,
    pub(crate) options: WebSocketOptions,
}

/// Instructions from a [`WebSocketConnection`](super::WebSocketConnection).
pub(crate) enum Command {
    Connect {
        request: ConnectRequest,
        reply: oneshot::Sender<Result<(), ConnectError>>,
    },
    Disconnect,
    Reconnect {
        reply: oneshot::Sender<bool>,
    },
    Send(Message),
}

/// Transport state published to every handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum LinkState {
    Down,
    Open,
    /// Our close frame is queued; nothing more may be written.
    Closing,
}

/// What the manager connects to and whom it reports to. Kept after a close
/// so a manual reconnect can reuse it.
struct Target {
    uri: String,
    endpoint: Endpoint,
    subprotocols: Vec<String>,
    observer: Box<dyn WebSocketObserver>,
    options: WebSocketOptions,
}

/// A live transport with its two workers.
struct Session {
    reader: ReaderHandle<ReadHalf<Transport>>,
    writer: WriterHandle<WriteHalf<Transport>>,
    events: mpsc::UnboundedReceiver<Message>,
    /// The server has answered with `101`.
    upgraded: bool,
    /// Frames held back until the upgrade completes.
    pending: Vec<Message>,
    close_sent: bool,
}

impl Session {
    /// Queue `message` for the writer, holding it until the upgrade is done.
    /// Nothing is queued once our close frame has been.
    fn queue(&mut self, message: Message) {
        if self.close_sent {
            debug!("close already sent; dropping {}", message.kind());
            return;
        }
        if matches!(message, Message::Close(_)) {
            self.close_sent = true;
        }
        if self.upgraded {
            self.writer.forward(message);
        } else {
            debug!("upgrade pending; holding {}", message.kind());
            self.pending.push(message);
        }
    }

    fn release_pending(&mut self) {
        self.upgraded = true;
        for message in self.pending.drain(..) {
            self.writer.forward(message);
        }
    }
}

enum Event {
    Command(Option<Command>),
    Inbound(Option<Message>),
    ReconnectDue,
}

pub(crate) struct ConnectionManager {
    commands: mpsc::UnboundedReceiver<Command>,
    link: watch::Sender<LinkState>,
    tracing: TracingConfig,
    target: Option<Target>,
    session: Option<Session>,
    /// The handshake succeeded at least once since the last `connect`.
    has_connected_before: bool,
    /// A transport was opened at least once since the last `connect`.
    had_transport: bool,
    reconnect_at: Option<Instant>,
}

impl ConnectionManager {
    pub(crate) fn new(
        commands: mpsc::UnboundedReceiver<Command>,
        link: watch::Sender<LinkState>,
        tracing: TracingConfig,
    ) -> Self {
        Self {
            commands,
            link,
            tracing,
            target: None,
            session: None,
            has_connected_before: false,
            had_transport: false,
            reconnect_at: None,
        }
    }

    /// Process events until every handle has been dropped.
    pub(crate) async fn run(mut self) {
        debug!("connection manager started");
        loop {
            match self.next_event().await {
                Event::Command(Some(command)) => self.handle_command(command).await,
                Event::Command(None) => break,
                Event::Inbound(Some(message)) => self.dispatch(message).await,
                Event::Inbound(None) => {
                    self.fail_connection(
                        CloseKind::InternalError,
                        "WebSocket internal error (worker tasks exited)".to_owned(),
                    )
                    .await;
                }
                Event::ReconnectDue => {
                    self.reconnect_at = None;
                    info!("reconnect timer fired");
                    self.reconnect().await;
                }
            }
        }
        if self.session.is_some() {
            self.fail_connection(CloseKind::Normal, HANDLE_DROPPED.to_owned())
                .await;
        }
        debug!("connection manager stopped");
    }

    /// Commands first, then worker signals, then the reconnect timer.
    async fn next_event(&mut self) -> Event {
        let events = self.session.as_mut().map(|s| &mut s.events);
        let reconnect_at = self.reconnect_at;
        tokio::select! {
            biased;

            command = self.commands.recv() => Event::Command(command),
            message = poll_events(events) => Event::Inbound(message),
            () = wait_until(reconnect_at) => Event::ReconnectDue,
        }
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect { request, reply } => {
                let result = self.connect(request).await;
                if reply.send(result).is_err() {
                    debug!("connect caller went away before the reply");
                }
            }
            Command::Disconnect => self.disconnect(),
            Command::Reconnect { reply } => {
                let started = self.reconnect().await;
                if reply.send(started).is_err() {
                    debug!("reconnect caller went away before the reply");
                }
            }
            Command::Send(message) => self.forward(message),
        }
    }

    async fn connect(&mut self, request: ConnectRequest) -> Result<(), ConnectError> {
        if self.session.is_some() {
            return Err(ConnectError::AlreadyConnected);
        }
        let url = Url::parse(&request.uri)?;
        let endpoint = Endpoint::from_url(&url)?;

        self.reconnect_at = None;
        self.has_connected_before = false;
        self.had_transport = false;
        self.target = Some(Target {
            uri: request.uri,
            endpoint,
            subprotocols: request.subprotocols,
            observer: request.observer,
            options: request.options,
        });
        self.open().await;
        Ok(())
    }

    /// Ask the server to close. Teardown follows when its close frame (or
    /// the end of the stream) arrives.
    fn disconnect(&mut self) {
        self.has_connected_before = false;
        self.reconnect_at = None;
        match self.session.as_mut() {
            Some(session) if !session.close_sent => {
                info!("disconnect requested; sending close");
                self.link.send_replace(LinkState::Closing);
                session.queue(Message::Close(CloseFrame::normal()));
            }
            Some(_) => debug!("disconnect requested; close already sent"),
            None => debug!("disconnect requested without a live connection"),
        }
    }

    /// Reopen the last target if no transport is live.
    async fn reconnect(&mut self) -> bool {
        if self.session.is_some() || self.target.is_none() {
            return false;
        }
        self.reconnect_at = None;
        self.open().await;
        true
    }

    fn forward(&mut self, message: Message) {
        match self.session.as_mut() {
            Some(session) => session.queue(message),
            None => warn!("not connected; dropping {}", message.kind()),
        }
    }

    /// Run the connector and, on success, start a session.
    async fn open(&mut self) {
        let Some(target) = self.target.as_ref() else {
            return;
        };
        let uri = target.uri.clone();
        let span = connect_span(&self.tracing, &uri);
        let start = start_timer(self.tracing.connect.timing);
        let result = connector::connect(target.endpoint.clone(), target.options.clone())
            .instrument(span.clone())
            .await;
        span.in_scope(|| emit_timing_event(start));

        match result {
            Ok(transport) => {
                span.record("result", "ok");
                span.in_scope(|| self.start_session(transport));
            }
            Err(e) => {
                span.record("result", "error");
                warn!("connect failed: uri={uri}, error={e}");
                self.on_close(CloseKind::CannotConnect, &e.to_string());
            }
        }
    }

    fn start_session(&mut self, transport: Transport) {
        let Some(target) = self.target.as_ref() else {
            return;
        };
        let options = &target.options;
        match transport.peer_addr() {
            Ok(peer) => info!("transport open: uri={}, peer={peer}", target.uri),
            Err(_) => info!("transport open: uri={}", target.uri),
        }

        let request = HandshakeRequest::new(
            target.endpoint.host_header.clone(),
            target.endpoint.resource.clone(),
            HandshakeKey::random(),
        )
        .with_origin(options.origin_value().map(str::to_owned))
        .with_subprotocols(target.subprotocols.clone());

        let codec = FrameCodec::client(options.max_frame_payload_size_value());
        let (events_tx, events) = mpsc::unbounded_channel();
        let (read_half, write_half) = tokio::io::split(transport);

        let reader = spawn_reader(FrameReader::new(
            read_half,
            request.response_decoder(),
            codec.clone(),
            options.receive_text_messages_raw_value(),
            options.receive_poll(),
            events_tx.clone(),
            CancellationToken::new(),
            self.tracing.clone(),
        ));
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let writer = spawn_writer(
            FrameWriter::new(write_half, queue_rx, events_tx, codec, self.tracing.clone()),
            queue_tx,
        );
        writer.forward(Message::ClientHandshake(request));

        self.session = Some(Session {
            reader,
            writer,
            events,
            upgraded: false,
            pending: Vec::new(),
            close_sent: false,
        });
        self.had_transport = true;
        self.link.send_replace(LinkState::Open);
        metrics::inc_connections();
    }

    /// React to one signal from the session's workers.
    async fn dispatch(&mut self, message: Message) {
        match message {
            Message::ServerHandshake {
                success: true,
                subprotocol,
            } => {
                info!("websocket open: subprotocol={subprotocol:?}");
                if let Some(session) = self.session.as_mut() {
                    session.release_pending();
                }
                self.has_connected_before = true;
                self.notify("on_open", |o| o.on_open());
            }
            Message::ServerHandshake { success: false, .. } => {
                self.fail_connection(
                    CloseKind::ProtocolError,
                    "WebSocket protocol violation: handshake rejected".to_owned(),
                )
                .await;
            }
            Message::Text(text) => self.notify("on_text_message", |o| o.on_text_message(text)),
            Message::RawText(bytes) => {
                self.notify("on_raw_text_message", |o| o.on_raw_text_message(bytes));
            }
            Message::Binary(bytes) => {
                self.notify("on_binary_message", |o| o.on_binary_message(bytes));
            }
            Message::Ping(payload) => {
                debug!("ping received: len={}", payload.len());
                self.forward(Message::Pong(payload));
            }
            Message::Pong(payload) => debug!("pong received: len={}", payload.len()),
            Message::Close(close) => self.on_peer_close(close).await,
            Message::ConnectionLost => {
                if self.session.as_ref().is_some_and(|s| s.close_sent) {
                    self.fail_connection(CloseKind::Normal, "connection closed".to_owned())
                        .await;
                } else {
                    self.fail_connection(
                        CloseKind::ConnectionLost,
                        "WebSocket connection lost".to_owned(),
                    )
                    .await;
                }
            }
            Message::ProtocolViolation(detail) => {
                self.fail_connection(
                    CloseKind::ProtocolError,
                    format!("WebSocket protocol violation: {detail}"),
                )
                .await;
            }
            Message::Error(cause) => {
                self.fail_connection(
                    CloseKind::InternalError,
                    format!("WebSocket internal error ({cause})"),
                )
                .await;
            }
            Message::ServerError { status, reason } => {
                self.fail_connection(
                    CloseKind::ServerError,
                    format!("Server error {status} ({reason})"),
                )
                .await;
            }
            other @ (Message::ClientHandshake(_) | Message::Quit) => {
                warn!("ignoring unexpected {} from a worker", other.kind());
            }
        }
    }

    /// Echo the close if we have not sent one, then tear down.
    async fn on_peer_close(&mut self, close: CloseFrame) {
        info!("close received: code={:?}, reason={}", close.code, close.reason);
        if let Some(session) = self.session.as_mut()
            && !session.close_sent
        {
            self.link.send_replace(LinkState::Closing);
            session.queue(Message::Close(CloseFrame::normal()));
        }
        let reason = match (close.reason.is_empty(), close.code) {
            (false, _) => close.reason,
            (true, Some(code)) => format!("connection closed (status {code})"),
            (true, None) => "connection closed".to_owned(),
        };
        self.fail_connection(CloseKind::Normal, reason).await;
    }

    /// Stop the workers, close the transport and report `kind`.
    async fn fail_connection(&mut self, kind: CloseKind, reason: String) {
        let span = close_span(&self.tracing, kind);
        let start = start_timer(self.tracing.close.timing);
        if let Some(session) = self.session.take() {
            self.teardown(session).instrument(span.clone()).await;
        }
        span.in_scope(|| {
            emit_timing_event(start);
            self.on_close(kind, &reason);
        });
    }

    async fn teardown(&mut self, session: Session) {
        let Session { reader, writer, .. } = session;
        reader.quit();
        let read_half = reader.join().await;
        let write_half = writer.quit_and_join(TEARDOWN_GRACE).await;
        self.link.send_replace(LinkState::Down);
        metrics::dec_connections();

        if let (Some(read_half), Some(write_half)) = (read_half, write_half)
            && read_half.is_pair_of(&write_half)
        {
            let mut transport = read_half.unsplit(write_half);
            match timeout(TEARDOWN_GRACE, transport.shutdown()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!("transport shutdown failed: error={e}"),
                Err(_) => debug!("transport shutdown timed out"),
            }
        }
        debug!("transport closed");
    }

    /// Report a close to the observer, substituting
    /// [`CloseKind::Reconnect`] when a reconnect gets scheduled.
    fn on_close(&mut self, kind: CloseKind, reason: &str) {
        let reported = if matches!(kind, CloseKind::CannotConnect | CloseKind::ConnectionLost)
            && self.schedule_reconnect()
        {
            CloseKind::Reconnect
        } else {
            kind
        };
        if kind != CloseKind::Normal {
            metrics::inc_errors(kind.as_str());
        }
        info!("connection closed: kind={reported}, reason={reason}");
        self.notify("on_close", |o| o.on_close(reported, reason));
    }

    fn schedule_reconnect(&mut self) -> bool {
        let Some(target) = self.target.as_ref() else {
            return false;
        };
        let interval = target.options.reconnect_interval_value();
        if !self.had_transport || !self.has_connected_before || interval.is_zero() {
            return false;
        }
        info!("reconnect scheduled: interval_ms={}", interval.as_millis());
        self.reconnect_at = Some(Instant::now() + interval);
        metrics::inc_reconnects();
        true
    }

    /// Invoke an observer callback, containing any panic.
    fn notify(&mut self, callback: &'static str, f: impl FnOnce(&mut dyn WebSocketObserver)) {
        let Some(target) = self.target.as_mut() else {
            debug!("no observer for {callback}");
            return;
        };
        let observer = target.observer.as_mut();
        if let Err(panic) = std::panic::catch_unwind(AssertUnwindSafe(|| f(observer))) {
            let panic_msg = format_panic(panic);
            error!("observer panicked: callback={callback}, panic={panic_msg}");
            tracing::error!(callback, panic = %panic_msg, "observer panicked");
        }
    }
}

async fn poll_events(events: Option<&mut mpsc::UnboundedReceiver<Message>>) -> Option<Message> {
    match events {
        Some(events) => events.recv().await,
        None => future::pending().await,
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => future::pending().await,
    }
}
