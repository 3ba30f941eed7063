//! Reader task: parses the handshake response, then frames, and posts the
//! result of each to the manager's event channel.

use std::{panic::AssertUnwindSafe, time::Duration};

use bytes::BytesMut;
use futures::FutureExt;
use log::{debug, error, warn};
use tokio::{
    io::{AsyncRead, AsyncReadExt},
    sync::mpsc,
    task::JoinHandle,
    time::timeout,
};
use tokio_util::{codec::Decoder, sync::CancellationToken};

use super::{tracing_config::TracingConfig, tracing_helpers::receive_span};
use crate::{
    codec::FrameCodec,
    frame::{CloseFrame, Frame, OpCode},
    handshake::{HandshakeDecoder, HandshakeError},
    message::Message,
    metrics::{self, Direction},
    panic::format_panic,
};

const READ_CHUNK: usize = 8 * 1024;

/// Reader progress. Advances monotonically.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ReaderState {
    AwaitingHandshake,
    StreamingFrames,
    Stopped,
}

/// Outcome of one read from the socket.
enum Fill {
    Data,
    Idle,
    Cancelled,
    Eof,
    Failed(std::io::Error),
}

pub(crate) struct FrameReader<R> {
    stream: R,
    buffer: BytesMut,
    state: ReaderState,
    handshake: HandshakeDecoder,
    codec: FrameCodec,
    raw_text: bool,
    poll_interval: Option<Duration>,
    events: mpsc::UnboundedSender<Message>,
    shutdown: CancellationToken,
    tracing: TracingConfig,
}

impl<R> FrameReader<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    #[expect(clippy::too_many_arguments, reason = "all fields are set once at spawn")]
    pub(crate) fn new(
        stream: R,
        handshake: HandshakeDecoder,
        codec: FrameCodec,
        raw_text: bool,
        poll_interval: Option<Duration>,
        events: mpsc::UnboundedSender<Message>,
        shutdown: CancellationToken,
        tracing: TracingConfig,
    ) -> Self {
        Self {
            stream,
            buffer: BytesMut::with_capacity(READ_CHUNK),
            state: ReaderState::AwaitingHandshake,
            handshake,
            codec,
            raw_text,
            poll_interval,
            events,
            shutdown,
            tracing,
        }
    }

    /// Read until stopped and hand the stream half back.
    pub(crate) async fn run(mut self) -> R {
        debug!("reader started");
        while self.state != ReaderState::Stopped {
            self.drain_buffer();
            if self.state == ReaderState::Stopped || self.shutdown.is_cancelled() {
                break;
            }
            match self.fill().await {
                Fill::Data | Fill::Idle => {}
                Fill::Cancelled => break,
                Fill::Eof => {
                    debug!("reader reached end of stream");
                    self.stop_with(Message::ConnectionLost);
                }
                Fill::Failed(e) => {
                    warn!("reader I/O error: error={e}");
                    self.stop_with(Message::ConnectionLost);
                }
            }
        }
        self.state = ReaderState::Stopped;
        debug!("reader stopped");
        self.stream
    }

    async fn fill(&mut self) -> Fill {
        let Self {
            stream,
            buffer,
            shutdown,
            poll_interval,
            ..
        } = self;
        buffer.reserve(READ_CHUNK);
        let read = async {
            match poll_interval {
                Some(limit) => timeout(*limit, stream.read_buf(buffer)).await.ok(),
                None => Some(stream.read_buf(buffer).await),
            }
        };
        tokio::select! {
            biased;
            () = shutdown.cancelled() => Fill::Cancelled,
            outcome = read => match outcome {
                None => Fill::Idle,
                Some(Ok(0)) => Fill::Eof,
                Some(Ok(_)) => Fill::Data,
                Some(Err(e)) => Fill::Failed(e),
            },
        }
    }

    /// Parse everything complete in the buffer.
    fn drain_buffer(&mut self) {
        loop {
            if self.shutdown.is_cancelled() {
                return;
            }
            match self.state {
                ReaderState::AwaitingHandshake => match self.handshake.decode(&mut self.buffer) {
                    Ok(Some(response)) => {
                        debug!("handshake accepted: subprotocol={:?}", response.subprotocol);
                        self.state = ReaderState::StreamingFrames;
                        self.emit(Message::ServerHandshake {
                            success: true,
                            subprotocol: response.subprotocol,
                        });
                    }
                    Ok(None) => return,
                    Err(HandshakeError::ServerStatus { status, reason }) => {
                        self.stop_with(Message::ServerError { status, reason });
                        return;
                    }
                    Err(HandshakeError::Io(e)) => {
                        warn!("reader I/O error: error={e}");
                        self.stop_with(Message::ConnectionLost);
                        return;
                    }
                    Err(e) => {
                        self.stop_with(Message::ProtocolViolation(e.to_string()));
                        return;
                    }
                },
                ReaderState::StreamingFrames => match self.codec.decode(&mut self.buffer) {
                    Ok(Some(frame)) => {
                        metrics::inc_frames(Direction::Inbound);
                        let span = receive_span(
                            &self.tracing,
                            opcode_kind(frame.opcode),
                            frame.payload.len(),
                        );
                        let _enter = span.enter();
                        tracing::trace!("frame decoded");
                        match self.to_message(frame) {
                            Ok(message) => self.emit(message),
                            Err(detail) => {
                                self.stop_with(Message::ProtocolViolation(detail));
                                return;
                            }
                        }
                    }
                    Ok(None) => return,
                    Err(e) => {
                        self.stop_with(Message::ProtocolViolation(e.to_string()));
                        return;
                    }
                },
                ReaderState::Stopped => return,
            }
        }
    }

    fn to_message(&self, frame: Frame) -> Result<Message, String> {
        match frame.opcode {
            OpCode::Text if self.raw_text => Ok(Message::RawText(frame.payload)),
            OpCode::Text => String::from_utf8(frame.payload.to_vec())
                .map(Message::Text)
                .map_err(|_| "text message is not valid UTF-8".to_owned()),
            OpCode::Binary => Ok(Message::Binary(frame.payload)),
            OpCode::Ping => Ok(Message::Ping(frame.payload)),
            OpCode::Pong => Ok(Message::Pong(frame.payload)),
            OpCode::Close => CloseFrame::parse(&frame.payload)
                .map(Message::Close)
                .map_err(|e| e.to_string()),
            OpCode::Continuation => Err("unexpected continuation frame".to_owned()),
        }
    }

    fn emit(&self, message: Message) {
        if self.events.send(message).is_err() {
            debug!("reader event dropped: manager has gone away");
        }
    }

    fn stop_with(&mut self, message: Message) {
        debug!("reader stopping: signal={}", message.kind());
        self.emit(message);
        self.state = ReaderState::Stopped;
    }
}

fn opcode_kind(opcode: OpCode) -> &'static str {
    match opcode {
        OpCode::Continuation => "continuation",
        OpCode::Text => "text",
        OpCode::Binary => "binary",
        OpCode::Close => "close",
        OpCode::Ping => "ping",
        OpCode::Pong => "pong",
    }
}

/// Running reader task.
pub(crate) struct ReaderHandle<R> {
    shutdown: CancellationToken,
    task: JoinHandle<Option<R>>,
}

impl<R> ReaderHandle<R> {
    /// Ask the reader to stop at its next read boundary.
    pub(crate) fn quit(&self) { self.shutdown.cancel(); }

    /// Wait for the reader and take back its stream half, if it exited
    /// cleanly.
    pub(crate) async fn join(self) -> Option<R> {
        match self.task.await {
            Ok(stream) => stream,
            Err(e) => {
                warn!("reader task failed: error={e}");
                None
            }
        }
    }
}

/// Spawn `reader`. A panic inside it is reported as [`Message::Error`].
pub(crate) fn spawn_reader<R>(reader: FrameReader<R>) -> ReaderHandle<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let shutdown = reader.shutdown.clone();
    let events = reader.events.clone();
    let task = tokio::spawn(async move {
        match AssertUnwindSafe(reader.run()).catch_unwind().await {
            Ok(stream) => Some(stream),
            Err(panic) => {
                let panic_msg = format_panic(panic);
                error!("reader task panicked: panic={panic_msg}");
                tracing::error!(panic = %panic_msg, "reader task panicked");
                let _ = events.send(Message::Error(format!("reader panicked: {panic_msg}")));
                None
            }
        }
    });
    ReaderHandle { shutdown, task }
}
