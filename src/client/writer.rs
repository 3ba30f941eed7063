//! Writer task: serialises queued messages onto the transport.

use std::{panic::AssertUnwindSafe, time::Duration};

use bytes::BytesMut;
use futures::FutureExt;
use log::{debug, error, warn};
use thiserror::Error;
use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    sync::mpsc,
    task::JoinHandle,
    time::timeout,
};
use tokio_util::codec::Encoder as _;
use tracing::Instrument;

use super::{
    tracing_config::TracingConfig,
    tracing_helpers::{emit_timing_event, send_span, start_timer},
};
use crate::{
    codec::{CodecError, FrameCodec},
    frame::{Frame, OpCode},
    message::Message,
    metrics::{self, Direction},
    panic::format_panic,
};

#[derive(Debug, Error)]
enum WriteError {
    #[error("transport write failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("frame encoding failed: {0}")]
    Codec(#[from] CodecError),
    #[error("{0} cannot be written to the transport")]
    Unsupported(&'static str),
    #[error("{0} written before the opening handshake")]
    HandshakePending(&'static str),
}

pub(crate) struct FrameWriter<W> {
    stream: W,
    queue: mpsc::UnboundedReceiver<Message>,
    events: mpsc::UnboundedSender<Message>,
    codec: FrameCodec,
    buffer: BytesMut,
    handshake_sent: bool,
    tracing: TracingConfig,
}

impl<W> FrameWriter<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    pub(crate) fn new(
        stream: W,
        queue: mpsc::UnboundedReceiver<Message>,
        events: mpsc::UnboundedSender<Message>,
        codec: FrameCodec,
        tracing: TracingConfig,
    ) -> Self {
        Self {
            stream,
            queue,
            events,
            codec,
            buffer: BytesMut::new(),
            handshake_sent: false,
            tracing,
        }
    }

    /// Write queued messages until [`Message::Quit`] or a failure, then hand
    /// the stream half back.
    pub(crate) async fn run(mut self) -> W {
        debug!("writer started");
        while let Some(message) = self.queue.recv().await {
            if matches!(message, Message::Quit) {
                debug!("writer received quit");
                break;
            }
            match self.write(message).await {
                Ok(()) => {}
                Err(WriteError::Io(e)) => {
                    warn!("writer I/O error: error={e}");
                    self.signal(Message::ConnectionLost);
                    break;
                }
                Err(e) => {
                    error!("writer fault: error={e}");
                    self.signal(Message::Error(e.to_string()));
                    break;
                }
            }
        }
        debug!("writer stopped");
        self.stream
    }

    async fn write(&mut self, message: Message) -> Result<(), WriteError> {
        let kind = message.kind();
        self.buffer.clear();
        let frame = match message {
            Message::ClientHandshake(request) => {
                request.encode(&mut self.buffer);
                self.handshake_sent = true;
                None
            }
            _ if !self.handshake_sent => return Err(WriteError::HandshakePending(kind)),
            Message::Text(text) => Some(Frame::text(text)),
            Message::RawText(bytes) => Some(Frame::new(OpCode::Text, bytes)),
            Message::Binary(bytes) => Some(Frame::binary(bytes)),
            Message::Ping(bytes) => Some(Frame::ping(bytes)),
            Message::Pong(bytes) => Some(Frame::pong(bytes)),
            Message::Close(close) => Some(Frame::close(&close)),
            _ => return Err(WriteError::Unsupported(kind)),
        };
        let is_frame = frame.is_some();
        if let Some(frame) = frame {
            self.codec.encode(frame, &mut self.buffer)?;
        }

        let span = send_span(&self.tracing, kind, self.buffer.len());
        let start = start_timer(self.tracing.send.timing);
        async {
            self.stream.write_all(&self.buffer).await?;
            self.stream.flush().await
        }
        .instrument(span.clone())
        .await?;
        span.in_scope(|| emit_timing_event(start));

        if is_frame {
            metrics::inc_frames(Direction::Outbound);
        }
        Ok(())
    }

    fn signal(&self, message: Message) {
        if self.events.send(message).is_err() {
            debug!("writer event dropped: manager has gone away");
        }
    }
}

/// Running writer task.
pub(crate) struct WriterHandle<W> {
    queue: mpsc::UnboundedSender<Message>,
    task: JoinHandle<Option<W>>,
}

impl<W> WriterHandle<W> {
    /// Queue `message` for writing. Returns `false` once the writer has
    /// exited.
    pub(crate) fn forward(&self, message: Message) -> bool {
        match self.queue.send(message) {
            Ok(()) => true,
            Err(mpsc::error::SendError(message)) => {
                debug!("writer has stopped; dropping {}", message.kind());
                false
            }
        }
    }

    /// Send [`Message::Quit`] and wait up to `grace` for the writer to drain
    /// its queue. A writer still blocked after `grace` is aborted.
    pub(crate) async fn quit_and_join(mut self, grace: Duration) -> Option<W> {
        self.forward(Message::Quit);
        match timeout(grace, &mut self.task).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                warn!("writer task failed: error={e}");
                None
            }
            Err(_) => {
                warn!("writer did not stop within {grace:?}; aborting");
                self.task.abort();
                None
            }
        }
    }
}

/// Spawn `writer`. A panic inside it is reported as [`Message::Error`].
pub(crate) fn spawn_writer<W>(
    writer: FrameWriter<W>,
    queue: mpsc::UnboundedSender<Message>,
) -> WriterHandle<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let events = writer.events.clone();
    let task = tokio::spawn(async move {
        match AssertUnwindSafe(writer.run()).catch_unwind().await {
            Ok(stream) => Some(stream),
            Err(panic) => {
                let panic_msg = format_panic(panic);
                error!("writer task panicked: panic={panic_msg}");
                tracing::error!(panic = %panic_msg, "writer task panicked");
                let _ = events.send(Message::Error(format!("writer panicked: {panic_msg}")));
                None
            }
        }
    });
    WriterHandle { queue, task }
}
