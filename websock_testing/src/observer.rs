//! An observer that records callbacks for later assertions.

use std::time::Duration;

use bytes::Bytes;
use tokio::{sync::mpsc, time::timeout};
use websock::{CloseKind, WebSocketObserver};

/// Default bound on waiting for a single event.
pub const DEFAULT_EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// One observer callback.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ObservedEvent {
    /// `on_open`.
    Open,
    /// `on_close` with its kind and reason.
    Close(CloseKind, String),
    /// `on_text_message`.
    Text(String),
    /// `on_raw_text_message`.
    RawText(Bytes),
    /// `on_binary_message`.
    Binary(Bytes),
}

/// Forwards every callback to an [`EventStream`].
pub struct RecordingObserver {
    events: mpsc::UnboundedSender<ObservedEvent>,
}

impl RecordingObserver {
    /// Create an observer and the stream its callbacks feed.
    #[must_use]
    pub fn new() -> (Self, EventStream) {
        let (events, rx) = mpsc::unbounded_channel();
        (
            Self { events },
            EventStream {
                rx,
                timeout: DEFAULT_EVENT_TIMEOUT,
            },
        )
    }

    fn record(&self, event: ObservedEvent) {
        // The test may have stopped listening.
        let _ = self.events.send(event);
    }
}

impl WebSocketObserver for RecordingObserver {
    fn on_open(&mut self) { self.record(ObservedEvent::Open); }

    fn on_close(&mut self, kind: CloseKind, reason: &str) {
        self.record(ObservedEvent::Close(kind, reason.to_owned()));
    }

    fn on_text_message(&mut self, payload: String) { self.record(ObservedEvent::Text(payload)); }

    fn on_raw_text_message(&mut self, payload: Bytes) {
        self.record(ObservedEvent::RawText(payload));
    }

    fn on_binary_message(&mut self, payload: Bytes) { self.record(ObservedEvent::Binary(payload)); }
}

/// Receiving side of a [`RecordingObserver`].
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<ObservedEvent>,
    timeout: Duration,
}

impl EventStream {
    /// Change how long [`next`](Self::next) waits.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The next event, or `None` if none arrives in time or the observer was
    /// dropped.
    pub async fn next(&mut self) -> Option<ObservedEvent> {
        timeout(self.timeout, self.rx.recv()).await.ok().flatten()
    }

    /// The next event, which must be a close.
    ///
    /// # Panics
    ///
    /// Panics if the next event is missing or not a close.
    pub async fn next_close(&mut self) -> (CloseKind, String) {
        match self.next().await {
            Some(ObservedEvent::Close(kind, reason)) => (kind, reason),
            other => panic!("expected a close event, got {other:?}"),
        }
    }

    /// Whether no event arrives within `window`.
    pub async fn is_quiet_for(&mut self, window: Duration) -> bool {
        !matches!(timeout(window, self.rx.recv()).await, Ok(Some(_)))
    }
}
