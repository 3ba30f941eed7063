//! Span and timing helpers for connection operations.
//!
//! Keeps level selection and `elapsed_us` emission out of the manager, reader
//! and writer bodies.

use std::time::Instant;

use tracing::{Level, Span};

use super::{observer::CloseKind, tracing_config::TracingConfig};

/// Create a span at a level chosen at runtime.
///
/// Each arm expands a different `tracing::<level>_span!` macro so the span
/// metadata stays static while the level is dynamic.
macro_rules! dynamic_span {
    ($level:expr, $name:expr $(, $($field:tt)*)?) => {
        match $level {
            Level::ERROR => tracing::error_span!($name $(, $($field)*)?),
            Level::WARN  => tracing::warn_span!($name $(, $($field)*)?),
            Level::INFO  => tracing::info_span!($name $(, $($field)*)?),
            Level::DEBUG => tracing::debug_span!($name $(, $($field)*)?),
            Level::TRACE => tracing::trace_span!($name $(, $($field)*)?),
        }
    };
}

/// Span for a connect attempt. `result` is recorded when it finishes.
pub(crate) fn connect_span(config: &TracingConfig, uri: &str) -> Span {
    dynamic_span!(
        config.connect.level,
        "websock.connect",
        uri = uri,
        result = tracing::field::Empty
    )
}

/// Span for one write to the transport.
pub(crate) fn send_span(config: &TracingConfig, kind: &'static str, frame_bytes: usize) -> Span {
    dynamic_span!(
        config.send.level,
        "websock.send",
        message.kind = kind,
        frame.bytes = frame_bytes
    )
}

/// Span for one decoded inbound frame.
pub(crate) fn receive_span(config: &TracingConfig, kind: &'static str, frame_bytes: usize) -> Span {
    dynamic_span!(
        config.receive.level,
        "websock.receive",
        message.kind = kind,
        frame.bytes = frame_bytes
    )
}

/// Span for a terminal or reconnecting close.
pub(crate) fn close_span(config: &TracingConfig, kind: CloseKind) -> Span {
    dynamic_span!(config.close.level, "websock.close", close.kind = %kind)
}

/// Start a timer when `enabled`.
pub(crate) fn start_timer(enabled: bool) -> Option<Instant> { enabled.then(Instant::now) }

/// Emit an `elapsed_us` event if a timer was started.
pub(crate) fn emit_timing_event(start: Option<Instant>) {
    if let Some(start) = start {
        let elapsed_us = start.elapsed().as_micros();
        tracing::debug!(elapsed_us = elapsed_us, "operation.timing");
    }
}
