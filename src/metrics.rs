//! Metric helpers for `websock`.
//!
//! Names and helper functions wrapping the [`metrics`](https://docs.rs/metrics)
//! crate. Without the `metrics` feature every helper compiles to a no-op.

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

/// Gauge of open transports.
pub const CONNECTIONS_ACTIVE: &str = "websock_connections_active";
/// Counter of frames written or read, labelled by `direction`.
pub const FRAMES_TOTAL: &str = "websock_frames_total";
/// Counter of scheduled reconnect attempts.
pub const RECONNECTS_TOTAL: &str = "websock_reconnects_total";
/// Counter of abnormal closes, labelled by `kind`.
pub const ERRORS_TOTAL: &str = "websock_errors_total";

/// Direction of frame traffic.
#[derive(Clone, Copy, Debug)]
pub enum Direction {
    /// Frames read from the server.
    Inbound,
    /// Frames written to the server.
    Outbound,
}

impl Direction {
    #[cfg_attr(not(feature = "metrics"), expect(dead_code, reason = "used only by metric labels"))]
    fn as_str(self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

/// Increment the active connections gauge.
#[cfg(feature = "metrics")]
pub fn inc_connections() { gauge!(CONNECTIONS_ACTIVE).increment(1.0); }

/// Decrement the active connections gauge.
#[cfg(feature = "metrics")]
pub fn dec_connections() { gauge!(CONNECTIONS_ACTIVE).decrement(1.0); }

/// Record a frame for the given direction.
#[cfg(feature = "metrics")]
pub fn inc_frames(direction: Direction) {
    counter!(FRAMES_TOTAL, "direction" => direction.as_str()).increment(1);
}

/// Record a scheduled reconnect.
#[cfg(feature = "metrics")]
pub fn inc_reconnects() { counter!(RECONNECTS_TOTAL).increment(1); }

/// Record an abnormal close of the given kind.
#[cfg(feature = "metrics")]
pub fn inc_errors(kind: &'static str) { counter!(ERRORS_TOTAL, "kind" => kind).increment(1); }

#[cfg(not(feature = "metrics"))]
pub fn inc_connections() {}

#[cfg(not(feature = "metrics"))]
pub fn dec_connections() {}

#[cfg(not(feature = "metrics"))]
pub fn inc_frames(_direction: Direction) {}

#[cfg(not(feature = "metrics"))]
pub fn inc_reconnects() {}

#[cfg(not(feature = "metrics"))]
pub fn inc_errors(_kind: &'static str) {}
