//! Span levels and timing for connection operations.

use tracing::Level;

/// Level and timing switch for one kind of operation.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Instrumentation {
    pub(crate) level: Level,
    pub(crate) timing: bool,
}

impl Instrumentation {
    const fn at(level: Level) -> Self {
        Self {
            level,
            timing: false,
        }
    }
}

/// Tracing settings for a [`WebSocketConnection`].
///
/// Each operation gets a span at a configurable level: `websock.connect`
/// and `websock.close` default to `INFO`, while the per-frame
/// `websock.send` and `websock.receive` default to `DEBUG`. Connect, send
/// and close can also emit an `operation.timing` event carrying
/// `elapsed_us`; timing is off unless enabled.
///
/// ```
/// use tracing::Level;
/// use websock::TracingConfig;
///
/// let config = TracingConfig::default()
///     .with_send_level(Level::TRACE)
///     .with_connect_timing(true);
/// # drop(config);
/// ```
///
/// [`WebSocketConnection`]: crate::WebSocketConnection
#[derive(Clone, Debug)]
pub struct TracingConfig {
    pub(crate) connect: Instrumentation,
    pub(crate) send: Instrumentation,
    pub(crate) receive: Instrumentation,
    pub(crate) close: Instrumentation,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            connect: Instrumentation::at(Level::INFO),
            send: Instrumentation::at(Level::DEBUG),
            receive: Instrumentation::at(Level::DEBUG),
            close: Instrumentation::at(Level::INFO),
        }
    }
}

impl TracingConfig {
    #[must_use]
    pub fn with_connect_level(mut self, level: Level) -> Self {
        self.connect.level = level;
        self
    }

    /// Time each connect attempt, including DNS and TLS.
    #[must_use]
    pub fn with_connect_timing(mut self, enabled: bool) -> Self {
        self.connect.timing = enabled;
        self
    }

    #[must_use]
    pub fn with_send_level(mut self, level: Level) -> Self {
        self.send.level = level;
        self
    }

    /// Time each transport write.
    #[must_use]
    pub fn with_send_timing(mut self, enabled: bool) -> Self {
        self.send.timing = enabled;
        self
    }

    #[must_use]
    pub fn with_receive_level(mut self, level: Level) -> Self {
        self.receive.level = level;
        self
    }

    #[must_use]
    pub fn with_close_level(mut self, level: Level) -> Self {
        self.close.level = level;
        self
    }

    /// Time teardown, from stopping the workers to releasing the transport.
    #[must_use]
    pub fn with_close_timing(mut self, enabled: bool) -> Self {
        self.close.timing = enabled;
        self
    }

    /// Use `level` for every span.
    #[must_use]
    pub fn with_all_levels(self, level: Level) -> Self {
        self.with_connect_level(level)
            .with_send_level(level)
            .with_receive_level(level)
            .with_close_level(level)
    }

    /// Switch timing for connect, send and close together.
    #[must_use]
    pub fn with_all_timing(self, enabled: bool) -> Self {
        self.with_connect_timing(enabled)
            .with_send_timing(enabled)
            .with_close_timing(enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_spans_default_below_lifecycle_spans() {
        let config = TracingConfig::default();
        assert_eq!(config.connect.level, Level::INFO);
        assert_eq!(config.close.level, Level::INFO);
        assert_eq!(config.send.level, Level::DEBUG);
        assert_eq!(config.receive.level, Level::DEBUG);
        assert!(!config.connect.timing && !config.send.timing && !config.close.timing);
    }

    #[test]
    fn bulk_setters_touch_every_operation() {
        let config = TracingConfig::default()
            .with_all_levels(Level::TRACE)
            .with_all_timing(true);
        for op in [config.connect, config.send, config.receive, config.close] {
            assert_eq!(op.level, Level::TRACE);
        }
        assert!(config.connect.timing && config.send.timing && config.close.timing);
    }
}
