//! Client connection runtime.
//!
//! [`WebSocketConnection`] is a handle to a manager task that owns the
//! observer and the live session. Each session runs a reader and a writer
//! task over one split transport; both report to the manager through a
//! per-session event channel, so signals from a finished session can never
//! reach the next one.

mod connection;
mod connector;
mod error;
mod manager;
mod observer;
mod reader;
mod tracing_config;
mod tracing_helpers;
mod writer;

pub use connection::WebSocketConnection;
pub use error::{ConnectError, ConnectorError, SendError};
pub use observer::{CloseKind, WebSocketObserver};
pub use tracing_config::TracingConfig;

#[cfg(test)]
mod tests;
