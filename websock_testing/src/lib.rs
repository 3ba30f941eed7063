//! Test support for [`websock`] connections.
//!
//! [`TestServer`] accepts real loopback connections and lets a test script
//! the server side of the protocol frame by frame, while
//! [`RecordingObserver`] turns observer callbacks into an awaitable stream.
//!
//! ```rust,no_run
//! use websock::WebSocketConnection;
//! use websock_testing::{ObservedEvent, RecordingObserver, TestResult, TestServer};
//!
//! # async fn example() -> TestResult {
//! let server = TestServer::bind().await?;
//! let (observer, mut events) = RecordingObserver::new();
//! let connection = WebSocketConnection::new();
//! connection.connect(&server.uri("/chat"), observer).await?;
//! let _peer = server.accept_upgrade().await?;
//! assert_eq!(events.next().await, Some(ObservedEvent::Open));
//! # Ok(())
//! # }
//! ```

pub mod echo_server;
pub mod logging;
pub mod observer;
pub mod server;

pub use echo_server::spawn_echo_server;
pub use logging::{LoggerHandle, logger};
pub use observer::{EventStream, ObservedEvent, RecordingObserver};
pub use server::{ServerPeer, TestServer, UpgradeRequest};

/// Shared result type for integration tests.
pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error + Send + Sync>>;
