//! Tracing spans around connect, send, receive and close.
//!
//! Span names only appear in captured output as the context of an event, so
//! each test enables the timing event for the operation under test.

use bytes::Bytes;
use rstest::rstest;
use tracing_test::traced_test;

use super::helpers::{Observed, Peer, Recorder, listen, next_close, next_event};
use crate::{
    client::{CloseKind, TracingConfig, WebSocketConnection},
    frame::Frame,
};

fn find_line(lines: &[&str], needles: &[&str]) -> Result<(), String> {
    lines
        .iter()
        .find(|line| needles.iter().all(|n| line.contains(n)))
        .map(|_| ())
        .ok_or_else(|| format!("no line containing {needles:?} in:\n{}", lines.join("\n")))
}

#[rstest]
#[traced_test]
#[tokio::test]
async fn connect_emits_span_with_uri() {
    let (listener, uri) = listen().await;
    let connection =
        WebSocketConnection::with_tracing(TracingConfig::default().with_connect_timing(true));
    let (observer, mut events) = Recorder::new();
    connection.connect(&uri, observer).await.expect("connect");
    let _peer = Peer::accept_open(&listener).await;
    assert_eq!(next_event(&mut events).await, Observed::Open);

    let expected_uri = uri.clone();
    logs_assert(move |lines: &[&str]| {
        find_line(lines, &["websock.connect", &expected_uri, "elapsed_us"])
    });
}

#[rstest]
#[traced_test]
#[tokio::test]
async fn send_emits_span_with_frame_bytes() {
    let (listener, uri) = listen().await;
    let connection =
        WebSocketConnection::with_tracing(TracingConfig::default().with_send_timing(true));
    let (observer, mut events) = Recorder::new();
    connection.connect(&uri, observer).await.expect("connect");
    let mut peer = Peer::accept_open(&listener).await;
    assert_eq!(next_event(&mut events).await, Observed::Open);

    connection
        .send_binary_message(Bytes::from_static(b"abc"))
        .expect("send");
    let _frame = peer.read_frame().await.expect("frame");

    logs_assert(|lines: &[&str]| {
        find_line(lines, &["websock.send", "message.kind=\"binary\"", "frame.bytes"])
    });
}

#[rstest]
#[traced_test]
#[tokio::test]
async fn receive_emits_span_per_frame() {
    let (listener, uri) = listen().await;
    let connection = WebSocketConnection::new();
    let (observer, mut events) = Recorder::new();
    connection.connect(&uri, observer).await.expect("connect");
    let mut peer = Peer::accept_open(&listener).await;
    assert_eq!(next_event(&mut events).await, Observed::Open);

    peer.send_frame(&Frame::text("traced".to_owned())).await;
    assert_eq!(next_event(&mut events).await, Observed::Text("traced".to_owned()));

    logs_assert(|lines: &[&str]| find_line(lines, &["websock.receive", "frame decoded"]));
}

#[rstest]
#[traced_test]
#[tokio::test]
async fn close_emits_span_with_kind() {
    let (listener, uri) = listen().await;
    let connection =
        WebSocketConnection::with_tracing(TracingConfig::default().with_close_timing(true));
    let (observer, mut events) = Recorder::new();
    connection.connect(&uri, observer).await.expect("connect");
    let peer = Peer::accept_open(&listener).await;
    assert_eq!(next_event(&mut events).await, Observed::Open);

    drop(peer);
    assert_eq!(next_close(&mut events).await.0, CloseKind::ConnectionLost);

    logs_assert(|lines: &[&str]| {
        find_line(lines, &["websock.close", "CONNECTION_LOST", "elapsed_us"])
    });
}
