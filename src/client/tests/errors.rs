//! Failures surfaced through `on_close`.

use bytes::{Bytes, BytesMut};
use rstest::rstest;
use tokio::net::TcpListener;

use super::helpers::{Observed, Peer, Recorder, listen, next_close, next_event};
use crate::{
    client::{CloseKind, WebSocketConnection},
    codec::encode_frame,
    frame::Frame,
    options::WebSocketOptions,
};

#[rstest]
#[case::bad_accept(
    "HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: \
     Upgrade\r\nSec-WebSocket-Accept: AAAAAAAAAAAAAAAAAAAAAAAAAAA=\r\n\r\n"
)]
#[case::missing_accept(
    "HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n\r\n"
)]
#[case::garbage_status("SSH-2.0-OpenSSH\r\n\r\n")]
#[tokio::test]
async fn invalid_upgrade_is_a_protocol_error(#[case] response: &str) {
    let (listener, uri) = listen().await;
    let connection = WebSocketConnection::new();
    let (observer, mut events) = Recorder::new();
    connection.connect(&uri, observer).await.expect("connect");

    let mut peer = Peer::accept(&listener).await;
    let _request = peer.read_request().await;
    peer.send_raw(response.as_bytes()).await;

    let (kind, reason) = next_close(&mut events).await;
    assert_eq!(kind, CloseKind::ProtocolError);
    assert!(
        reason.starts_with("WebSocket protocol violation"),
        "unexpected reason: {reason}"
    );
    assert!(!connection.is_connected());
}

#[tokio::test]
async fn http_error_status_is_a_server_error() {
    let (listener, uri) = listen().await;
    let connection = WebSocketConnection::new();
    let (observer, mut events) = Recorder::new();
    connection.connect(&uri, observer).await.expect("connect");

    let mut peer = Peer::accept(&listener).await;
    let _request = peer.read_request().await;
    peer.send_raw(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n")
        .await;

    assert_eq!(
        next_event(&mut events).await,
        Observed::Close(CloseKind::ServerError, "Server error 404 (Not Found)".to_owned())
    );
}

#[tokio::test]
async fn unreachable_server_cannot_connect() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let connection = WebSocketConnection::new();
    let (observer, mut events) = Recorder::new();
    connection
        .connect(&format!("ws://{addr}/"), observer)
        .await
        .expect("connect attempt runs");
    let (kind, _reason) = next_close(&mut events).await;
    assert_eq!(kind, CloseKind::CannotConnect);
    assert!(!connection.is_connected());
}

async fn open(
    options: WebSocketOptions,
) -> (
    Peer,
    tokio::sync::mpsc::UnboundedReceiver<Observed>,
    WebSocketConnection,
) {
    let (listener, uri) = listen().await;
    let connection = WebSocketConnection::new();
    let (observer, mut events) = Recorder::new();
    connection
        .connect_with(&uri, Vec::new(), observer, options)
        .await
        .expect("connect");
    let peer = Peer::accept_open(&listener).await;
    assert_eq!(next_event(&mut events).await, Observed::Open);
    (peer, events, connection)
}

fn wire(frame: &Frame, mask: Option<[u8; 4]>) -> BytesMut {
    let mut wire = BytesMut::new();
    encode_frame(frame, mask, &mut wire).expect("encode");
    wire
}

#[rstest]
#[case::masked_by_server(wire(&Frame::text("x".to_owned()), Some([1, 2, 3, 4])))]
#[case::reserved_bits(BytesMut::from(&[0xC1u8, 0x00][..]))]
#[case::unknown_opcode(BytesMut::from(&[0x83u8, 0x00][..]))]
#[case::fragmented(BytesMut::from(&[0x01u8, 0x01, b'a'][..]))]
#[case::invalid_utf8(BytesMut::from(&[0x81u8, 0x02, 0xC3, 0x28][..]))]
#[case::truncated_close(BytesMut::from(&[0x88u8, 0x01, 0x03][..]))]
#[tokio::test]
async fn malformed_frames_are_protocol_errors(#[case] bytes: BytesMut) {
    let (mut peer, mut events, connection) = open(WebSocketOptions::default()).await;
    peer.send_raw(&bytes).await;
    let (kind, reason) = next_close(&mut events).await;
    assert_eq!(kind, CloseKind::ProtocolError, "reason: {reason}");
    assert!(!connection.is_connected());
}

#[tokio::test]
async fn oversized_payload_is_a_protocol_error() {
    let options = WebSocketOptions::default().max_frame_payload_size(1024);
    let (mut peer, mut events, _connection) = open(options).await;
    peer.send_frame(&Frame::binary(Bytes::from(vec![0u8; 2048]))).await;
    let (kind, _reason) = next_close(&mut events).await;
    assert_eq!(kind, CloseKind::ProtocolError);
}

#[tokio::test]
async fn server_dropping_the_transport_is_connection_lost() {
    let (peer, mut events, connection) = open(WebSocketOptions::default()).await;
    drop(peer);
    assert_eq!(
        next_event(&mut events).await,
        Observed::Close(CloseKind::ConnectionLost, "WebSocket connection lost".to_owned())
    );
    assert!(!connection.is_connected());
}
