//! Tests for the opening handshake request and response decoder.

use rstest::{fixture, rstest};

use super::*;

const SAMPLE_KEY: HandshakeKey = HandshakeKey::from_bytes(*b"the sample nonce");
const SAMPLE_ACCEPT: &str = "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=";

#[allow(
    unused_braces,
    reason = "rustc false positive for single line rstest fixtures"
)]
#[fixture]
fn request() -> HandshakeRequest { HandshakeRequest::new("example.com", "/chat", SAMPLE_KEY) }

fn response(extra: &str) -> BytesMut {
    BytesMut::from(
        format!(
            "HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: \
             Upgrade\r\nSec-WebSocket-Accept: {SAMPLE_ACCEPT}\r\n{extra}\r\n"
        )
        .as_bytes(),
    )
}

#[test]
fn accept_matches_rfc_example() {
    assert_eq!(SAMPLE_KEY.encoded(), "dGhlIHNhbXBsZSBub25jZQ==");
    assert_eq!(SAMPLE_KEY.expected_accept(), SAMPLE_ACCEPT);
}

#[rstest]
fn request_head_lists_required_headers(request: HandshakeRequest) {
    let mut buf = BytesMut::new();
    request
        .with_origin(Some("http://example.com".into()))
        .with_subprotocols(vec!["chat".into(), "superchat".into()])
        .encode(&mut buf);
    let head = std::str::from_utf8(&buf).expect("request head is ASCII");

    assert!(head.starts_with("GET /chat HTTP/1.1\r\nHost: example.com\r\n"));
    assert!(head.contains("Upgrade: websocket\r\n"));
    assert!(head.contains("Connection: Upgrade\r\n"));
    assert!(head.contains("Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n"));
    assert!(head.contains("Origin: http://example.com\r\n"));
    assert!(head.contains("Sec-WebSocket-Protocol: chat, superchat\r\n"));
    assert!(head.ends_with("Sec-WebSocket-Version: 13\r\n\r\n"));
}

#[rstest]
fn request_head_omits_optional_headers(request: HandshakeRequest) {
    let mut buf = BytesMut::new();
    request.encode(&mut buf);
    let head = std::str::from_utf8(&buf).expect("request head is ASCII");
    assert!(!head.contains("Origin:"));
    assert!(!head.contains("Sec-WebSocket-Protocol:"));
}

#[rstest]
fn valid_response_leaves_trailing_bytes(request: HandshakeRequest) {
    let mut buf = response("");
    buf.extend_from_slice(&[0x81, 0x02, b'h', b'i']);
    let mut decoder = request.response_decoder();

    let outcome = decoder
        .decode(&mut buf)
        .expect("handshake should validate")
        .expect("response head is complete");
    assert_eq!(outcome.subprotocol, None);
    assert_eq!(buf.as_ref(), &[0x81, 0x02, b'h', b'i']);
}

#[rstest]
fn partial_response_waits_for_blank_line(request: HandshakeRequest) {
    let full = response("");
    let mut decoder = request.response_decoder();
    let mut buf = BytesMut::from(&full[..full.len() - 1]);
    assert!(decoder.decode(&mut buf).expect("no error yet").is_none());
    buf.extend_from_slice(&full[full.len() - 1..]);
    assert!(decoder.decode(&mut buf).expect("handshake should validate").is_some());
}

#[rstest]
fn header_names_are_case_insensitive(request: HandshakeRequest) {
    let mut buf = BytesMut::from(
        format!(
            "HTTP/1.1 101 Switching Protocols\r\nupgrade: WebSocket\r\nCONNECTION: keep-alive, \
             upgrade\r\nsec-websocket-accept: {SAMPLE_ACCEPT}\r\n\r\n"
        )
        .as_bytes(),
    );
    let mut decoder = request.response_decoder();
    assert!(decoder.decode(&mut buf).expect("handshake should validate").is_some());
}

#[rstest]
fn non_switching_status_is_reported(request: HandshakeRequest) {
    let mut buf = BytesMut::from(&b"HTTP/1.1 403 Forbidden\r\nContent-Length: 0\r\n\r\n"[..]);
    let mut decoder = request.response_decoder();
    match decoder.decode(&mut buf) {
        Err(HandshakeError::ServerStatus { status, reason }) => {
            assert_eq!(status, 403);
            assert_eq!(reason, "Forbidden");
        }
        other => panic!("expected ServerStatus, got {other:?}"),
    }
}

#[rstest]
#[case::missing_accept(
    "HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n\r\n"
)]
#[case::wrong_accept(
    "HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: \
     Upgrade\r\nSec-WebSocket-Accept: bm90IHRoZSBhY2NlcHQ=\r\n\r\n"
)]
#[case::not_upgrade(
    "HTTP/1.1 101 Switching Protocols\r\nConnection: Upgrade\r\nSec-WebSocket-Accept: \
     s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n\r\n"
)]
#[case::garbage_status("SSH-2.0-OpenSSH\r\n\r\n")]
#[case::garbage_header(
    "HTTP/1.1 101 Switching Protocols\r\nnot a header\r\n\r\n"
)]
fn invalid_responses_are_rejected(request: HandshakeRequest, #[case] raw: &str) {
    let mut buf = BytesMut::from(raw.as_bytes());
    let mut decoder = request.response_decoder();
    let err = decoder.decode(&mut buf).expect_err("response should be rejected");
    assert!(!matches!(err, HandshakeError::ServerStatus { .. }), "{err}");
}

#[rstest]
#[case::offered_and_selected(vec!["chat"], Some("chat"), true)]
#[case::offered_and_other_selected(vec!["chat"], Some("superchat"), false)]
#[case::offered_and_none_selected(vec!["chat"], None, false)]
#[case::none_offered_but_selected(vec![], Some("chat"), false)]
#[case::none_offered_none_selected(vec![], None, true)]
fn subprotocol_selection(
    #[case] offered: Vec<&str>,
    #[case] selected: Option<&str>,
    #[case] accepted: bool,
) {
    let offered = offered.into_iter().map(str::to_owned).collect();
    let mut decoder = HandshakeRequest::new("example.com", "/", SAMPLE_KEY)
        .with_subprotocols(offered)
        .response_decoder();
    let extra = selected
        .map(|p| format!("Sec-WebSocket-Protocol: {p}\r\n"))
        .unwrap_or_default();
    let mut buf = response(&extra);

    match decoder.decode(&mut buf) {
        Ok(Some(outcome)) => {
            assert!(accepted, "selection {selected:?} should have been rejected");
            assert_eq!(outcome.subprotocol.as_deref(), selected);
        }
        Err(HandshakeError::SubprotocolMismatch(got)) => {
            assert!(!accepted, "selection {selected:?} should have been accepted");
            assert_eq!(got.as_deref(), selected);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[rstest]
fn oversized_head_is_rejected(request: HandshakeRequest) {
    let mut buf = BytesMut::from(&b"HTTP/1.1 101 Switching Protocols\r\n"[..]);
    buf.extend_from_slice(&vec![b'x'; MAX_RESPONSE_HEAD]);
    let mut decoder = request.response_decoder();
    assert!(matches!(
        decoder.decode(&mut buf),
        Err(HandshakeError::HeaderTooLarge { .. })
    ));
}
