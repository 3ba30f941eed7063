//! A one-connection echo server.

use std::io;

use tokio::task::JoinHandle;
use websock::{Frame, OpCode};

use crate::server::TestServer;

/// Serve one connection on `server`: select the first offered subprotocol,
/// echo data frames, answer pings and return after echoing a close.
///
/// The task yields the upgrade request so tests can inspect its headers.
#[must_use]
pub fn spawn_echo_server(server: TestServer) -> JoinHandle<io::Result<crate::UpgradeRequest>> {
    tokio::spawn(async move {
        let mut peer = server.accept().await?;
        let request = peer.read_request().await?;
        let subprotocol = request.subprotocols().first().map(|p| (*p).to_owned());
        peer.complete_upgrade(&request, subprotocol.as_deref())
            .await?;

        while let Some(frame) = peer.read_frame().await? {
            match frame.opcode {
                OpCode::Text | OpCode::Binary => peer.send_frame(frame).await?,
                OpCode::Ping => peer.send_frame(Frame::pong(frame.payload)).await?,
                OpCode::Close => {
                    peer.send_frame(Frame::new(OpCode::Close, frame.payload))
                        .await?;
                    break;
                }
                OpCode::Pong | OpCode::Continuation => {}
            }
        }
        Ok(request)
    })
}
