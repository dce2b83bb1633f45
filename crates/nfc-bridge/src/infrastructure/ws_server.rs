//! WebSocket server: accept loop and per-session task management.
//!
//! Every browser that connects gets its own Tokio task.  The task:
//!
//! 1. Completes the WebSocket handshake.
//! 2. Sends the current `reader_status`.
//! 3. Multiplexes two sources with `tokio::select!`:
//!    - **Browser → Bridge**: text frames are parsed as [`ClientMsg`] and
//!      applied to the shared [`BridgeState`].  A refused command is answered
//!      on this session only.
//!    - **Bridge → Browser**: notifications from the broadcast hub are
//!      serialized and forwarded.
//!
//! A session that falls behind the hub loses the oldest notifications and
//! keeps going; a session whose socket fails ends alone.  Neither affects
//! the poll loop or other browsers.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::timeout;
use tokio_tungstenite::{
    accept_async,
    tungstenite::{Error as WsError, Message as WsMessage},
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::application::{apply_client_message, BridgeState};
use crate::domain::{ClientMsg, ServerMsg};

/// How often the accept loop wakes up to check the shutdown flag.
const ACCEPT_POLL: Duration = Duration::from_millis(200);

// ── Public API ────────────────────────────────────────────────────────────────

/// Binds the WebSocket listener.
///
/// # Errors
///
/// Returns an error if the address is in use or cannot be bound.
pub async fn bind(addr: SocketAddr) -> anyhow::Result<TcpListener> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind WebSocket listener on {addr}"))?;
    info!("WebSocket server listening on ws://{}", listener.local_addr()?);
    Ok(listener)
}

/// Accepts browser connections until `running` is set to `false`.
///
/// Each session subscribes to `events` before its task is spawned, so no
/// notification broadcast after the accept is missed.
pub async fn run_server(
    listener: TcpListener,
    state: Arc<BridgeState>,
    events: broadcast::Sender<ServerMsg>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    loop {
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; stopping accept loop");
            break;
        }

        match timeout(ACCEPT_POLL, listener.accept()).await {
            Ok(Ok((stream, peer_addr))) => {
                let subscription = events.subscribe();
                info!(
                    "browser connected from {peer_addr} ({} total)",
                    events.receiver_count()
                );
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    handle_browser_session(stream, peer_addr, state, subscription).await;
                });
            }
            Ok(Err(e)) => {
                error!("accept error: {e}");
            }
            Err(_) => {
                // Accept timed out; loop back to check the flag.
            }
        }
    }

    Ok(())
}

// ── Per-session handler ───────────────────────────────────────────────────────

async fn handle_browser_session(
    raw_stream: TcpStream,
    peer_addr: SocketAddr,
    state: Arc<BridgeState>,
    subscription: broadcast::Receiver<ServerMsg>,
) {
    let session_id = Uuid::new_v4();
    match run_session(raw_stream, peer_addr, session_id, &state, subscription).await {
        Ok(()) => info!("session {session_id} ({peer_addr}) closed"),
        Err(e) => warn!("session {session_id} ({peer_addr}) closed with error: {e:#}"),
    }
}

async fn run_session(
    raw_stream: TcpStream,
    peer_addr: SocketAddr,
    session_id: Uuid,
    state: &BridgeState,
    mut subscription: broadcast::Receiver<ServerMsg>,
) -> anyhow::Result<()> {
    let ws_stream = accept_async(raw_stream)
        .await
        .with_context(|| format!("WebSocket handshake failed with {peer_addr}"))?;
    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    debug!("session {session_id}: handshake complete with {peer_addr}");

    let status = ServerMsg::ReaderStatus {
        connected: state.reader_connected(),
    };
    ws_tx
        .send(WsMessage::Text(to_json(&status)?))
        .await
        .context("failed to send initial reader status")?;

    loop {
        tokio::select! {
            frame = ws_rx.next() => {
                let frame = match frame {
                    Some(Ok(frame)) => frame,
                    Some(Err(WsError::ConnectionClosed | WsError::Protocol(_))) | None => {
                        debug!("session {session_id}: browser stream ended");
                        break;
                    }
                    Some(Err(e)) => {
                        return Err(e).context("WebSocket read failed");
                    }
                };

                match frame {
                    WsMessage::Text(text) => match ClientMsg::parse(&text) {
                        Some(msg) => {
                            if let Some(reply) = apply_client_message(msg, state) {
                                debug!("session {session_id}: → {}", reply.type_name());
                                ws_tx
                                    .send(WsMessage::Text(to_json(&reply)?))
                                    .await
                                    .context("WebSocket send failed")?;
                            }
                        }
                        None => debug!("session {session_id}: ignoring frame {text:?}"),
                    },
                    WsMessage::Binary(_) => {
                        debug!("session {session_id}: binary frame ignored");
                    }
                    WsMessage::Close(_) => {
                        debug!("session {session_id}: close frame received");
                        break;
                    }
                    WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => {}
                }
            }

            event = subscription.recv() => {
                let msg = match event {
                    Ok(msg) => msg,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("session {session_id}: lagging, {skipped} notifications dropped");
                        continue;
                    }
                    Err(RecvError::Closed) => {
                        debug!("session {session_id}: notification hub closed");
                        break;
                    }
                };

                debug!("session {session_id}: → {}", msg.type_name());
                ws_tx
                    .send(WsMessage::Text(to_json(&msg)?))
                    .await
                    .context("WebSocket send failed")?;
            }
        }
    }

    Ok(())
}

fn to_json(msg: &ServerMsg) -> anyhow::Result<String> {
    serde_json::to_string(msg).with_context(|| format!("failed to serialize {}", msg.type_name()))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_tungstenite::connect_async;

    async fn start() -> (
        SocketAddr,
        Arc<BridgeState>,
        broadcast::Sender<ServerMsg>,
        Arc<AtomicBool>,
    ) {
        let listener = bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(BridgeState::new(Duration::from_secs(3)));
        let (events, _) = broadcast::channel(16);
        let running = Arc::new(AtomicBool::new(true));
        tokio::spawn(run_server(
            listener,
            Arc::clone(&state),
            events.clone(),
            Arc::clone(&running),
        ));
        (addr, state, events, running)
    }

    async fn next_json<S>(rx: &mut S) -> serde_json::Value
    where
        S: futures_util::Stream<Item = Result<WsMessage, WsError>> + Unpin,
    {
        let frame = timeout(Duration::from_secs(5), rx.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .expect("read error");
        serde_json::from_str(frame.to_text().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_initial_frame_reflects_reader_state() {
        // Arrange
        let (addr, state, _events, _running) = start().await;
        state.set_reader_connected(true);

        // Act
        let (mut ws, _) = connect_async(format!("ws://{addr}")).await.unwrap();

        // Assert
        assert_eq!(
            next_json(&mut ws).await,
            serde_json::json!({"type": "reader_status", "connected": true})
        );
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_session() {
        let (addr, _state, events, _running) = start().await;
        let (mut a, _) = connect_async(format!("ws://{addr}")).await.unwrap();
        let (mut b, _) = connect_async(format!("ws://{addr}")).await.unwrap();
        next_json(&mut a).await;
        next_json(&mut b).await;

        events
            .send(ServerMsg::TagScan {
                student_id: "42".into(),
            })
            .unwrap();

        let expected = serde_json::json!({"type": "tag_scan", "student_id": "42"});
        assert_eq!(next_json(&mut a).await, expected);
        assert_eq!(next_json(&mut b).await, expected);
    }

    #[tokio::test]
    async fn test_write_tag_then_cancel_updates_state() {
        // Arrange
        let (addr, state, _events, _running) = start().await;
        let (mut ws, _) = connect_async(format!("ws://{addr}")).await.unwrap();
        next_json(&mut ws).await;

        // Act
        ws.send(WsMessage::Text(
            r#"{"type":"write_tag","student_id":"42"}"#.into(),
        ))
        .await
        .unwrap();
        wait_for(|| state.pending_write() == Some("42".into())).await;

        ws.send(WsMessage::Text(r#"{"type":"cancel_write"}"#.into()))
            .await
            .unwrap();

        // Assert
        wait_for(|| state.pending_write().is_none()).await;
    }

    #[tokio::test]
    async fn test_refused_write_is_answered_to_sender_only() {
        // Arrange
        let (addr, state, _events, _running) = start().await;
        let (mut sender, _) = connect_async(format!("ws://{addr}")).await.unwrap();
        let (mut other, _) = connect_async(format!("ws://{addr}")).await.unwrap();
        next_json(&mut sender).await;
        next_json(&mut other).await;

        // Act
        sender
            .send(WsMessage::Text(
                r#"{"type":"write_tag","student_id":"class:42"}"#.into(),
            ))
            .await
            .unwrap();

        // Assert
        assert_eq!(
            next_json(&mut sender).await,
            serde_json::json!({
                "type": "write_complete",
                "success": false,
                "student_id": "class:42"
            })
        );
        assert_eq!(state.pending_write(), None);
        let more = timeout(Duration::from_millis(200), other.next()).await;
        assert!(more.is_err(), "other sessions hear nothing");
    }

    #[tokio::test]
    async fn test_garbage_frames_do_not_end_session() {
        let (addr, state, _events, _running) = start().await;
        let (mut ws, _) = connect_async(format!("ws://{addr}")).await.unwrap();
        next_json(&mut ws).await;

        ws.send(WsMessage::Text("not json".into())).await.unwrap();
        ws.send(WsMessage::Binary(vec![1, 2, 3])).await.unwrap();
        ws.send(WsMessage::Text(
            r#"{"type":"write_tag","student_id":"7"}"#.into(),
        ))
        .await
        .unwrap();

        wait_for(|| state.pending_write() == Some("7".into())).await;
    }

    #[tokio::test]
    async fn test_shutdown_flag_stops_accept_loop() {
        let listener = bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let state = Arc::new(BridgeState::new(Duration::from_secs(3)));
        let (events, _) = broadcast::channel(16);
        let running = Arc::new(AtomicBool::new(false));

        let result = timeout(
            Duration::from_secs(2),
            run_server(listener, state, events, running),
        )
        .await;

        assert!(matches!(result, Ok(Ok(()))));
    }

    async fn wait_for(mut condition: impl FnMut() -> bool) {
        for _ in 0..100 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("condition not met in time");
    }
}
