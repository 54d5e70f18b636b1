//! # Tunnel Session
//!
//! Owns one WebSocket for its lifetime and drives bidirectional frame
//! transport through a reader fiber and a writer fiber. The two run as
//! peers under a shared close latch (a `tokio::sync::Notify`) rather than
//! one nested inside the other: the first to fail notifies the latch, and
//! whichever fiber is still running observes it and exits too.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, Mutex, Notify};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::verify;
use crate::correlation::CancelReason;
use crate::error::RelayError;
use crate::protocol::ResponseFrame;
use crate::registry::TunnelState;
use crate::relay::Relay;

/// `GET /<connectionId>` — upgrades to the tunnel's control WebSocket.
///
/// Authentication and the attach-or-reject decision both happen *before*
/// the upgrade: if either fails, the handler returns a plain HTTP error
/// response and the connection is never promoted to a WebSocket, matching
/// "WebSocket handshake rejected" in the error table.
pub async fn ws_handler(
    Path(conn_id): Path<String>,
    State(relay): State<Relay>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    if let Err(e) = verify(relay.auth_mode(), &conn_id, &headers) {
        return e.into_response();
    }

    let session_id = Uuid::new_v4();
    let (tunnel, rx) = match relay
        .registry()
        .attach_session(&conn_id, session_id, relay.queue_soft_cap())
    {
        Ok(pair) => pair,
        Err(_) => return RelayError::AlreadyAttached.into_response(),
    };

    ws.on_upgrade(move |socket| run_session(socket, relay, conn_id, session_id, tunnel, rx))
        .into_response()
}

async fn run_session(
    socket: WebSocket,
    relay: Relay,
    conn_id: String,
    session_id: Uuid,
    tunnel: Arc<TunnelState>,
    rx: mpsc::UnboundedReceiver<pipegate_protocol::RequestFrame>,
) {
    info!(%conn_id, %session_id, "tunnel session ready");

    let (sink, stream) = socket.split();
    let sink = Arc::new(Mutex::new(sink));
    let close = Arc::new(Notify::new());

    let writer = tokio::spawn(run_writer(sink, rx, tunnel.clone(), close.clone()));
    let reader = tokio::spawn(run_reader(stream, relay.clone(), close.clone()));

    tokio::select! {
        _ = writer => {}
        _ = reader => {}
    }
    close.notify_waiters();

    teardown(&relay, &conn_id, session_id, &tunnel).await;
    info!(%conn_id, %session_id, "tunnel session closed");
}

async fn run_writer(
    sink: Arc<Mutex<futures::stream::SplitSink<WebSocket, Message>>>,
    mut rx: mpsc::UnboundedReceiver<pipegate_protocol::RequestFrame>,
    tunnel: Arc<TunnelState>,
    close: Arc<Notify>,
) {
    loop {
        tokio::select! {
            biased;
            _ = close.notified() => return,
            frame = rx.recv() => {
                let Some(frame) = frame else { return };
                tunnel.note_dequeued();
                let text = match serde_json::to_string(&frame) {
                    Ok(t) => t,
                    Err(e) => {
                        warn!(error = %e, "failed to serialize request frame");
                        continue;
                    }
                };
                let mut sink = sink.lock().await;
                if sink.send(Message::Text(text.into())).await.is_err() {
                    return;
                }
            }
        }
    }
}

async fn run_reader(
    mut stream: futures::stream::SplitStream<WebSocket>,
    relay: Relay,
    close: Arc<Notify>,
) {
    loop {
        tokio::select! {
            biased;
            _ = close.notified() => return,
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ResponseFrame>(&text) {
                            Ok(frame) => relay.correlation().fulfill(frame.correlation_id, frame),
                            Err(e) => {
                                warn!(error = %e, "malformed response frame; dropped, session continues");
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => return,
                    Some(Ok(_)) => {} // binary/ping/pong frames are not part of this protocol
                    Some(Err(e)) => {
                        debug!(error = %e, "websocket read error");
                        return;
                    }
                }
            }
        }
    }
}

async fn teardown(relay: &Relay, conn_id: &str, session_id: Uuid, tunnel: &Arc<TunnelState>) {
    relay.registry().detach_session(conn_id, session_id);
    for id in tunnel.outstanding_ids() {
        relay.correlation().cancel(id, CancelReason::TunnelClosed);
        tunnel.clear_outstanding(id);
    }
}
