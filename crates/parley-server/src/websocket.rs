//! WebSocket connection handling.

use crate::state::AppState;
use anyhow::Result;
use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use parley_core::SessionEvent;
use parley_types::{WsClientMessage, WsServerMessage};
use std::sync::Arc;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

/// Maximum size for candidate or founder text (10KB)
const MAX_TEXT_SIZE: usize = 10 * 1024;

/// Map a session event onto the wire protocol.
pub fn to_server_message(event: SessionEvent) -> WsServerMessage {
    match event {
        SessionEvent::MessageAppended { channel, message } => {
            WsServerMessage::ChatAppend { channel, message }
        }
        SessionEvent::TaskAssigned { channel, task } => WsServerMessage::TaskAssign {
            channel,
            task: *task,
        },
        SessionEvent::TaskGraded {
            task_id,
            score,
            detail,
        } => WsServerMessage::TaskResult {
            task_id,
            score,
            detail,
        },
        SessionEvent::ChannelLocked { channel } => WsServerMessage::ChannelLocked { channel },
        SessionEvent::HighlightAdded(highlight) => WsServerMessage::HighlightAdded(highlight),
    }
}

fn encode(msg: &WsServerMessage) -> Result<Message> {
    Ok(Message::Text(serde_json::to_string(msg)?.into()))
}

pub async fn handle_websocket(
    socket: WebSocket,
    state: Arc<AppState>,
    session_id: Uuid,
) -> Result<()> {
    let (mut ws_tx, mut ws_rx) = socket.split();

    // Snapshot and subscription come from the same locked read.
    let Some((snapshot, event_rx)) = state.session_manager.join(session_id).await else {
        warn!(target: "parley::ws", "WebSocket for unknown session {}", session_id);
        let error = WsServerMessage::Error {
            code: "session_not_found".to_string(),
            message: format!("Session not found: {}", session_id),
        };
        ws_tx.send(encode(&error)?).await?;
        ws_tx.send(Message::Close(None)).await?;
        return Ok(());
    };

    ws_tx.send(encode(&WsServerMessage::SessionState(snapshot))?).await?;
    info!(target: "parley::ws", "Client joined session {}", session_id);

    // Replies produced by recv_task (pong, join snapshots).
    let (outgoing_tx, mut outgoing_rx) = tokio::sync::mpsc::channel::<WsServerMessage>(32);

    let mut events = BroadcastStream::new(event_rx);
    let state_clone = state.clone();
    let mut send_task = tokio::spawn(async move {
        loop {
            let msg = tokio::select! {
                Some(msg) = outgoing_rx.recv() => msg,
                Some(item) = events.next() => match item {
                    Ok(event) => to_server_message(event),
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        warn!(
                            target: "parley::ws",
                            "Client of session {} lagged by {} events, resending state",
                            session_id,
                            skipped
                        );
                        match state_clone.session_manager.snapshot(session_id).await {
                            Some(snapshot) => WsServerMessage::SessionState(snapshot),
                            None => break,
                        }
                    }
                },
                else => break,
            };

            let frame = match encode(&msg) {
                Ok(frame) => frame,
                Err(e) => {
                    warn!(target: "parley::ws", "Failed to serialize message for session {}: {}", session_id, e);
                    continue;
                }
            };
            if let Err(e) = ws_tx.send(frame).await {
                debug!(
                    target: "parley::ws",
                    "WebSocket send failed for session {} (client likely disconnected): {}",
                    session_id,
                    e
                );
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            let text = match msg {
                Message::Text(text) => text,
                Message::Close(_) => break,
                _ => continue,
            };
            let client_msg = match serde_json::from_str::<WsClientMessage>(&text) {
                Ok(m) => m,
                Err(e) => {
                    debug!(target: "parley::ws", "Ignoring malformed message on session {}: {}", session_id, e);
                    continue;
                }
            };
            handle_client_message(&state, session_id, client_msg, &outgoing_tx).await;
        }
    });

    tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
        }
        _ = &mut recv_task => {
            send_task.abort();
        }
    }

    info!(target: "parley::ws", "Client left session {}", session_id);
    Ok(())
}

async fn handle_client_message(
    state: &AppState,
    session_id: Uuid,
    msg: WsClientMessage,
    outgoing: &tokio::sync::mpsc::Sender<WsServerMessage>,
) {
    let manager = &state.session_manager;
    match msg {
        WsClientMessage::Join => {
            if let Some(snapshot) = manager.snapshot(session_id).await {
                let _ = outgoing.send(WsServerMessage::SessionState(snapshot)).await;
            }
        }
        WsClientMessage::Message { channel, text } => {
            if text.len() > MAX_TEXT_SIZE {
                warn!(
                    target: "parley::ws",
                    "Message too large ({} bytes) on session {}, max {} bytes",
                    text.len(),
                    session_id,
                    MAX_TEXT_SIZE
                );
                return;
            }
            manager.post_message(session_id, &channel, &text).await;
        }
        WsClientMessage::Inject { channel, text } => {
            if text.len() > MAX_TEXT_SIZE {
                warn!(target: "parley::ws", "Injection too large ({} bytes) on session {}", text.len(), session_id);
                return;
            }
            manager.inject(session_id, &channel, &text).await;
        }
        WsClientMessage::LockChannel { channel } => {
            manager.lock_channel(session_id, &channel).await;
        }
        WsClientMessage::SubmitTask { task_id, answer } => {
            manager.submit_task(session_id, &task_id, answer).await;
        }
        WsClientMessage::AddHighlight {
            channel,
            idx_start,
            idx_end,
            reason,
        } => {
            if manager
                .add_highlight(session_id, &channel, idx_start, idx_end, reason)
                .await
                .is_none()
            {
                debug!(
                    target: "parley::ws",
                    "Rejected highlight {}..{} on '{}' in session {}",
                    idx_start,
                    idx_end,
                    channel,
                    session_id
                );
            }
        }
        WsClientMessage::Ping { timestamp } => {
            let _ = outgoing.send(WsServerMessage::Pong { timestamp }).await;
            trace!(target: "parley::ws::ping", "Sent pong for timestamp: {}", timestamp);
        }
    }
}
