//! WebSocket handler — binary frame relay for one room member.
//!
//! DESIGN
//! ======
//! On upgrade the connection registers a bounded outbound queue with its
//! room and splits the socket. A dedicated writer task sends the join
//! replay and then drains the queue; the reader loop hands every inbound
//! binary message to the room service. The room holds the only sender, so
//! a client dropped by fan-out sees its queue close and its writer exit.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade → join room → writer sends buffered SYNC, Step1, presence
//! 2. Binary message → `relay_frame` (buffer/cache + fan-out)
//! 3. Close, read error, or writer exit → `part_room` (leave + eviction timer)

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::services;
use crate::state::{AppState, DEFAULT_ROOM};

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_default_room(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    upgrade(state, DEFAULT_ROOM.to_owned(), ws)
}

pub async fn handle_room(State(state): State<AppState>, Path(room): Path<String>, ws: WebSocketUpgrade) -> Response {
    let room = if room.is_empty() { DEFAULT_ROOM.to_owned() } else { room };
    upgrade(state, room, ws)
}

fn upgrade(state: AppState, room: String, ws: WebSocketUpgrade) -> Response {
    let limit = state.config.max_message_bytes;
    ws.max_message_size(limit)
        .max_frame_size(limit)
        .on_upgrade(move |socket| run_ws(socket, state, room))
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(socket: WebSocket, state: AppState, room: String) {
    let client_id = Uuid::new_v4();
    let (client_tx, client_rx) = mpsc::channel::<Bytes>(state.config.client_queue_capacity);

    let replay = services::room::join_room(&state, &room, client_id, client_tx).await;
    let (sink, mut stream) = socket.split();
    let mut writer = tokio::spawn(write_loop(sink, replay, client_rx));

    info!(%client_id, %room, "ws: client connected");

    loop {
        tokio::select! {
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Binary(payload))) => {
                        services::room::relay_frame(&state, &room, client_id, payload).await;
                    }
                    Some(Ok(Message::Text(_))) => {
                        debug!(%client_id, %room, "ws: ignoring text message");
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(%client_id, %room, error = %e, "ws: read failed");
                        break;
                    }
                }
            }
            _ = &mut writer => {
                debug!(%client_id, %room, "ws: writer finished");
                break;
            }
        }
    }

    writer.abort();
    services::room::part_room(&state, &room, client_id).await;
    info!(%client_id, %room, "ws: client disconnected");
}

/// Send the join replay, then everything queued for this client.
async fn write_loop(mut sink: SplitSink<WebSocket, Message>, replay: Vec<Bytes>, mut rx: mpsc::Receiver<Bytes>) {
    for frame in replay {
        if let Err(e) = sink.send(Message::Binary(frame)).await {
            debug!(error = %e, "ws: replay write failed");
            return;
        }
    }

    while let Some(frame) = rx.recv().await {
        if let Err(e) = sink.send(Message::Binary(frame)).await {
            debug!(error = %e, "ws: write failed");
            return;
        }
    }

    // Queue closed by the room: this client was dropped as too slow.
    if let Err(e) = sink.close().await {
        debug!(error = %e, "ws: close after drop failed");
    }
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
