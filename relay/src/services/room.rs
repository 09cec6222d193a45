//! Room service — join/part, content-blind fan-out, and eviction.
//!
//! DESIGN
//! ======
//! Rooms are created on first join and hold three pieces of replay state:
//! the append-only SYNC log, the latest AWARENESS frame of each connection,
//! and the peer id each connection last announced. A joiner receives the
//! SYNC log, then a Step1 marker, then the other connections' presence.
//! The replay is computed under the same room lock that registers the
//! client's queue, so nothing relayed concurrently can slip between the two.
//! Work in one room never waits on another room's lock.
//!
//! When the last client parts, an eviction task is spawned. A join aborts
//! it and bumps the room generation; the task re-checks identity, emptiness
//! and generation under the room lock before removing anything, and marks
//! the room evicted so a join holding a stale handle retries.
//!
//! ERROR HANDLING
//! ==============
//! Fan-out never awaits a peer. A full or closed outbound queue removes that
//! client from the room; its connection task notices the closed queue and
//! runs the normal part path.

use std::sync::Arc;

use axum::body::Bytes;
use frames::awareness::{AwarenessMessage, encode_awareness, peek_peer_id};
use frames::sync::step1_frame;
use frames::{Tag, split_frame};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::state::{AppState, RoomState, SharedRoom};

// =============================================================================
// JOIN / PART
// =============================================================================

/// Register `client_id` in `room` and return the frames to replay to it
/// before anything from its queue.
pub async fn join_room(state: &AppState, room: &str, client_id: Uuid, tx: mpsc::Sender<Bytes>) -> Vec<Bytes> {
    let mut room_state = loop {
        let guard = state.room_or_create(room).await.lock_owned().await;
        if !guard.evicted {
            break guard;
        }
        debug!(room, "room evicted during join; retrying");
    };

    if let Some(eviction) = room_state.eviction.take() {
        eviction.abort();
        info!(room, "room eviction cancelled by rejoin");
    }
    room_state.generation += 1;

    let mut replay = Vec::with_capacity(room_state.updates.len() + 1 + room_state.awareness.len());
    replay.extend(room_state.updates.iter().cloned());
    replay.push(Bytes::from(step1_frame()));
    replay.extend(
        room_state
            .awareness
            .iter()
            .filter(|(id, _)| **id != client_id)
            .map(|(_, frame)| frame.clone()),
    );

    room_state.clients.insert(client_id, tx);
    info!(
        room,
        %client_id,
        clients = room_state.clients.len(),
        replayed = room_state.updates.len(),
        "client joined room"
    );
    replay
}

/// Remove `client_id` from `room`, announce its departure, and start the
/// eviction timer if the room is now empty.
pub async fn part_room(state: &AppState, room: &str, client_id: Uuid) {
    let Some(shared) = state.room(room).await else {
        return;
    };
    let mut room_state = shared.lock().await;

    room_state.clients.remove(&client_id);
    room_state.awareness.remove(&client_id);
    if let Some(peer_id) = room_state.peers.remove(&client_id) {
        let leave = Bytes::from(encode_awareness(&AwarenessMessage::Leave(peer_id)));
        fan_out(room, &mut room_state, &leave, None);
    }
    info!(room, %client_id, remaining = room_state.clients.len(), "client left room");

    if room_state.clients.is_empty() && room_state.eviction.is_none() {
        schedule_eviction(state, room, &shared, &mut room_state);
    }
}

// =============================================================================
// RELAY
// =============================================================================

/// Forward one inbound frame from `client_id` to the rest of its room.
///
/// SYNC frames are appended to the replay log and AWARENESS frames replace
/// the sender's cached presence. Unknown tags are forwarded only. Empty
/// frames are dropped.
pub async fn relay_frame(state: &AppState, room: &str, client_id: Uuid, frame: Bytes) {
    let tag = match split_frame(&frame) {
        Ok((tag, _)) => tag,
        Err(e) => {
            debug!(room, %client_id, error = %e, "dropping empty frame");
            return;
        }
    };

    let Some(shared) = state.room(room).await else {
        return;
    };
    let mut room_state = shared.lock().await;
    if !room_state.clients.contains_key(&client_id) {
        // Already dropped by fan-out; its part is in flight.
        return;
    }

    match tag {
        Tag::Sync => room_state.updates.push(frame.clone()),
        Tag::Awareness => {
            if let Some(peer_id) = peek_peer_id(&frame[1..]) {
                room_state.peers.insert(client_id, peer_id);
            }
            room_state.awareness.insert(client_id, frame.clone());
        }
        Tag::Unknown(tag) => debug!(room, %client_id, tag, "forwarding unknown frame tag"),
    }

    fan_out(room, &mut room_state, &frame, Some(client_id));
}

/// Queue `frame` for every client in the room except `exclude`.
fn fan_out(room: &str, room_state: &mut RoomState, frame: &Bytes, exclude: Option<Uuid>) {
    let mut dropped = Vec::new();
    for (client_id, tx) in &room_state.clients {
        if exclude == Some(*client_id) {
            continue;
        }
        match tx.try_send(frame.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(room, %client_id, "outbound queue full; dropping slow client");
                dropped.push(*client_id);
            }
            Err(TrySendError::Closed(_)) => {
                debug!(room, %client_id, "outbound queue closed; dropping client");
                dropped.push(*client_id);
            }
        }
    }
    for client_id in dropped {
        room_state.clients.remove(&client_id);
    }
}

// =============================================================================
// EVICTION
// =============================================================================

fn schedule_eviction(state: &AppState, room: &str, shared: &SharedRoom, room_state: &mut RoomState) {
    let grace = state.config.room_grace;
    let generation = room_state.generation;
    let rooms = state.rooms.clone();
    let this = Arc::downgrade(shared);
    debug!(room, generation, ?grace, "room eviction scheduled");
    let room = room.to_owned();

    room_state.eviction = Some(tokio::spawn(async move {
        tokio::time::sleep(grace).await;

        let mut rooms = rooms.write().await;
        let Some(shared) = this.upgrade() else {
            return;
        };
        if !rooms.get(&room).is_some_and(|current| Arc::ptr_eq(current, &shared)) {
            return;
        }
        let mut room_state = shared.lock().await;
        if room_state.clients.is_empty() && room_state.generation == generation {
            room_state.evicted = true;
            room_state.eviction = None;
            rooms.remove(&room);
            info!(%room, discarded_updates = room_state.updates.len(), "evicted idle room");
        }
    }));
}

#[cfg(test)]
#[path = "room_test.rs"]
mod tests;
