//! Shared relay state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor and
//! owns the room registry. Each room sits behind its own `Mutex`; the map's
//! `RwLock` is held only to look up, create, or evict a room, never while
//! a room is being mutated. Rooms never reference each other.
//!
//! Lock order is map then room. Only eviction holds both.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Bytes;
use frames::PeerId;
use tokio::sync::{Mutex, RwLock, mpsc};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::RelayConfig;

/// Room joined by connections to `/`.
pub const DEFAULT_ROOM: &str = "default";

// =============================================================================
// ROOM STATE
// =============================================================================

/// Per-room live state. Dropped wholesale when the eviction timer fires.
#[derive(Default)]
pub struct RoomState {
    /// Connected clients: `client_id` -> bounded outbound queue.
    pub clients: HashMap<Uuid, mpsc::Sender<Bytes>>,
    /// Every SYNC frame relayed in this room, in arrival order.
    pub updates: Vec<Bytes>,
    /// Latest AWARENESS frame per connection.
    pub awareness: HashMap<Uuid, Bytes>,
    /// Peer id last announced by each connection.
    pub peers: HashMap<Uuid, PeerId>,
    /// Pending eviction while the room is empty.
    pub eviction: Option<JoinHandle<()>>,
    /// Bumped on every join so a stale eviction task never removes a
    /// repopulated room.
    pub generation: u64,
    /// Set under the room lock when eviction removes it from the map. A
    /// join that raced the eviction sees this and looks the room up again.
    pub evicted: bool,
}

pub type SharedRoom = Arc<Mutex<RoomState>>;

/// Point-in-time counters for one room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoomStats {
    pub clients: usize,
    pub buffered_updates: usize,
    pub cached_awareness: usize,
    pub eviction_pending: bool,
}

impl RoomState {
    #[must_use]
    pub fn stats(&self) -> RoomStats {
        RoomStats {
            clients: self.clients.len(),
            buffered_updates: self.updates.len(),
            cached_awareness: self.awareness.len(),
            eviction_pending: self.eviction.is_some(),
        }
    }
}

// =============================================================================
// APP STATE
// =============================================================================

#[derive(Clone)]
pub struct AppState {
    pub rooms: Arc<RwLock<HashMap<String, SharedRoom>>>,
    pub config: Arc<RelayConfig>,
}

impl AppState {
    #[must_use]
    pub fn new(config: RelayConfig) -> Self {
        Self { rooms: Arc::new(RwLock::new(HashMap::new())), config: Arc::new(config) }
    }

    pub async fn room(&self, name: &str) -> Option<SharedRoom> {
        self.rooms.read().await.get(name).cloned()
    }

    pub async fn room_or_create(&self, name: &str) -> SharedRoom {
        if let Some(room) = self.room(name).await {
            return room;
        }
        self.rooms.write().await.entry(name.to_owned()).or_default().clone()
    }

    #[cfg(test)]
    pub async fn room_stats(&self, name: &str) -> Option<RoomStats> {
        let room = self.room(name).await?;
        Some(room.lock().await.stats())
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    /// Connected clients across every room.
    pub async fn client_count(&self) -> usize {
        let rooms: Vec<SharedRoom> = self.rooms.read().await.values().cloned().collect();
        let mut total = 0;
        for room in rooms {
            total += room.lock().await.stats().clients;
        }
        total
    }
}

#[cfg(test)]
#[path = "state_test.rs"]
mod tests;
