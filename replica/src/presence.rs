//! Presence channel — ephemeral per-peer identity and cursor.
//!
//! DESIGN
//! ======
//! Each peer broadcasts its full presence record; receivers replace, never
//! merge. Records are not versioned and never persisted. A remote record
//! disappears on an explicit leave (sent by the peer on clean shutdown or
//! synthesized by the relay on close), when the transport drops, or when
//! the peer stays silent longer than the TTL. Peers keep themselves alive
//! by re-broadcasting on a heartbeat well inside that TTL.
//!
//! Listeners registered with [`PresenceChannel::on_change`] receive the
//! full list of other peers, sorted by peer id, whenever it changes.

use std::collections::HashMap;
use std::time::Duration;

use frames::awareness::{AwarenessMessage, decode_awareness, encode_awareness};
use frames::{CodecError, Cursor, PeerId, PeerPresence};
use rand::Rng;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

/// Cursor and selection palette.
pub const COLORS: [&str; 8] = ["#ef4444", "#f97316", "#eab308", "#22c55e", "#3b82f6", "#8b5cf6", "#ec4899", "#06b6d4"];

/// Display names handed out to anonymous peers.
pub const NAMES: [&str; 8] = [
    "Anonymous Penguin",
    "Curious Cat",
    "Happy Hedgehog",
    "Clever Fox",
    "Wise Owl",
    "Swift Rabbit",
    "Brave Bear",
    "Kind Koala",
];

type Listener = Box<dyn FnMut(&[PeerPresence]) + Send>;

/// Random peer id: the 32 hex digits of a v4 UUID. The id breaks version
/// ties, so it must not collide between peers.
#[must_use]
pub fn random_peer_id() -> PeerId {
    PeerId::new(Uuid::new_v4().simple().to_string())
}

/// Fresh presence for `peer_id` with a random name and color.
#[must_use]
pub fn random_identity(peer_id: PeerId) -> PeerPresence {
    let mut rng = rand::rng();
    PeerPresence {
        peer_id,
        display_name: NAMES[rng.random_range(0..NAMES.len())].to_owned(),
        color: COLORS[rng.random_range(0..COLORS.len())].to_owned(),
        cursor: None,
    }
}

struct RemotePeer {
    presence: PeerPresence,
    last_seen: Instant,
}

pub struct PresenceChannel {
    local: PeerPresence,
    peers: HashMap<PeerId, RemotePeer>,
    ttl: Duration,
    listeners: Vec<Listener>,
}

impl PresenceChannel {
    #[must_use]
    pub fn new(local: PeerPresence, ttl: Duration) -> Self {
        Self { local, peers: HashMap::new(), ttl, listeners: Vec::new() }
    }

    #[must_use]
    pub fn local(&self) -> &PeerPresence {
        &self.local
    }

    /// Other peers, sorted by peer id. Self is never included.
    #[must_use]
    pub fn peers(&self) -> Vec<PeerPresence> {
        let mut peers: Vec<PeerPresence> = self.peers.values().map(|p| p.presence.clone()).collect();
        peers.sort_by(|a, b| a.peer_id.cmp(&b.peer_id));
        peers
    }

    pub fn on_change(&mut self, listener: impl FnMut(&[PeerPresence]) + Send + 'static) {
        self.listeners.push(Box::new(listener));
    }

    // =========================================================================
    // OUTBOUND
    // =========================================================================

    /// Replace the local record wholesale and return the frame announcing it.
    /// The peer id cannot change.
    pub fn set_local_state(&mut self, mut presence: PeerPresence) -> Vec<u8> {
        presence.peer_id = self.local.peer_id.clone();
        self.local = presence;
        self.announce()
    }

    pub fn set_cursor(&mut self, cursor: Option<Cursor>) -> Vec<u8> {
        let mut next = self.local.clone();
        next.cursor = cursor;
        self.set_local_state(next)
    }

    /// Current local record as an AWARENESS frame.
    #[must_use]
    pub fn announce(&self) -> Vec<u8> {
        encode_awareness(&AwarenessMessage::Update(self.local.clone()))
    }

    #[must_use]
    pub fn leave_frame(&self) -> Vec<u8> {
        encode_awareness(&AwarenessMessage::Leave(self.local.peer_id.clone()))
    }

    // =========================================================================
    // INBOUND
    // =========================================================================

    /// Apply one AWARENESS body. Returns whether the peer list changed.
    ///
    /// # Errors
    ///
    /// Returns the codec error for a malformed body.
    pub fn receive(&mut self, body: &[u8], now: Instant) -> Result<bool, CodecError> {
        let message = decode_awareness(body)?;
        if message.peer_id() == &self.local.peer_id {
            return Ok(false);
        }

        let changed = match message {
            AwarenessMessage::Update(presence) => {
                let peer_id = presence.peer_id.clone();
                let changed = self.peers.get(&peer_id).is_none_or(|p| p.presence != presence);
                self.peers.insert(peer_id, RemotePeer { presence, last_seen: now });
                changed
            }
            AwarenessMessage::Leave(peer_id) => {
                debug!(%peer_id, "peer left");
                self.peers.remove(&peer_id).is_some()
            }
        };
        if changed {
            self.notify();
        }
        Ok(changed)
    }

    /// Drop peers silent for longer than the TTL. Returns how many.
    pub fn expire(&mut self, now: Instant) -> usize {
        let ttl = self.ttl;
        let before = self.peers.len();
        self.peers.retain(|peer_id, p| {
            let alive = now.saturating_duration_since(p.last_seen) <= ttl;
            if !alive {
                debug!(%peer_id, "peer presence expired");
            }
            alive
        });
        let expired = before - self.peers.len();
        if expired > 0 {
            self.notify();
        }
        expired
    }

    /// Forget every remote peer, as on transport loss.
    pub fn clear(&mut self) {
        if !self.peers.is_empty() {
            self.peers.clear();
            self.notify();
        }
    }

    fn notify(&mut self) {
        let peers = self.peers();
        for listener in &mut self.listeners {
            listener(&peers);
        }
    }
}

#[cfg(test)]
#[path = "presence_test.rs"]
mod tests;
