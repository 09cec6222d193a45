//! AWARENESS body codec.
//!
//! The body is one protobuf message: the sender's peer id (field 1) and an
//! optional full presence state (field 2). An absent state means the peer
//! left. Field 1 is transport-level addressing, so the relay may read it via
//! [`peek_peer_id`] without touching the state.

use prost::Message;
use serde::{Deserialize, Serialize};

use crate::record::PeerId;
use crate::{CodecError, TAG_AWARENESS};

/// Pointer position in scene coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Cursor {
    pub x: f64,
    pub y: f64,
}

/// Ephemeral per-peer state. Always replaced wholesale, never merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerPresence {
    pub peer_id: PeerId,
    pub display_name: String,
    /// CSS color string used for the peer's cursor and selection.
    pub color: String,
    pub cursor: Option<Cursor>,
}

/// A decoded AWARENESS body.
#[derive(Debug, Clone, PartialEq)]
pub enum AwarenessMessage {
    Update(PeerPresence),
    Leave(PeerId),
}

impl AwarenessMessage {
    #[must_use]
    pub fn peer_id(&self) -> &PeerId {
        match self {
            Self::Update(presence) => &presence.peer_id,
            Self::Leave(peer_id) => peer_id,
        }
    }
}

/// Encode a full AWARENESS frame, tag byte included.
#[must_use]
pub fn encode_awareness(message: &AwarenessMessage) -> Vec<u8> {
    let wire = match message {
        AwarenessMessage::Update(presence) => WireAwareness {
            peer_id: presence.peer_id.as_str().to_owned(),
            state: Some(WirePresenceState {
                display_name: presence.display_name.clone(),
                color: presence.color.clone(),
                cursor: presence.cursor.map(|c| WireCursor { x: c.x, y: c.y }),
            }),
        },
        AwarenessMessage::Leave(peer_id) => WireAwareness { peer_id: peer_id.as_str().to_owned(), state: None },
    };

    let mut out = Vec::with_capacity(wire.encoded_len() + 1);
    out.push(TAG_AWARENESS);
    out.extend_from_slice(&wire.encode_to_vec());
    out
}

/// Decode an AWARENESS body (the bytes after the tag).
///
/// # Errors
///
/// Returns [`CodecError::Decode`] for malformed protobuf and
/// [`CodecError::InvalidField`] for an empty peer id.
pub fn decode_awareness(body: &[u8]) -> Result<AwarenessMessage, CodecError> {
    let wire = WireAwareness::decode(body)?;
    if wire.peer_id.is_empty() {
        return Err(CodecError::InvalidField { field: "peer_id", reason: "empty peer id".into() });
    }
    let peer_id = PeerId::new(wire.peer_id);

    Ok(match wire.state {
        Some(state) => AwarenessMessage::Update(PeerPresence {
            peer_id,
            display_name: state.display_name,
            color: state.color,
            cursor: state.cursor.map(|c| Cursor { x: c.x, y: c.y }),
        }),
        None => AwarenessMessage::Leave(peer_id),
    })
}

/// Read only the sender's peer id from an AWARENESS body.
///
/// Returns `None` for malformed bodies or an empty id.
#[must_use]
pub fn peek_peer_id(body: &[u8]) -> Option<PeerId> {
    match WireAwarenessHeader::decode(body) {
        Ok(header) if !header.peer_id.is_empty() => Some(PeerId::new(header.peer_id)),
        _ => None,
    }
}

#[derive(Clone, PartialEq, Message)]
struct WireAwareness {
    #[prost(string, tag = "1")]
    peer_id: String,
    #[prost(message, optional, tag = "2")]
    state: Option<WirePresenceState>,
}

/// Prefix view of [`WireAwareness`]; prost skips the unknown state field.
#[derive(Clone, PartialEq, Message)]
struct WireAwarenessHeader {
    #[prost(string, tag = "1")]
    peer_id: String,
}

#[derive(Clone, PartialEq, Message)]
struct WirePresenceState {
    #[prost(string, tag = "1")]
    display_name: String,
    #[prost(string, tag = "2")]
    color: String,
    #[prost(message, optional, tag = "3")]
    cursor: Option<WireCursor>,
}

#[derive(Clone, Copy, PartialEq, Message)]
struct WireCursor {
    #[prost(double, tag = "1")]
    x: f64,
    #[prost(double, tag = "2")]
    y: f64,
}

#[cfg(test)]
#[path = "awareness_test.rs"]
mod tests;
