//! Shared wire model and binary codec for the realtime relay transport.
//!
//! This crate owns the byte-level representation used by both the `relay`
//! and every `replica`. The relay only ever looks at the one-byte tag (and,
//! for presence, the sender's peer id); bodies are interpreted by peers.
//!
//! FRAMING
//! =======
//! Every message is `tag: u8` followed by a tag-specific body:
//! - `0` SYNC: object replication ([`sync`])
//! - `1` AWARENESS: ephemeral presence ([`awareness`])
//!
//! Unknown tags are preserved as [`Tag::Unknown`] so they can be forwarded
//! untouched by older relays.

pub mod awareness;
pub mod record;
pub mod shape;
pub mod sync;

pub use awareness::{AwarenessMessage, Cursor, PeerPresence};
pub use record::{ObjectId, PeerId, RecordState, ShapeRecord, Version};
pub use shape::{BoxShape, LineShape, PathShape, Point, Shape, ShapeKind, Style, TextShape, Transform};
pub use sync::{DecodedSync, SyncKind, SyncMessage};

/// Tag byte for object replication frames.
pub const TAG_SYNC: u8 = 0;

/// Tag byte for presence frames.
pub const TAG_AWARENESS: u8 = 1;

/// Error returned by the decoders in this crate.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The frame or body ended before a required byte.
    #[error("truncated frame")]
    Truncated,
    /// The raw bytes could not be decoded as the expected protobuf message.
    #[error("failed to decode protobuf body: {0}")]
    Decode(#[from] prost::DecodeError),
    /// The SYNC body carries a kind byte this build does not understand.
    #[error("unknown sync kind: {0}")]
    UnknownSyncKind(u8),
    /// The frame tag was not the one the caller asked to decode.
    #[error("unexpected frame tag: {0}")]
    UnexpectedTag(u8),
    /// A record or presence field failed validation.
    #[error("invalid field `{field}`: {reason}")]
    InvalidField { field: &'static str, reason: String },
    /// The typed shape attributes were not valid JSON for [`Shape`].
    #[error("invalid shape attributes: {0}")]
    Attributes(#[from] serde_json::Error),
}

/// Message type carried in the first byte of every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    Sync,
    Awareness,
    /// A tag this build does not interpret. Relays forward it verbatim.
    Unknown(u8),
}

impl Tag {
    #[must_use]
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            TAG_SYNC => Self::Sync,
            TAG_AWARENESS => Self::Awareness,
            other => Self::Unknown(other),
        }
    }

    #[must_use]
    pub fn as_byte(self) -> u8 {
        match self {
            Self::Sync => TAG_SYNC,
            Self::Awareness => TAG_AWARENESS,
            Self::Unknown(b) => b,
        }
    }
}

/// Split a raw frame into its tag and body.
///
/// # Errors
///
/// Returns [`CodecError::Truncated`] for an empty frame.
pub fn split_frame(bytes: &[u8]) -> Result<(Tag, &[u8]), CodecError> {
    let Some((&first, body)) = bytes.split_first() else {
        return Err(CodecError::Truncated);
    };
    Ok((Tag::from_byte(first), body))
}

/// Prefix `body` with the tag byte.
#[must_use]
pub fn encode_frame(tag: Tag, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + 1);
    out.push(tag.as_byte());
    out.extend_from_slice(body);
    out
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
