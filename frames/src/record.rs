//! Versioned Shape Records and their protobuf encoding.
//!
//! A record is the unit of replication: one object id, one version, and
//! either a live shape or a tombstone. Versions are totally ordered by
//! `(clock, peer)` so any two replicas pick the same winner per object.

use std::fmt;

use prost::Message;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::CodecError;
use crate::shape::Shape;

/// Globally stable identifier for a drawable object. Random v4, never reused.
pub type ObjectId = Uuid;

/// Identity of a replica. Compared lexicographically for version tie-breaks.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// Logical version of a record. Field order matters: the derived `Ord`
/// compares `clock` first and breaks ties on `peer`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version {
    pub clock: u64,
    pub peer: PeerId,
}

impl Version {
    #[must_use]
    pub fn new(clock: u64, peer: impl Into<PeerId>) -> Self {
        Self { clock, peer: peer.into() }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v({},{})", self.clock, self.peer)
    }
}

/// Payload of a record: a live shape or a deletion marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RecordState {
    Live(Shape),
    Deleted,
}

/// One versioned entry of the shared object map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeRecord {
    pub id: ObjectId,
    pub version: Version,
    pub state: RecordState,
}

impl ShapeRecord {
    #[must_use]
    pub fn live(id: ObjectId, version: Version, shape: Shape) -> Self {
        Self { id, version, state: RecordState::Live(shape) }
    }

    #[must_use]
    pub fn tombstone(id: ObjectId, version: Version) -> Self {
        Self { id, version, state: RecordState::Deleted }
    }

    #[must_use]
    pub fn is_tombstone(&self) -> bool {
        matches!(self.state, RecordState::Deleted)
    }

    #[must_use]
    pub fn shape(&self) -> Option<&Shape> {
        match &self.state {
            RecordState::Live(shape) => Some(shape),
            RecordState::Deleted => None,
        }
    }
}

// =============================================================================
// CODEC
// =============================================================================

/// Encode one record into standalone protobuf bytes.
///
/// # Errors
///
/// Returns [`CodecError::Attributes`] if the shape cannot be serialized.
pub fn encode_record(record: &ShapeRecord) -> Result<Vec<u8>, CodecError> {
    let (deleted, attributes) = match &record.state {
        RecordState::Live(shape) => (false, shape.to_attributes()?),
        RecordState::Deleted => (true, Vec::new()),
    };
    let wire = WireRecord {
        object_id: record.id.as_bytes().to_vec(),
        clock: record.version.clock,
        peer: record.version.peer.as_str().to_owned(),
        deleted,
        attributes,
    };
    Ok(wire.encode_to_vec())
}

/// Decode one record from standalone protobuf bytes.
///
/// # Errors
///
/// Returns [`CodecError::Decode`] for malformed protobuf,
/// [`CodecError::InvalidField`] for ids, peers, or tombstone/attribute
/// combinations that violate the record invariants, and
/// [`CodecError::Attributes`] for unparseable shape JSON.
pub fn decode_record(bytes: &[u8]) -> Result<ShapeRecord, CodecError> {
    let wire = WireRecord::decode(bytes)?;

    let id = Uuid::from_slice(&wire.object_id).map_err(|e| CodecError::InvalidField {
        field: "object_id",
        reason: e.to_string(),
    })?;
    if wire.peer.is_empty() {
        return Err(CodecError::InvalidField { field: "peer", reason: "empty peer id".into() });
    }
    let version = Version { clock: wire.clock, peer: PeerId(wire.peer) };

    let state = if wire.deleted {
        if !wire.attributes.is_empty() {
            return Err(CodecError::InvalidField {
                field: "attributes",
                reason: "tombstone carries attributes".into(),
            });
        }
        RecordState::Deleted
    } else {
        if wire.attributes.is_empty() {
            return Err(CodecError::InvalidField {
                field: "attributes",
                reason: "live record without attributes".into(),
            });
        }
        RecordState::Live(Shape::from_attributes(&wire.attributes)?)
    };

    Ok(ShapeRecord { id, version, state })
}

#[derive(Clone, PartialEq, Message)]
pub(crate) struct WireRecord {
    #[prost(bytes = "vec", tag = "1")]
    pub(crate) object_id: Vec<u8>,
    #[prost(uint64, tag = "2")]
    pub(crate) clock: u64,
    #[prost(string, tag = "3")]
    pub(crate) peer: String,
    #[prost(bool, tag = "4")]
    pub(crate) deleted: bool,
    #[prost(bytes = "vec", tag = "5")]
    pub(crate) attributes: Vec<u8>,
}

#[cfg(test)]
#[path = "record_test.rs"]
mod tests;
