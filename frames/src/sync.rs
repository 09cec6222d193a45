//! SYNC body codec.
//!
//! Body layout is `kind: u8` followed by a kind-specific payload. Record
//! batches wrap every record in its own length-delimited bytes field, so a
//! single malformed record can be skipped without losing its neighbours.

use prost::Message;

use crate::record::{ShapeRecord, decode_record, encode_record};
use crate::{CodecError, TAG_SYNC};

/// Second byte of a SYNC frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncKind {
    /// Relay-generated: the joiner has received the room's buffered history.
    Step1,
    /// Bootstrap push of a full or partial snapshot.
    Step2,
    /// Records produced by local edits.
    Update,
}

impl SyncKind {
    #[must_use]
    pub fn as_byte(self) -> u8 {
        match self {
            Self::Step1 => 0,
            Self::Step2 => 1,
            Self::Update => 2,
        }
    }

    /// # Errors
    ///
    /// Returns [`CodecError::UnknownSyncKind`] for bytes outside `0..=2`.
    pub fn from_byte(byte: u8) -> Result<Self, CodecError> {
        match byte {
            0 => Ok(Self::Step1),
            1 => Ok(Self::Step2),
            2 => Ok(Self::Update),
            other => Err(CodecError::UnknownSyncKind(other)),
        }
    }
}

/// A decoded or to-be-encoded SYNC body.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncMessage {
    Step1,
    Step2(Vec<ShapeRecord>),
    Update(Vec<ShapeRecord>),
}

impl SyncMessage {
    #[must_use]
    pub fn kind(&self) -> SyncKind {
        match self {
            Self::Step1 => SyncKind::Step1,
            Self::Step2(_) => SyncKind::Step2,
            Self::Update(_) => SyncKind::Update,
        }
    }

    #[must_use]
    pub fn records(&self) -> &[ShapeRecord] {
        match self {
            Self::Step1 => &[],
            Self::Step2(records) | Self::Update(records) => records,
        }
    }

    #[must_use]
    pub fn into_records(self) -> Vec<ShapeRecord> {
        match self {
            Self::Step1 => Vec::new(),
            Self::Step2(records) | Self::Update(records) => records,
        }
    }
}

/// Result of decoding a SYNC body. `dropped` counts records that failed
/// validation and were skipped.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedSync {
    pub message: SyncMessage,
    pub dropped: usize,
}

/// The fixed two-byte frame the relay sends after replaying history.
#[must_use]
pub fn step1_frame() -> Vec<u8> {
    vec![TAG_SYNC, SyncKind::Step1.as_byte()]
}

/// Encode a full SYNC frame, tag byte included.
///
/// # Errors
///
/// Returns [`CodecError::Attributes`] if a shape cannot be serialized.
pub fn encode_sync(message: &SyncMessage) -> Result<Vec<u8>, CodecError> {
    let mut out = vec![TAG_SYNC, message.kind().as_byte()];
    if matches!(message, SyncMessage::Step1) {
        return Ok(out);
    }

    let records = message
        .records()
        .iter()
        .map(encode_record)
        .collect::<Result<Vec<_>, _>>()?;
    let batch = WireBatch { records };
    batch.encode(&mut out).map_err(|e| CodecError::InvalidField {
        field: "records",
        reason: e.to_string(),
    })?;
    Ok(out)
}

/// Decode a SYNC body (the bytes after the tag).
///
/// # Errors
///
/// Returns [`CodecError::Truncated`] for an empty body,
/// [`CodecError::UnknownSyncKind`] for an unknown kind byte, and
/// [`CodecError::Decode`] when the batch envelope itself is malformed.
/// Individually malformed records are counted in [`DecodedSync::dropped`].
pub fn decode_sync(body: &[u8]) -> Result<DecodedSync, CodecError> {
    let Some((&kind, payload)) = body.split_first() else {
        return Err(CodecError::Truncated);
    };

    let kind = SyncKind::from_byte(kind)?;
    if kind == SyncKind::Step1 {
        return Ok(DecodedSync { message: SyncMessage::Step1, dropped: 0 });
    }

    let batch = WireBatch::decode(payload)?;
    let mut records = Vec::with_capacity(batch.records.len());
    let mut dropped = 0;
    for raw in &batch.records {
        match decode_record(raw) {
            Ok(record) => records.push(record),
            Err(_) => dropped += 1,
        }
    }

    let message = match kind {
        SyncKind::Step2 => SyncMessage::Step2(records),
        SyncKind::Update | SyncKind::Step1 => SyncMessage::Update(records),
    };
    Ok(DecodedSync { message, dropped })
}

#[derive(Clone, PartialEq, Message)]
struct WireBatch {
    #[prost(bytes = "vec", repeated, tag = "1")]
    records: Vec<Vec<u8>>,
}

#[cfg(test)]
#[path = "sync_test.rs"]
mod tests;
