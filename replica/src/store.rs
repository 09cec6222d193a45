//! Shared object store — the convergent `ObjectId -> ShapeRecord` map.
//!
//! DESIGN
//! ======
//! Last-writer-wins per object under the total order on [`Version`]
//! (`clock`, then `peer`). A remote record is installed only when its
//! version is strictly greater than the stored one, so any two replicas that
//! have seen the same set of records agree on every winner regardless of
//! delivery order or duplication. Deletions are tombstones that take part in
//! the same ordering and are never erased.
//!
//! The local clock is a Lamport clock: every remote record raises it to at
//! least the record's clock, even when the record itself loses. The next
//! local edit therefore always outranks everything this replica has seen.
//!
//! Every install stamps a local sequence number. [`ObjectStore::marker`]
//! and [`ObjectStore::diff_since`] use it to ship only what changed since a
//! previous point instead of a full snapshot.

use std::collections::{BTreeMap, HashMap};

use frames::sync::{SyncMessage, encode_sync};
use frames::{CodecError, ObjectId, PeerId, RecordState, Shape, ShapeRecord, Version};

/// Result of offering a remote record to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The record is the new winner for its object.
    Installed,
    /// The store already holds exactly this version.
    Duplicate,
    /// The store holds a newer version; the record was discarded.
    Stale,
}

/// A locally authored record and the Update frame announcing it.
#[derive(Debug, Clone)]
pub struct LocalUpdate {
    pub record: ShapeRecord,
    pub frame: Vec<u8>,
}

struct Entry {
    record: ShapeRecord,
    seq: u64,
}

pub struct ObjectStore {
    peer: PeerId,
    clock: u64,
    seq: u64,
    entries: HashMap<ObjectId, Entry>,
}

impl ObjectStore {
    #[must_use]
    pub fn new(peer: PeerId) -> Self {
        Self { peer, clock: 0, seq: 0, entries: HashMap::new() }
    }

    #[must_use]
    pub fn peer(&self) -> &PeerId {
        &self.peer
    }

    /// Highest clock this replica has issued or observed.
    #[must_use]
    pub fn clock(&self) -> u64 {
        self.clock
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn get(&self, id: &ObjectId) -> Option<&ShapeRecord> {
        self.entries.get(id).map(|e| &e.record)
    }

    /// Winning version for `id`, tombstones included.
    #[must_use]
    pub fn winner(&self, id: &ObjectId) -> Option<&Version> {
        self.get(id).map(|r| &r.version)
    }

    /// The live shape for `id`, or `None` if absent or tombstoned.
    #[must_use]
    pub fn live_shape(&self, id: &ObjectId) -> Option<&Shape> {
        self.get(id).and_then(ShapeRecord::shape)
    }

    // =========================================================================
    // LOCAL EDITS
    // =========================================================================

    /// Install a new locally authored state for `id` and return the record.
    pub fn stamp_local(&mut self, id: ObjectId, state: RecordState) -> ShapeRecord {
        self.clock += 1;
        let record = ShapeRecord { id, version: Version::new(self.clock, self.peer.clone()), state };
        self.install(record.clone());
        record
    }

    /// Record a local edit of `id` and return it with its encoded Update frame.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Attributes`] if the shape cannot be encoded.
    /// The edit is still installed locally.
    pub fn apply_local(&mut self, id: ObjectId, shape: Shape) -> Result<LocalUpdate, CodecError> {
        self.commit(id, RecordState::Live(shape))
    }

    /// Tombstone `id` and return the tombstone with its encoded Update frame.
    ///
    /// # Errors
    ///
    /// Same contract as [`ObjectStore::apply_local`].
    pub fn delete(&mut self, id: ObjectId) -> Result<LocalUpdate, CodecError> {
        self.commit(id, RecordState::Deleted)
    }

    fn commit(&mut self, id: ObjectId, state: RecordState) -> Result<LocalUpdate, CodecError> {
        let record = self.stamp_local(id, state);
        let frame = encode_sync(&SyncMessage::Update(vec![record.clone()]))?;
        Ok(LocalUpdate { record, frame })
    }

    // =========================================================================
    // REMOTE EDITS
    // =========================================================================

    /// Offer a record received from another replica.
    pub fn apply_remote(&mut self, record: ShapeRecord) -> ApplyOutcome {
        self.clock = self.clock.max(record.version.clock);

        let outcome = match self.entries.get(&record.id) {
            None => ApplyOutcome::Installed,
            Some(existing) if record.version > existing.record.version => ApplyOutcome::Installed,
            Some(existing) if record.version == existing.record.version => ApplyOutcome::Duplicate,
            Some(_) => ApplyOutcome::Stale,
        };
        if outcome == ApplyOutcome::Installed {
            self.install(record);
        }
        outcome
    }

    fn install(&mut self, record: ShapeRecord) {
        self.seq += 1;
        self.entries.insert(record.id, Entry { record, seq: self.seq });
    }

    // =========================================================================
    // SNAPSHOTS
    // =========================================================================

    /// Every record, tombstones included, ordered by object id.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ShapeRecord> {
        let mut records: Vec<ShapeRecord> = self.entries.values().map(|e| e.record.clone()).collect();
        records.sort_by_key(|r| r.id);
        records
    }

    /// Current install sequence. Pass to [`ObjectStore::diff_since`] later.
    #[must_use]
    pub fn marker(&self) -> u64 {
        self.seq
    }

    /// Records installed after `marker`, in install order.
    #[must_use]
    pub fn diff_since(&self, marker: u64) -> Vec<ShapeRecord> {
        let mut newer: Vec<&Entry> = self.entries.values().filter(|e| e.seq > marker).collect();
        newer.sort_by_key(|e| e.seq);
        newer.into_iter().map(|e| e.record.clone()).collect()
    }

    /// Ids of every live (non-tombstoned) record.
    #[must_use]
    pub fn live_ids(&self) -> Vec<ObjectId> {
        self.entries
            .iter()
            .filter(|(_, e)| !e.record.is_tombstone())
            .map(|(id, _)| *id)
            .collect()
    }

    /// The materialized document: live shapes only.
    #[must_use]
    pub fn materialized(&self) -> BTreeMap<ObjectId, Shape> {
        self.entries
            .iter()
            .filter_map(|(id, e)| e.record.shape().map(|s| (*id, s.clone())))
            .collect()
    }
}

#[cfg(test)]
#[path = "store_test.rs"]
mod tests;
