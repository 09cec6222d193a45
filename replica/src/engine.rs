//! Reconciliation engine — bridges a [`SceneGraph`] and the [`ObjectStore`].
//!
//! DESIGN
//! ======
//! The engine is the only component that touches both sides. It owns the
//! bidirectional map between scene handles and stable object ids, plus a
//! short-lived pending set of ids this peer just edited.
//!
//! Local path: a scene change is serialized, stamped by the store, encoded
//! as an Update frame for the caller to send, and its id is marked pending
//! with the version that was sent and a deadline.
//!
//! Remote path: every record goes through the store. Records for pending
//! ids are never materialized; the scene already shows the local intent and
//! re-applying would loop. Seeing our own pending version come back clears
//! the entry. Everything else that the store installed is materialized,
//! updated in place, or removed. After each batch a sweep converges the
//! scene with the store's live set.
//!
//! Pending entries that outlive their deadline are dropped. If the store's
//! winner is no longer the version we sent, the scene is reconciled from the
//! store at that point.
//!
//! BOOTSTRAP
//! =========
//! After (re)connecting, the relay replays the room's SYNC log and then a
//! Step1 marker. Every `(id, version)` seen during that replay is noted. On
//! Step1 the engine adopts scene objects it was never told about, then
//! pushes every store record whose exact version the replay did not carry.
//! Nothing is assumed about what an earlier connection delivered: the room
//! may have been evicted and recreated since. A joiner with nothing the room
//! lacks pushes nothing, so the relay's log does not grow per join.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use frames::sync::{SyncMessage, decode_sync, encode_sync};
use frames::{CodecError, ObjectId, PeerId, RecordState, Shape, ShapeRecord, Version};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::scene::SceneGraph;
use crate::store::{ApplyOutcome, LocalUpdate, ObjectStore};

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("failed to decode sync body: {0}")]
    Decode(#[source] CodecError),
    #[error("failed to encode outgoing sync frame: {0}")]
    Encode(#[source] CodecError),
}

/// Change reported by the scene graph after a user action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalChange<H> {
    Added(H),
    Modified(H),
    Removed(H),
}

/// What the engine did to the scene while applying remote state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneChange {
    Materialized(ObjectId),
    Updated(ObjectId),
    Removed(ObjectId),
}

/// A committed local edit, ready to send.
#[derive(Debug, Clone)]
pub struct LocalEdit {
    pub id: ObjectId,
    /// Store record before the edit, if the object was known.
    pub before: Option<ShapeRecord>,
    pub after: ShapeRecord,
    /// Encoded Update frame for the relay.
    pub frame: Vec<u8>,
}

/// Result of handling one inbound SYNC body.
#[derive(Debug, Default)]
pub struct SyncOutcome {
    /// Frames to send back to the relay.
    pub outgoing: Vec<Vec<u8>>,
    pub changes: Vec<SceneChange>,
    /// Records decoded and offered to the store.
    pub applied: usize,
    /// Records dropped as malformed.
    pub dropped: usize,
    pub bootstrapped: bool,
}

struct Pending {
    version: Version,
    deadline: Instant,
}

// =============================================================================
// ENGINE
// =============================================================================

pub struct SyncEngine<S: SceneGraph> {
    scene: S,
    store: ObjectStore,
    by_id: HashMap<ObjectId, S::Handle>,
    by_handle: HashMap<S::Handle, ObjectId>,
    pending: HashMap<ObjectId, Pending>,
    pending_ttl: Duration,
    awaiting_step1: bool,
    /// Versions delivered by the current connection's join replay.
    replayed: HashSet<(ObjectId, Version)>,
}

impl<S: SceneGraph> SyncEngine<S> {
    pub fn new(scene: S, peer: PeerId, pending_ttl: Duration) -> Self {
        Self {
            scene,
            store: ObjectStore::new(peer),
            by_id: HashMap::new(),
            by_handle: HashMap::new(),
            pending: HashMap::new(),
            pending_ttl,
            awaiting_step1: true,
            replayed: HashSet::new(),
        }
    }

    pub fn scene(&self) -> &S {
        &self.scene
    }

    /// Mutable scene access for local user actions. Report every change
    /// through [`SyncEngine::local_change`].
    pub fn scene_mut(&mut self) -> &mut S {
        &mut self.scene
    }

    pub fn store(&self) -> &ObjectStore {
        &self.store
    }

    pub fn peer(&self) -> &PeerId {
        self.store.peer()
    }

    pub fn object_id(&self, handle: S::Handle) -> Option<ObjectId> {
        self.by_handle.get(&handle).copied()
    }

    pub fn handle_of(&self, id: &ObjectId) -> Option<S::Handle> {
        self.by_id.get(id).copied()
    }

    #[cfg(test)]
    pub(crate) fn is_pending(&self, id: &ObjectId) -> bool {
        self.pending.contains_key(id)
    }

    /// Earliest pending deadline, for scheduling [`SyncEngine::expire_pending`].
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|p| p.deadline).min()
    }

    /// Every scene object with its id, in draw order. Objects the scene
    /// never reported get a fresh id.
    pub fn objects(&self) -> Vec<(ObjectId, Shape)> {
        self.scene
            .handles()
            .into_iter()
            .filter_map(|h| {
                let shape = self.scene.serialize(h)?;
                Some((self.by_handle.get(&h).copied().unwrap_or_else(Uuid::new_v4), shape))
            })
            .collect()
    }

    // =========================================================================
    // LOCAL PATH
    // =========================================================================

    /// Commit a scene change to the store and return the frame to send.
    ///
    /// Returns `Ok(None)` when there is nothing to replicate: the handle
    /// vanished before it could be read, or a removed handle was never
    /// known to the engine.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Encode`] if the frame cannot be built. The edit
    /// is still recorded and will go out with the next bootstrap push.
    pub fn local_change(&mut self, change: LocalChange<S::Handle>, now: Instant) -> Result<Option<LocalEdit>, SyncError> {
        match change {
            LocalChange::Added(handle) | LocalChange::Modified(handle) => {
                let Some(shape) = self.scene.serialize(handle) else {
                    debug!(?handle, "local change for vanished handle");
                    return Ok(None);
                };
                let id = match self.by_handle.get(&handle) {
                    Some(id) => *id,
                    None => {
                        let id = Uuid::new_v4();
                        self.bind(id, handle);
                        id
                    }
                };
                self.commit_local(id, Some(shape), now).map(Some)
            }
            LocalChange::Removed(handle) => {
                let Some(id) = self.by_handle.get(&handle).copied() else {
                    return Ok(None);
                };
                self.unbind(id);
                self.commit_local(id, None, now).map(Some)
            }
        }
    }

    /// Put `id` into `state` (a shape, or deleted) as a fresh local edit.
    /// Used to replay undo/redo history.
    ///
    /// # Errors
    ///
    /// Same as [`SyncEngine::local_change`].
    pub fn restore(&mut self, id: ObjectId, state: Option<Shape>, now: Instant) -> Result<LocalEdit, SyncError> {
        match &state {
            Some(shape) => self.show(id, shape),
            None => {
                if let Some(handle) = self.by_id.get(&id).copied() {
                    self.scene.remove(handle);
                    self.unbind(id);
                }
            }
        }
        self.commit_local(id, state, now)
    }

    /// Materialize a persisted object under its saved id and record it as
    /// unsynced local state.
    pub fn adopt(&mut self, id: ObjectId, shape: Shape) -> S::Handle {
        let handle = self.scene.materialize(&shape);
        self.bind(id, handle);
        self.store.stamp_local(id, RecordState::Live(shape));
        handle
    }

    fn commit_local(&mut self, id: ObjectId, state: Option<Shape>, now: Instant) -> Result<LocalEdit, SyncError> {
        let before = self.store.get(&id).cloned();
        let committed = match state {
            Some(shape) => self.store.apply_local(id, shape),
            None => self.store.delete(id),
        };
        let LocalUpdate { record, frame } = committed.map_err(SyncError::Encode)?;

        self.pending.insert(id, Pending { version: record.version.clone(), deadline: now + self.pending_ttl });
        debug!(%id, version = %record.version, deleted = record.is_tombstone(), "local edit committed");
        Ok(LocalEdit { id, before, after: record, frame })
    }

    // =========================================================================
    // REMOTE PATH
    // =========================================================================

    /// Called when a new relay connection opens, before any frame arrives.
    pub fn begin_connection(&mut self) {
        self.awaiting_step1 = true;
        self.replayed.clear();
    }

    /// Handle one SYNC body (the bytes after the tag).
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Decode`] for a truncated body or unknown kind;
    /// individually malformed records are dropped and counted instead.
    pub fn handle_sync(&mut self, body: &[u8], now: Instant) -> Result<SyncOutcome, SyncError> {
        let decoded = decode_sync(body).map_err(SyncError::Decode)?;
        if decoded.dropped > 0 {
            warn!(dropped = decoded.dropped, "dropped malformed records from sync batch");
        }

        let mut outcome = SyncOutcome { dropped: decoded.dropped, ..SyncOutcome::default() };
        match decoded.message {
            SyncMessage::Step1 => {
                if let Some(frame) = self.bootstrap()? {
                    outcome.outgoing.push(frame);
                }
                outcome.bootstrapped = true;
            }
            message => {
                let records = message.into_records();
                if self.awaiting_step1 {
                    self.replayed.extend(records.iter().map(|r| (r.id, r.version.clone())));
                }
                outcome.applied = records.len();
                outcome.changes = self.apply_remote(records, now);
            }
        }
        Ok(outcome)
    }

    /// Apply a batch of remote records and converge the scene.
    pub fn apply_remote(&mut self, records: Vec<ShapeRecord>, now: Instant) -> Vec<SceneChange> {
        let mut touched = Vec::new();
        for record in records {
            let id = record.id;
            let version = record.version.clone();
            let outcome = self.store.apply_remote(record);

            if self.pending.get(&id).is_some_and(|p| p.version == version) {
                self.pending.remove(&id);
                debug!(%id, %version, "local edit acknowledged");
                continue;
            }
            if outcome != ApplyOutcome::Installed {
                continue;
            }
            if self.pending.get(&id).is_some_and(|p| p.deadline > now) {
                debug!(%id, %version, "remote edit deferred behind pending local edit");
                continue;
            }
            touched.push(id);
        }

        let mut changes: Vec<SceneChange> = touched.into_iter().filter_map(|id| self.reconcile(id)).collect();
        changes.extend(self.sweep());
        changes
    }

    /// Drop pending entries past their deadline and reconcile any whose
    /// version lost in the meantime.
    pub fn expire_pending(&mut self, now: Instant) -> Vec<SceneChange> {
        let expired: Vec<(ObjectId, Version)> = self
            .pending
            .iter()
            .filter(|(_, p)| p.deadline <= now)
            .map(|(id, p)| (*id, p.version.clone()))
            .collect();

        let mut changes = Vec::new();
        for (id, sent) in expired {
            self.pending.remove(&id);
            if self.store.winner(&id) != Some(&sent) {
                debug!(%id, %sent, "pending local edit superseded; reconciling");
                changes.extend(self.reconcile(id));
            }
        }
        changes
    }

    /// Run the join handshake and return the Step2 frame to push, if any.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Encode`] if the snapshot cannot be encoded.
    pub fn bootstrap(&mut self) -> Result<Option<Vec<u8>>, SyncError> {
        let unreported: Vec<S::Handle> = self
            .scene
            .handles()
            .into_iter()
            .filter(|h| !self.by_handle.contains_key(h))
            .collect();
        for handle in unreported {
            if let Some(shape) = self.scene.serialize(handle) {
                let id = Uuid::new_v4();
                self.bind(id, handle);
                self.store.stamp_local(id, RecordState::Live(shape));
            }
        }

        let replayed = std::mem::take(&mut self.replayed);
        let records: Vec<ShapeRecord> = self
            .store
            .snapshot()
            .into_iter()
            .filter(|r| !replayed.contains(&(r.id, r.version.clone())))
            .collect();
        self.awaiting_step1 = false;

        info!(
            replayed = replayed.len(),
            pushed = records.len(),
            objects = self.by_id.len(),
            "bootstrap complete"
        );
        if records.is_empty() {
            return Ok(None);
        }
        encode_sync(&SyncMessage::Step2(records)).map(Some).map_err(SyncError::Encode)
    }

    // =========================================================================
    // CONVERGENCE
    // =========================================================================

    /// Remove mapped objects whose record is gone or tombstoned, and
    /// materialize live records the scene lacks. Pending ids are skipped.
    fn sweep(&mut self) -> Vec<SceneChange> {
        let dead: Vec<ObjectId> = self
            .by_id
            .keys()
            .filter(|id| !self.pending.contains_key(*id) && self.store.live_shape(id).is_none())
            .copied()
            .collect();
        let missing: Vec<ObjectId> = self
            .store
            .live_ids()
            .into_iter()
            .filter(|id| !self.by_id.contains_key(id) && !self.pending.contains_key(id))
            .collect();

        dead.into_iter().chain(missing).filter_map(|id| self.reconcile(id)).collect()
    }

    /// Make the scene show exactly the store's winner for `id`.
    fn reconcile(&mut self, id: ObjectId) -> Option<SceneChange> {
        let shape = self.store.live_shape(&id).cloned();
        let handle = self.by_id.get(&id).copied();
        match (shape, handle) {
            (Some(shape), Some(_)) => {
                self.show(id, &shape);
                Some(SceneChange::Updated(id))
            }
            (Some(shape), None) => {
                self.show(id, &shape);
                Some(SceneChange::Materialized(id))
            }
            (None, Some(handle)) => {
                self.scene.remove(handle);
                self.unbind(id);
                Some(SceneChange::Removed(id))
            }
            (None, None) => None,
        }
    }

    /// Update `id` in place, or (re)create it when that is not possible.
    fn show(&mut self, id: ObjectId, shape: &Shape) {
        if let Some(handle) = self.by_id.get(&id).copied() {
            if self.scene.update_in_place(handle, shape) {
                return;
            }
            self.scene.remove(handle);
            self.unbind(id);
        }
        let handle = self.scene.materialize(shape);
        self.bind(id, handle);
    }

    fn bind(&mut self, id: ObjectId, handle: S::Handle) {
        self.by_id.insert(id, handle);
        self.by_handle.insert(handle, id);
    }

    fn unbind(&mut self, id: ObjectId) {
        if let Some(handle) = self.by_id.remove(&id) {
            self.by_handle.remove(&handle);
        }
    }
}

#[cfg(test)]
#[path = "engine_test.rs"]
mod tests;
