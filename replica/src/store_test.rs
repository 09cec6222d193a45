use frames::sync::decode_sync;
use frames::{Tag, split_frame};
use uuid::Uuid;

use super::*;

fn shape(left: f64) -> Shape {
    Shape::rect(left, 0.0, 10.0, 10.0)
}

fn live(id: ObjectId, clock: u64, peer: &str, left: f64) -> ShapeRecord {
    ShapeRecord::live(id, Version::new(clock, peer), shape(left))
}

fn store(peer: &str) -> ObjectStore {
    ObjectStore::new(PeerId::new(peer))
}

// =============================================================================
// CONVERGENCE
// =============================================================================

#[test]
fn every_delivery_order_converges() {
    let id = Uuid::new_v4();
    let updates = [
        live(id, 1, "A", 1.0),
        live(id, 2, "B", 2.0),
        ShapeRecord::tombstone(id, Version::new(2, "A")),
        live(id, 3, "A", 3.0),
        live(id, 3, "C", 4.0),
    ];

    let orders: [[usize; 5]; 4] = [[0, 1, 2, 3, 4], [4, 3, 2, 1, 0], [2, 4, 0, 3, 1], [3, 0, 4, 1, 2]];
    let mut winners = Vec::new();
    for order in orders {
        let mut replica = store("Z");
        for i in order {
            replica.apply_remote(updates[i].clone());
        }
        winners.push(replica.get(&id).cloned());
    }

    assert!(winners.iter().all(|w| w == &winners[0]));
    assert_eq!(winners[0], Some(live(id, 3, "C", 4.0)));
}

#[test]
fn duplicate_delivery_is_idempotent() {
    let id = Uuid::new_v4();
    let record = live(id, 5, "A", 1.0);
    let mut replica = store("B");

    assert_eq!(replica.apply_remote(record.clone()), ApplyOutcome::Installed);
    let marker = replica.marker();
    assert_eq!(replica.apply_remote(record.clone()), ApplyOutcome::Duplicate);

    assert_eq!(replica.get(&id), Some(&record));
    assert_eq!(replica.marker(), marker);
    assert!(replica.diff_since(marker).is_empty());
}

#[test]
fn concurrent_offline_edits_tie_break_on_peer() {
    let id = Uuid::new_v4();
    let mut a = store("A");
    let mut b = store("B");
    a.stamp_local(id, RecordState::Live(shape(1.0)));
    b.stamp_local(id, RecordState::Live(shape(2.0)));

    for record in a.snapshot() {
        b.apply_remote(record);
    }
    for record in b.snapshot() {
        a.apply_remote(record);
    }

    assert_eq!(a.winner(&id), Some(&Version::new(1, "B")));
    assert_eq!(a.get(&id), b.get(&id));
    assert_eq!(a.live_shape(&id), Some(&shape(2.0)));
}

// =============================================================================
// TOMBSTONES
// =============================================================================

#[test]
fn older_edit_cannot_resurrect_tombstone() {
    let id = Uuid::new_v4();
    let mut replica = store("A");
    replica.apply_remote(ShapeRecord::tombstone(id, Version::new(4, "B")));

    assert_eq!(replica.apply_remote(live(id, 3, "C", 1.0)), ApplyOutcome::Stale);
    assert_eq!(replica.apply_remote(live(id, 4, "A", 1.0)), ApplyOutcome::Stale);
    assert!(replica.live_shape(&id).is_none());
    assert!(replica.get(&id).is_some_and(ShapeRecord::is_tombstone));
}

#[test]
fn newer_edit_reinstates_deleted_object() {
    let id = Uuid::new_v4();
    let mut replica = store("A");
    replica.apply_remote(live(id, 1, "A", 1.0));
    replica.apply_remote(ShapeRecord::tombstone(id, Version::new(2, "A")));

    assert_eq!(replica.apply_remote(live(id, 3, "B", 9.0)), ApplyOutcome::Installed);
    assert_eq!(replica.live_shape(&id), Some(&shape(9.0)));
}

#[test]
fn tombstones_stay_in_snapshot() {
    let id = Uuid::new_v4();
    let mut replica = store("A");
    replica.stamp_local(id, RecordState::Live(shape(1.0)));
    replica.delete(id).expect("encode tombstone");

    let snapshot = replica.snapshot();
    assert_eq!(snapshot.len(), 1);
    assert!(snapshot[0].is_tombstone());
    assert!(replica.materialized().is_empty());
    assert!(replica.live_ids().is_empty());
}

// =============================================================================
// CLOCK
// =============================================================================

#[test]
fn local_versions_strictly_increase() {
    let id = Uuid::new_v4();
    let mut replica = store("A");
    let first = replica.stamp_local(id, RecordState::Live(shape(1.0))).version;
    let second = replica.stamp_local(id, RecordState::Live(shape(2.0))).version;
    assert!(second > first);
}

#[test]
fn stale_remote_still_advances_clock() {
    let id = Uuid::new_v4();
    let mut replica = store("A");
    replica.apply_remote(live(id, 10, "Z", 1.0));
    assert_eq!(replica.apply_remote(live(id, 7, "B", 2.0)), ApplyOutcome::Stale);
    replica.apply_remote(live(Uuid::new_v4(), 12, "Z", 1.0));
    assert_eq!(replica.apply_remote(live(id, 11, "B", 2.0)), ApplyOutcome::Installed);

    assert_eq!(replica.clock(), 12);
    let next = replica.stamp_local(id, RecordState::Live(shape(3.0)));
    assert_eq!(next.version, Version::new(13, "A"));
}

#[test]
fn local_edit_after_observing_remote_wins() {
    let id = Uuid::new_v4();
    let mut replica = store("A");
    replica.apply_remote(live(id, 41, "Z", 1.0));
    replica.stamp_local(id, RecordState::Live(shape(2.0)));
    assert_eq!(replica.live_shape(&id), Some(&shape(2.0)));
}

// =============================================================================
// ENCODING
// =============================================================================

#[test]
fn apply_local_returns_update_frame() {
    let id = Uuid::new_v4();
    let mut replica = store("A");
    let update = replica.apply_local(id, shape(5.0)).expect("encode");
    assert_eq!(update.record, live(id, 1, "A", 5.0));

    let (tag, body) = split_frame(&update.frame).expect("split");
    assert_eq!(tag, Tag::Sync);
    let decoded = decode_sync(body).expect("decode");
    assert_eq!(decoded.message, SyncMessage::Update(vec![live(id, 1, "A", 5.0)]));
}

// =============================================================================
// SNAPSHOT / DIFF
// =============================================================================

#[test]
fn diff_since_returns_only_newer_installs() {
    let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    let mut replica = store("A");
    replica.stamp_local(a, RecordState::Live(shape(1.0)));
    let marker = replica.marker();
    replica.apply_remote(live(b, 1, "B", 2.0));
    replica.stamp_local(c, RecordState::Live(shape(3.0)));
    replica.stamp_local(a, RecordState::Deleted);

    let ids: Vec<ObjectId> = replica.diff_since(marker).iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![b, c, a]);
    assert_eq!(replica.diff_since(0).len(), 3);
    assert!(replica.diff_since(replica.marker()).is_empty());
}

#[test]
fn snapshot_is_sorted_by_id() {
    let mut replica = store("A");
    for _ in 0..8 {
        replica.stamp_local(Uuid::new_v4(), RecordState::Live(shape(0.0)));
    }
    let ids: Vec<ObjectId> = replica.snapshot().iter().map(|r| r.id).collect();
    let mut sorted = ids.clone();
    sorted.sort();
    assert_eq!(ids, sorted);
}

#[test]
fn third_joiner_snapshot_is_lww_union() {
    let (shared, only_a, only_b) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    let mut a = store("A");
    let mut b = store("B");
    let mut room_log = Vec::new();

    room_log.push(a.stamp_local(shared, RecordState::Live(shape(1.0))));
    room_log.push(a.stamp_local(only_a, RecordState::Live(shape(2.0))));
    for record in &room_log {
        b.apply_remote(record.clone());
    }
    room_log.push(b.stamp_local(shared, RecordState::Live(shape(3.0))));
    room_log.push(b.stamp_local(only_b, RecordState::Live(shape(4.0))));
    for record in &room_log[2..] {
        a.apply_remote(record.clone());
    }

    let mut c = store("C");
    for record in a.snapshot() {
        c.apply_remote(record);
    }

    let expected: BTreeMap<ObjectId, Shape> =
        [(shared, shape(3.0)), (only_a, shape(2.0)), (only_b, shape(4.0))].into_iter().collect();
    assert_eq!(c.materialized(), expected);
    assert_eq!(c.snapshot(), b.snapshot());
    assert_eq!(c.snapshot().len(), 3);
}
