use super::*;
use crate::{Tag, split_frame};

fn presence(cursor: Option<Cursor>) -> PeerPresence {
    PeerPresence {
        peer_id: PeerId::new("k3x9a1z"),
        display_name: "Clever Fox".into(),
        color: "#3b82f6".into(),
        cursor,
    }
}

#[test]
fn update_with_cursor_decodes_to_same_presence() {
    let msg = AwarenessMessage::Update(presence(Some(Cursor { x: 12.5, y: -3.0 })));
    let bytes = encode_awareness(&msg);
    let (tag, body) = split_frame(&bytes).expect("split");
    assert_eq!(tag, Tag::Awareness);
    assert_eq!(decode_awareness(body).expect("decode"), msg);
}

#[test]
fn cleared_cursor_stays_cleared() {
    let msg = AwarenessMessage::Update(presence(None));
    let bytes = encode_awareness(&msg);
    let AwarenessMessage::Update(decoded) = decode_awareness(&bytes[1..]).expect("decode") else {
        panic!("expected update");
    };
    assert!(decoded.cursor.is_none());
}

#[test]
fn missing_state_means_leave() {
    let msg = AwarenessMessage::Leave(PeerId::new("gone"));
    let bytes = encode_awareness(&msg);
    assert_eq!(decode_awareness(&bytes[1..]).expect("decode"), msg);
}

#[test]
fn peek_reads_peer_id_without_state() {
    let bytes = encode_awareness(&AwarenessMessage::Update(presence(Some(Cursor { x: 1.0, y: 2.0 }))));
    assert_eq!(peek_peer_id(&bytes[1..]), Some(PeerId::new("k3x9a1z")));
}

#[test]
fn peek_rejects_garbage() {
    assert_eq!(peek_peer_id(&[0xff, 0xff]), None);
    assert_eq!(peek_peer_id(&[]), None);
}

#[test]
fn decode_rejects_empty_peer_id() {
    let err = decode_awareness(&[]).expect_err("empty body has empty peer id");
    assert!(matches!(err, CodecError::InvalidField { field: "peer_id", .. }));
}
