use super::*;

#[test]
fn version_orders_by_clock_before_peer() {
    assert!(Version::new(2, "A") > Version::new(1, "Z"));
    assert!(Version::new(1, "B") > Version::new(1, "A"));
    assert_eq!(Version::new(3, "A"), Version::new(3, "A"));
}

#[test]
fn version_display_is_compact() {
    assert_eq!(Version::new(4, "peer").to_string(), "v(4,peer)");
}

#[test]
fn live_record_survives_encoding() {
    let record = ShapeRecord::live(Uuid::new_v4(), Version::new(7, "A"), Shape::rect(1.0, 2.0, 3.0, 4.0));
    let bytes = encode_record(&record).expect("encode");
    assert_eq!(decode_record(&bytes).expect("decode"), record);
}

#[test]
fn tombstone_survives_encoding() {
    let record = ShapeRecord::tombstone(Uuid::new_v4(), Version::new(9, "B"));
    let bytes = encode_record(&record).expect("encode");
    let decoded = decode_record(&bytes).expect("decode");
    assert!(decoded.is_tombstone());
    assert!(decoded.shape().is_none());
    assert_eq!(decoded.version, Version::new(9, "B"));
}

#[test]
fn decode_rejects_short_object_id() {
    let wire = WireRecord {
        object_id: vec![1, 2, 3],
        clock: 1,
        peer: "A".into(),
        deleted: true,
        attributes: Vec::new(),
    };
    let err = decode_record(&wire.encode_to_vec()).expect_err("bad id");
    assert!(matches!(err, CodecError::InvalidField { field: "object_id", .. }));
}

#[test]
fn decode_rejects_empty_peer() {
    let wire = WireRecord {
        object_id: Uuid::new_v4().as_bytes().to_vec(),
        clock: 1,
        peer: String::new(),
        deleted: true,
        attributes: Vec::new(),
    };
    let err = decode_record(&wire.encode_to_vec()).expect_err("empty peer");
    assert!(matches!(err, CodecError::InvalidField { field: "peer", .. }));
}

#[test]
fn decode_rejects_tombstone_with_attributes() {
    let wire = WireRecord {
        object_id: Uuid::new_v4().as_bytes().to_vec(),
        clock: 1,
        peer: "A".into(),
        deleted: true,
        attributes: b"{}".to_vec(),
    };
    let err = decode_record(&wire.encode_to_vec()).expect_err("tombstone with attrs");
    assert!(matches!(err, CodecError::InvalidField { field: "attributes", .. }));
}

#[test]
fn decode_rejects_live_record_with_garbage_attributes() {
    let wire = WireRecord {
        object_id: Uuid::new_v4().as_bytes().to_vec(),
        clock: 1,
        peer: "A".into(),
        deleted: false,
        attributes: b"not json".to_vec(),
    };
    let err = decode_record(&wire.encode_to_vec()).expect_err("garbage attrs");
    assert!(matches!(err, CodecError::Attributes(_)));
}

#[test]
fn decode_rejects_malformed_protobuf() {
    let err = decode_record(&[0xff, 0xff, 0xff]).expect_err("garbage");
    assert!(matches!(err, CodecError::Decode(_)));
}
