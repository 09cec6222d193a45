use super::*;

#[test]
fn tag_bytes_match_protocol_constants() {
    assert_eq!(Tag::Sync.as_byte(), 0);
    assert_eq!(Tag::Awareness.as_byte(), 1);
    assert_eq!(Tag::from_byte(0), Tag::Sync);
    assert_eq!(Tag::from_byte(1), Tag::Awareness);
}

#[test]
fn unknown_tag_is_preserved() {
    assert_eq!(Tag::from_byte(7), Tag::Unknown(7));
    assert_eq!(Tag::Unknown(7).as_byte(), 7);
}

#[test]
fn split_frame_separates_tag_and_body() {
    let (tag, body) = split_frame(&[1, 9, 8, 7]).expect("split");
    assert_eq!(tag, Tag::Awareness);
    assert_eq!(body, &[9, 8, 7]);
}

#[test]
fn split_frame_accepts_tag_without_body() {
    let (tag, body) = split_frame(&[0]).expect("split");
    assert_eq!(tag, Tag::Sync);
    assert!(body.is_empty());
}

#[test]
fn split_frame_rejects_empty_input() {
    let err = split_frame(&[]).expect_err("empty frame");
    assert!(matches!(err, CodecError::Truncated));
}

#[test]
fn encode_frame_prefixes_tag() {
    let bytes = encode_frame(Tag::Unknown(42), &[1, 2]);
    assert_eq!(bytes, vec![42, 1, 2]);
}
