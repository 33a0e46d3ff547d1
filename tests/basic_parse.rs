use f4vbox::boxes::{BoxKey, BoxSize, FourCC};
use f4vbox::{BoxCursor, ParseError, read_box_header};
use std::io::Cursor;

fn make_minimal_file() -> Vec<u8> {
    // [ftyp box]
    // size: 20 (0x14), type: "ftyp", payload: 12 bytes
    let mut v = Vec::new();
    v.extend_from_slice(&20u32.to_be_bytes());
    v.extend_from_slice(b"ftyp");
    // major brand "isom"
    v.extend_from_slice(b"isom");
    // minor version
    v.extend_from_slice(&0u32.to_be_bytes());
    // one compatible brand "isom"
    v.extend_from_slice(b"isom");
    v
}

fn cursor(data: Vec<u8>) -> BoxCursor<Cursor<Vec<u8>>> {
    BoxCursor::new(Cursor::new(data)).expect("cursor over memory")
}

#[test]
fn read_single_ftyp_header() {
    let data = make_minimal_file();
    let mut cur = cursor(data);

    let hdr = read_box_header(&mut cur, 20).expect("read_box_header failed");

    assert_eq!(hdr.start, 0);
    assert_eq!(hdr.size, BoxSize::Compact(20));
    assert_eq!(hdr.typ, FourCC(*b"ftyp"));
    assert_eq!(hdr.header_size, 8);
    assert_eq!(hdr.uuid, None);
    assert_eq!(cur.position(), 8);
}

#[test]
fn large_size_replaces_size_field() {
    let mut v = Vec::new();
    v.extend_from_slice(&1u32.to_be_bytes());
    v.extend_from_slice(b"mdat");
    v.extend_from_slice(&24u64.to_be_bytes());
    v.extend_from_slice(&[0xAB; 8]);
    let mut cur = cursor(v);

    let hdr = read_box_header(&mut cur, 24).unwrap();
    assert_eq!(hdr.size, BoxSize::Large(24));
    assert_eq!(hdr.header_size, 16);
    assert_eq!(hdr.effective_size(24), 24);
}

#[test]
fn uuid_type_reads_extended_identifier() {
    let id: [u8; 16] = *b"0123456789abcdef";
    let mut v = Vec::new();
    v.extend_from_slice(&24u32.to_be_bytes());
    v.extend_from_slice(b"uuid");
    v.extend_from_slice(&id);
    let mut cur = cursor(v);

    let hdr = read_box_header(&mut cur, 24).unwrap();
    assert_eq!(hdr.header_size, 24);
    assert_eq!(hdr.uuid, Some(id));
    assert_eq!(hdr.key(), BoxKey::Uuid(id));
}

#[test]
fn large_size_with_uuid_is_32_bytes() {
    let mut v = Vec::new();
    v.extend_from_slice(&1u32.to_be_bytes());
    v.extend_from_slice(b"uuid");
    v.extend_from_slice(&40u64.to_be_bytes());
    v.extend_from_slice(&[9u8; 16]);
    v.extend_from_slice(&[0u8; 8]);
    let mut cur = cursor(v);

    let hdr = read_box_header(&mut cur, 40).unwrap();
    assert_eq!(hdr.header_size, 32);
    assert_eq!(hdr.size, BoxSize::Large(40));
    assert_eq!(hdr.to_bytes().len(), 32);
}

#[test]
fn zero_size_is_open_ended() {
    let mut v = Vec::new();
    v.extend_from_slice(&0u32.to_be_bytes());
    v.extend_from_slice(b"mdat");
    v.extend_from_slice(&[0u8; 100]);
    let mut cur = cursor(v);

    let hdr = read_box_header(&mut cur, 108).unwrap();
    assert_eq!(hdr.size, BoxSize::OpenEnded);
    assert_eq!(hdr.effective_size(108), 108);
}

#[test]
fn fewer_than_eight_bytes_is_truncated() {
    let mut cur = cursor(vec![0, 0, 0, 8, b'f', b'r']);
    let err = read_box_header(&mut cur, 6).unwrap_err();
    assert!(matches!(
        err,
        ParseError::TruncatedHeader { offset: 0, needed: 8, available: 6 }
    ));
}

#[test]
fn missing_large_size_is_truncated() {
    let mut v = Vec::new();
    v.extend_from_slice(&1u32.to_be_bytes());
    v.extend_from_slice(b"mdat");
    v.extend_from_slice(&[0u8; 4]);
    let mut cur = cursor(v);

    let err = read_box_header(&mut cur, 12).unwrap_err();
    assert!(matches!(err, ParseError::TruncatedHeader { needed: 16, available: 12, .. }));
}

#[test]
fn missing_extended_type_is_truncated() {
    let mut v = Vec::new();
    v.extend_from_slice(&24u32.to_be_bytes());
    v.extend_from_slice(b"uuid");
    v.extend_from_slice(&[0u8; 8]);
    let mut cur = cursor(v);

    let err = read_box_header(&mut cur, 16).unwrap_err();
    assert!(matches!(err, ParseError::TruncatedHeader { needed: 24, available: 16, .. }));
}

#[test]
fn scope_limits_header_even_if_source_is_longer() {
    let mut cur = cursor(make_minimal_file());
    let err = read_box_header(&mut cur, 4).unwrap_err();
    assert!(matches!(err, ParseError::TruncatedHeader { available: 4, .. }));
}

#[test]
fn size_below_header_is_invalid() {
    let mut v = Vec::new();
    v.extend_from_slice(&4u32.to_be_bytes());
    v.extend_from_slice(b"free");
    let mut cur = cursor(v);

    let err = read_box_header(&mut cur, 8).unwrap_err();
    assert!(matches!(err, ParseError::InvalidSize { size: 4, header_size: 8, .. }));
}

#[test]
fn large_size_below_header_is_invalid() {
    let mut v = Vec::new();
    v.extend_from_slice(&1u32.to_be_bytes());
    v.extend_from_slice(b"mdat");
    v.extend_from_slice(&8u64.to_be_bytes());
    let mut cur = cursor(v);

    let err = read_box_header(&mut cur, 16).unwrap_err();
    assert!(matches!(err, ParseError::InvalidSize { size: 8, header_size: 16, .. }));
}

#[test]
fn header_bytes_round_trip() {
    let data = make_minimal_file();
    let mut cur = cursor(data.clone());
    let hdr = read_box_header(&mut cur, 20).unwrap();
    assert_eq!(hdr.to_bytes(), data[..8].to_vec());
}
