//! Integration tests for the nfc-core chip layer.
//!
//! These tests write signed payloads onto simulated tags through the public
//! API and read them back, exercising ATR detection, family dispatch, the
//! command sets, decoding, and the payload codec together.

use nfc_core::chip::atr::detect;
use nfc_core::chip::mifare::{self, CAPACITY};
use nfc_core::chip::ntag;
use nfc_core::chip::mock::SimulatedTag;
use nfc_core::{decode_user_data, CardConnection, ChipError, ChipFamily, ChipType, PayloadCodec};

const KEY: [u8; 6] = [0xFF; 6];

fn codec() -> PayloadCodec {
    PayloadCodec::new(b"integration-secret").expect("codec must build")
}

/// Detects the tag's family, writes `payload`, and reads it back decoded.
fn write_then_read(tag: &SimulatedTag, payload: &str) -> Option<String> {
    let mut conn = tag.connect();
    let family = detect(&conn.atr().expect("atr"))
        .family(KEY)
        .expect("supported chip");
    family.write(&mut conn, payload).expect("write must succeed");
    conn.disconnect();

    let mut conn = tag.connect();
    let raw = family.read(&mut conn).expect("read must succeed");
    conn.disconnect();
    decode_user_data(&raw)
}

#[test]
fn test_ntag_roundtrip_signed_payload() {
    let codec = codec();
    let tag = SimulatedTag::ntag213();

    let decoded = write_then_read(&tag, &codec.encode("42")).expect("data present");

    assert_eq!(decoded, codec.encode("42"));
    assert_eq!(codec.verify(&decoded), Ok("42"));
}

#[test]
fn test_mifare_1k_roundtrip_signed_payload() {
    let codec = codec();
    let tag = SimulatedTag::mifare_classic_1k(KEY);

    let decoded = write_then_read(&tag, &codec.encode("student-0001")).expect("data present");

    assert_eq!(codec.verify(&decoded), Ok("student-0001"));
}

#[test]
fn test_mifare_4k_roundtrip_signed_payload() {
    let codec = codec();
    let tag = SimulatedTag::mifare_classic_4k(KEY);

    let decoded = write_then_read(&tag, &codec.encode("7")).expect("data present");

    assert_eq!(codec.verify(&decoded), Ok("7"));
}

#[test]
fn test_shorter_payload_over_longer_one_decodes_cleanly() {
    // The NUL terminator hides the tail of the previous, longer payload.
    let tag = SimulatedTag::ntag213();
    write_then_read(&tag, "a-much-longer-previous-payload");

    assert_eq!(write_then_read(&tag, "42").as_deref(), Some("42"));
}

#[test]
fn test_blank_tags_decode_to_no_data() {
    for tag in [SimulatedTag::ntag213(), SimulatedTag::mifare_classic_1k(KEY)] {
        let mut conn = tag.connect();
        let family = detect(&conn.atr().unwrap()).family(KEY).unwrap();
        let raw = family.read(&mut conn).unwrap();
        assert_eq!(decode_user_data(&raw), None);
    }
}

#[test]
fn test_mifare_authenticates_twice_for_six_blocks() {
    let tag = SimulatedTag::mifare_classic_1k(KEY);

    ChipFamily::MifareClassic { key: KEY }
        .read(&mut tag.connect())
        .unwrap();

    let auths = tag
        .transmitted()
        .iter()
        .filter(|apdu| apdu.starts_with(&[0xFF, 0x86]))
        .count();
    assert_eq!(auths, 2);
}

#[test]
fn test_mifare_capacity_failure_leaves_tag_untouched() {
    // Arrange: identity sized so the signed payload plus NUL exceeds 96 bytes
    let codec = codec();
    let identity = "x".repeat(CAPACITY - 65);
    let payload = codec.encode(&identity);
    let tag = SimulatedTag::mifare_classic_1k(KEY);

    // Act
    let err = ChipFamily::MifareClassic { key: KEY }
        .write(&mut tag.connect(), &payload)
        .unwrap_err();

    // Assert
    assert!(matches!(err, ChipError::CapacityExceeded { capacity, .. } if capacity == CAPACITY));
    assert!(tag.transmitted().is_empty());
    assert!(tag.user_data().iter().all(|&b| b == 0));
}

#[test]
fn test_mifare_failed_block_aborts_remaining_blocks() {
    let tag = SimulatedTag::mifare_classic_1k(KEY).fail_block_update(5);

    let err = ChipFamily::MifareClassic { key: KEY }
        .write(&mut tag.connect(), &"y".repeat(60))
        .unwrap_err();

    assert_eq!(err, ChipError::Status { sw1: 0x65, sw2: 0x81 });
    let data = tag.user_data();
    assert!(data[..16].iter().all(|&b| b == b'y'), "block 4 was written");
    assert!(data[16..].iter().all(|&b| b == 0), "nothing after block 5");
    assert!(mifare::USER_BLOCKS.contains(&5));
}

#[test]
fn test_ntag_rejects_sixteen_character_identity_before_writing() {
    // Arrange: 16 characters + ':' + 64 hex digits + NUL = 82 bytes
    let codec = codec();
    let payload = codec.encode("student-0001-abc");
    let tag = SimulatedTag::ntag213();

    // Act
    let err = ChipFamily::Ntag
        .write(&mut tag.connect(), &payload)
        .unwrap_err();

    // Assert
    assert_eq!(
        err,
        ChipError::CapacityExceeded {
            needed: 84,
            capacity: ntag::CAPACITY
        }
    );
    assert!(tag.transmitted().is_empty());
    assert!(tag.user_data().iter().all(|&b| b == 0));
}

#[test]
fn test_ntag_longest_identity_survives_roundtrip() {
    // Arrange: 14 characters + ':' + 64 hex digits + NUL = the 80 bytes read back
    let codec = codec();
    let tag = SimulatedTag::ntag213();

    // Act
    let decoded = write_then_read(&tag, &codec.encode("student-001-ab")).expect("data present");

    // Assert
    assert_eq!(codec.verify(&decoded), Ok("student-001-ab"));
}

#[test]
fn test_ntag_failed_page_keeps_earlier_pages() {
    let tag = SimulatedTag::ntag213().fail_writes_from_page(6);

    let err = ChipFamily::Ntag
        .write(&mut tag.connect(), "0123456789abcdef")
        .unwrap_err();

    assert_eq!(err, ChipError::TagStatus(0x01));
    assert_eq!(&tag.user_data()[..8], b"01234567");
    assert!(tag.user_data()[8..].iter().all(|&b| b == 0));
}

#[test]
fn test_unsupported_chip_has_no_family() {
    let tag = SimulatedTag::with_atr(&[0x3B, 0x81, 0x80, 0x01, 0x80, 0x80]);
    let chip = detect(&tag.connect().atr().unwrap());

    assert_eq!(chip, ChipType::Unsupported("unknown ATR".into()));
    assert_eq!(chip.family(KEY), None);
}
