//! Tests for the session record codec
//!
//! These tests verify:
//! - Encode/decode preserves every field and re-encodes byte for byte
//! - Field order on the wire
//! - Presence tracking and list resets
//! - Corruption reporting names the field and the reason

use larchkv::key::{InternalKey, KeyType};
use larchkv::session::{RecordField, SessionRecord};
use larchkv::storage::FileDesc;
use larchkv::LarchError;

// =============================================================================
// Helper Functions
// =============================================================================

fn ikey(ukey: &str, seq: u64) -> InternalKey {
    InternalKey::new(ukey.as_bytes(), seq, KeyType::Value)
}

fn full_record() -> SessionRecord {
    let mut r = SessionRecord::new();
    r.set_comparer("leveldb.BytewiseComparator");
    r.set_journal_num(12);
    r.set_prev_journal_num(11);
    r.set_next_file_num(40);
    r.set_seq_num(123_456_789);
    r.add_compaction_pointer(1, ikey("compact", 77));
    r.add_compaction_pointer(3, ikey("other", 8));
    r.del_table(2, 17);
    r.del_table(2, 18);
    r.add_table(0, 33, 4096, ikey("aaa", 5), ikey("zzz", 9));
    r.add_table(6, 34, u64::MAX, ikey("", 1), ikey("\u{0}", 2));
    r
}

fn corruption_reason(err: &LarchError) -> &str {
    match err {
        LarchError::Corrupted { reason, .. } => reason,
        other => panic!("expected corruption, got {other:?}"),
    }
}

// =============================================================================
// Round Trip Tests
// =============================================================================

#[test]
fn test_round_trip_all_fields() {
    let record = full_record();
    let encoded = record.encode();

    let decoded = SessionRecord::decode(&encoded).unwrap();
    assert_eq!(decoded, record);
    assert_eq!(decoded.encode(), encoded);

    assert_eq!(decoded.comparer(), Some("leveldb.BytewiseComparator"));
    assert_eq!(decoded.journal_num(), Some(12));
    assert_eq!(decoded.prev_journal_num(), Some(11));
    assert_eq!(decoded.next_file_num(), Some(40));
    assert_eq!(decoded.seq_num(), Some(123_456_789));
    assert_eq!(decoded.compaction_pointers().len(), 2);
    assert_eq!(decoded.deleted_tables()[1].num, 18);

    let added = &decoded.added_tables()[1];
    assert_eq!(added.level, 6);
    assert_eq!(added.size, u64::MAX);
    assert_eq!(added.largest, ikey("\u{0}", 2));
}

#[test]
fn test_empty_record() {
    let record = SessionRecord::new();
    assert!(record.encode().is_empty());

    let decoded = SessionRecord::decode(&[]).unwrap();
    assert_eq!(decoded, record);
    assert_eq!(decoded.comparer(), None);
    assert_eq!(decoded.journal_num(), None);
    assert!(decoded.added_tables().is_empty());
}

#[test]
fn test_wire_field_order() {
    let mut r = SessionRecord::new();
    // Set in a different order than they are written.
    r.set_seq_num(4);
    r.set_next_file_num(3);
    r.set_prev_journal_num(1);
    r.set_journal_num(2);
    r.set_comparer("c");

    assert_eq!(r.encode(), vec![1, 1, b'c', 2, 2, 9, 1, 3, 3, 4, 4]);
}

#[test]
fn test_list_fields_on_the_wire() {
    let mut r = SessionRecord::new();
    r.add_table(1, 2, 3, ikey("a", 1), ikey("b", 1));
    r.del_table(4, 5);

    let mut expected = vec![6, 4, 5, 7, 1, 2, 3, 9];
    expected.extend_from_slice(ikey("a", 1).as_bytes());
    expected.push(9);
    expected.extend_from_slice(ikey("b", 1).as_bytes());
    assert_eq!(r.encode(), expected);
}

#[test]
fn test_decode_repeated_scalar_keeps_last() {
    let data = [2, 1, 2, 7];
    let r = SessionRecord::decode(&data).unwrap();
    assert_eq!(r.journal_num(), Some(7));
}

// =============================================================================
// Presence Tests
// =============================================================================

#[test]
fn test_has_tracks_set_fields() {
    let mut r = SessionRecord::new();
    assert!(!r.has(RecordField::JournalNum));

    r.set_journal_num(0);
    assert!(r.has(RecordField::JournalNum));
    assert_eq!(r.journal_num(), Some(0));
    assert!(!r.has(RecordField::PrevJournalNum));
}

#[test]
fn test_resets_clear_lists() {
    let mut r = full_record();
    assert!(r.has(RecordField::AddedTable));

    r.reset_added_tables();
    r.reset_deleted_tables();
    r.reset_compaction_pointers();

    assert!(!r.has(RecordField::AddedTable));
    assert!(!r.has(RecordField::DeletedTable));
    assert!(!r.has(RecordField::CompactionPointer));
    assert!(r.added_tables().is_empty());
    assert!(r.deleted_tables().is_empty());
    assert!(r.compaction_pointers().is_empty());
    // Scalars are untouched.
    assert_eq!(r.seq_num(), Some(123_456_789));

    let decoded = SessionRecord::decode(&r.encode()).unwrap();
    assert_eq!(decoded, r);
}

// =============================================================================
// Corruption Tests
// =============================================================================

#[test]
fn test_truncated_scalar() {
    let err = SessionRecord::decode(&[2]).unwrap_err();
    assert_eq!(
        corruption_reason(&err),
        "manifest corrupted (field 'journal-num'): short read"
    );

    let err = SessionRecord::decode(&[4, 0x80, 0x80]).unwrap_err();
    assert_eq!(
        corruption_reason(&err),
        "manifest corrupted (field 'seq-num'): short read"
    );
}

#[test]
fn test_truncated_bytes() {
    let err = SessionRecord::decode(&[1, 5, b'a', b'b']).unwrap_err();
    assert_eq!(
        corruption_reason(&err),
        "manifest corrupted (field 'comparer'): short read"
    );

    let err = SessionRecord::decode(&[7, 0, 1, 2, 3, b'x']).unwrap_err();
    assert_eq!(
        corruption_reason(&err),
        "manifest corrupted (field 'add-table.imin'): short read"
    );
}

#[test]
fn test_every_prefix_either_decodes_or_is_corrupted() {
    let encoded = full_record().encode();
    for n in 0..encoded.len() {
        match SessionRecord::decode(&encoded[..n]) {
            Ok(_) => {}
            Err(err) => assert!(err.is_corrupted(), "prefix {n}: {err}"),
        }
    }
}

#[test]
fn test_invalid_level() {
    let mut data = vec![6];
    let mut level = u64::from(u32::MAX);
    while level >= 0x80 {
        data.push((level as u8) | 0x80);
        level >>= 7;
    }
    data.push(level as u8);
    data.push(1);

    let err = SessionRecord::decode(&data).unwrap_err();
    assert_eq!(
        corruption_reason(&err),
        "manifest corrupted (field 'del-table.level'): invalid level number"
    );
}

#[test]
fn test_unknown_tag() {
    let err = SessionRecord::decode(&[8, 1]).unwrap_err();
    assert_eq!(
        corruption_reason(&err),
        "manifest corrupted (field 'field-header'): unknown tag 8"
    );
}

#[test]
fn test_varint_overflow() {
    let mut data = vec![3];
    data.extend_from_slice(&[0xff; 11]);

    let err = SessionRecord::decode(&data).unwrap_err();
    assert_eq!(
        corruption_reason(&err),
        "manifest corrupted (field 'next-file-num'): varint overflows a 64-bit integer"
    );
}

#[test]
fn test_ten_byte_varint_with_high_bits() {
    let mut data = vec![4];
    data.extend_from_slice(&[0xff; 9]);
    data.push(0x02);

    let err = SessionRecord::decode(&data).unwrap_err();
    assert_eq!(
        corruption_reason(&err),
        "manifest corrupted (field 'seq-num'): varint overflows a 64-bit integer"
    );

    // The largest value still decodes.
    let mut data = vec![4];
    data.extend_from_slice(&[0xff; 9]);
    data.push(0x01);
    assert_eq!(SessionRecord::decode(&data).unwrap().seq_num(), Some(u64::MAX));
}

#[test]
fn test_comparer_must_be_utf8() {
    let err = SessionRecord::decode(&[1, 2, 0xff, 0xfe]).unwrap_err();
    assert!(corruption_reason(&err).contains("field 'comparer'"));
}

#[test]
fn test_decode_file_names_manifest() {
    let fd = FileDesc::manifest(5);
    let err = SessionRecord::decode_file(&[2], fd).unwrap_err();

    match &err {
        LarchError::Corrupted { fd: Some(got), .. } => assert_eq!(*got, fd),
        other => panic!("expected corruption with a file, got {other:?}"),
    }
    assert!(err.to_string().contains("MANIFEST-000005"));

    let ok = SessionRecord::decode_file(&full_record().encode(), fd).unwrap();
    assert_eq!(ok, full_record());
}
