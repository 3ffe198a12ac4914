//! Tests for the block writer and block iterator
//!
//! These tests verify:
//! - Restart trailer layout, including the empty block
//! - Forward, backward and mixed traversal for several restart intervals
//! - Seek to every key and between keys
//! - Slice restriction (start/limit, inclusive limit)
//! - Corruption detection

use std::sync::Arc;

use larchkv::comparer::{BytewiseComparer, Comparer};
use larchkv::iterator::{IterState, IteratorSeeker, StorageIterator};
use larchkv::table::{Block, BlockIter, BlockWriter};
use larchkv::util::{BufferPool, Range};

// =============================================================================
// Helper Functions
// =============================================================================

fn entries(n: usize) -> Vec<(Vec<u8>, Vec<u8>)> {
    (0..n)
        .map(|i| {
            (
                format!("key{:04}", i * 2).into_bytes(),
                format!("value{}", i).into_bytes(),
            )
        })
        .collect()
}

fn build_block(entries: &[(Vec<u8>, Vec<u8>)], restart_interval: usize) -> Arc<Block> {
    let mut writer = BlockWriter::new(restart_interval);
    for (k, v) in entries {
        writer.append(k, v);
    }
    let data = writer.finish().to_vec();
    Arc::new(Block::new(data, None).unwrap())
}

fn cmp() -> Arc<dyn Comparer> {
    Arc::new(BytewiseComparer)
}

fn iter(block: &Arc<Block>) -> BlockIter {
    BlockIter::new(block.clone(), cmp(), None, false)
}

fn collect_forward(it: &mut BlockIter) -> Vec<Vec<u8>> {
    let mut keys = Vec::new();
    while it.next() {
        keys.push(it.key().to_vec());
    }
    keys
}

fn collect_backward(it: &mut BlockIter) -> Vec<Vec<u8>> {
    let mut keys = Vec::new();
    while it.prev() {
        keys.push(it.key().to_vec());
    }
    keys
}

// =============================================================================
// Writer Tests
// =============================================================================

#[test]
fn test_empty_block_layout() {
    let mut writer = BlockWriter::new(16);
    assert!(writer.is_empty());
    assert_eq!(writer.bytes_len(), 8);

    let data = writer.finish().to_vec();
    assert_eq!(data, vec![0, 0, 0, 0, 1, 0, 0, 0]);

    let block = Arc::new(Block::new(data, None).unwrap());
    assert_eq!(block.restarts_len(), 1);
    let mut it = iter(&block);
    assert!(!it.first());
    assert!(!it.last());
    assert!(!it.seek(b"anything"));
    assert!(it.error().is_none());
}

#[test]
fn test_prefix_compression() {
    let mut writer = BlockWriter::new(16);
    writer.append(b"apple", b"1");
    writer.append(b"applesauce", b"2");
    let data = writer.finish().to_vec();

    // First entry: shared 0, unshared 5, value 1.
    assert_eq!(&data[..3], &[0, 5, 1]);
    assert_eq!(&data[3..9], b"apple1");
    // Second entry shares "apple".
    assert_eq!(&data[9..12], &[5, 5, 1]);
    assert_eq!(&data[12..18], b"sauce2");
    // One restart at 0, count 1.
    assert_eq!(&data[18..], &[0, 0, 0, 0, 1, 0, 0, 0]);
}

#[test]
fn test_bytes_len_matches_finish() {
    let mut writer = BlockWriter::new(3);
    for (k, v) in entries(10) {
        writer.append(&k, &v);
    }
    let estimate = writer.bytes_len();
    assert_eq!(writer.entries_len(), 10);
    assert_eq!(writer.finish().len(), estimate);

    writer.reset();
    assert!(writer.is_empty());
    assert_eq!(writer.bytes_len(), 8);
}

// =============================================================================
// Traversal Tests
// =============================================================================

#[test]
fn test_forward_and_backward_all_intervals() {
    let data = entries(37);
    let keys: Vec<Vec<u8>> = data.iter().map(|(k, _)| k.clone()).collect();

    for interval in 1..=5 {
        let block = build_block(&data, interval);

        let mut it = iter(&block);
        assert_eq!(it.state(), IterState::Unpositioned);
        assert_eq!(collect_forward(&mut it), keys, "interval {interval}");
        assert_eq!(it.state(), IterState::Exhausted);

        // prev from the end behaves as last.
        let mut reversed = keys.clone();
        reversed.reverse();
        assert_eq!(collect_backward(&mut it), reversed, "interval {interval}");
        assert!(it.error().is_none());
    }
}

#[test]
fn test_values_follow_keys() {
    let data = entries(20);
    let block = build_block(&data, 4);
    let mut it = iter(&block);

    for (k, v) in &data {
        assert!(it.next());
        assert_eq!(it.key(), &k[..]);
        assert_eq!(it.value(), &v[..]);
    }
    assert!(!it.next());
    assert!(it.key().is_empty());
}

#[test]
fn test_direction_changes() {
    let data = entries(10);
    let block = build_block(&data, 3);
    let mut it = iter(&block);

    assert!(it.seek(b"key0008"));
    assert!(it.prev());
    assert_eq!(it.key(), b"key0006");
    assert!(it.next());
    assert_eq!(it.key(), b"key0008");
    assert!(it.next());
    assert_eq!(it.key(), b"key0010");

    assert!(it.first());
    assert!(!it.prev());
    assert_eq!(it.state(), IterState::Exhausted);
    // next after falling off the front starts over.
    assert!(it.next());
    assert_eq!(it.key(), b"key0000");

    assert!(it.last());
    assert_eq!(it.key(), b"key0018");
    assert!(!it.next());
    assert!(it.prev());
    assert_eq!(it.key(), b"key0018");
}

// =============================================================================
// Seek Tests
// =============================================================================

#[test]
fn test_seek_every_key() {
    let data = entries(50);
    for interval in 1..=5 {
        let block = build_block(&data, interval);
        let mut it = iter(&block);

        for (k, v) in &data {
            assert!(it.seek(k), "seek {:?}", String::from_utf8_lossy(k));
            assert_eq!(it.key(), &k[..]);
            assert_eq!(it.value(), &v[..]);
        }
    }
}

#[test]
fn test_seek_between_keys() {
    let data = entries(50);
    let block = build_block(&data, 4);
    let mut it = iter(&block);

    // Odd numbers fall between stored keys.
    for i in 0..49 {
        let target = format!("key{:04}", i * 2 + 1);
        assert!(it.seek(target.as_bytes()));
        assert_eq!(it.key(), format!("key{:04}", i * 2 + 2).as_bytes());
    }

    assert!(it.seek(b"a"));
    assert_eq!(it.key(), b"key0000");
    assert!(!it.seek(b"key9999"));
    assert!(it.error().is_none());
}

// =============================================================================
// Slice Tests
// =============================================================================

#[test]
fn test_slice_restricts_entries() {
    let data = entries(20);
    let block = build_block(&data, 3);

    let range = Range::new(b"key0010".to_vec(), b"key0020".to_vec());
    let mut it = BlockIter::new(block.clone(), cmp(), Some(&range), false);

    let expected: Vec<Vec<u8>> = (5..10)
        .map(|i| format!("key{:04}", i * 2).into_bytes())
        .collect();
    assert_eq!(collect_forward(&mut it), expected);

    let mut reversed = expected.clone();
    reversed.reverse();
    assert_eq!(collect_backward(&mut it), reversed);

    // Seeks outside the slice clamp to it.
    assert!(it.seek(b"a"));
    assert_eq!(it.key(), b"key0010");
    assert!(!it.seek(b"key0020"));
    assert!(it.error().is_none());
}

#[test]
fn test_slice_bounds_between_keys() {
    let data = entries(20);
    let block = build_block(&data, 4);

    let range = Range::new(b"key0009".to_vec(), b"key0013".to_vec());
    let mut it = BlockIter::new(block.clone(), cmp(), Some(&range), false);
    assert_eq!(
        collect_forward(&mut it),
        vec![b"key0010".to_vec(), b"key0012".to_vec()]
    );

    // An inclusive limit keeps the first entry at or past it.
    let mut it = BlockIter::new(block, cmp(), Some(&range), true);
    assert_eq!(
        collect_forward(&mut it),
        vec![b"key0010".to_vec(), b"key0012".to_vec(), b"key0014".to_vec()]
    );
}

#[test]
fn test_open_ended_slices() {
    let data = entries(10);
    let block = build_block(&data, 2);

    let head = Range {
        start: None,
        limit: Some(b"key0004".to_vec()),
    };
    let mut it = BlockIter::new(block.clone(), cmp(), Some(&head), false);
    assert_eq!(
        collect_forward(&mut it),
        vec![b"key0000".to_vec(), b"key0002".to_vec()]
    );

    let tail = Range {
        start: Some(b"key0015".to_vec()),
        limit: None,
    };
    let mut it = BlockIter::new(block.clone(), cmp(), Some(&tail), false);
    assert!(it.last());
    assert_eq!(it.key(), b"key0018");
    assert!(it.prev());
    assert_eq!(it.key(), b"key0016");
    assert!(!it.prev());

    let empty = Range::new(b"zzz".to_vec(), b"zzzz".to_vec());
    let mut it = BlockIter::new(block, cmp(), Some(&empty), false);
    assert!(!it.first());
    assert!(!it.last());
}

// =============================================================================
// Corruption Tests
// =============================================================================

#[test]
fn test_block_too_small() {
    let err = Block::new(vec![1, 2, 3], None).unwrap_err();
    assert!(err.is_corrupted());
    assert!(err.to_string().contains("block too small"));
}

#[test]
fn test_bad_restart_count() {
    let err = Block::new(vec![0, 0, 0, 0, 9, 0, 0, 0], None).unwrap_err();
    assert!(err.is_corrupted());
    assert!(err.to_string().contains("bad restart count"));

    let err = Block::new(vec![0, 0, 0, 0], None).unwrap_err();
    assert!(err.to_string().contains("bad restart count"));
}

#[test]
fn test_corrupted_entry_sets_error() {
    let mut writer = BlockWriter::new(16);
    writer.append(b"apple", b"1");
    writer.append(b"banana", b"2");
    let mut data = writer.finish().to_vec();
    // Second entry claims a huge value.
    data[9 + 2] = 0x7f;

    let block = Arc::new(Block::new(data, None).unwrap());
    let mut it = iter(&block);
    assert!(it.first());
    assert_eq!(it.key(), b"apple");
    assert!(!it.next());
    assert!(it.error().unwrap().is_corrupted());
    assert_eq!(it.state(), IterState::Errored);
    // Errors are sticky.
    assert!(!it.first());
}

#[test]
fn test_overlong_varint_entry_is_corrupted() {
    // Ten-byte length whose final byte spills past 64 bits.
    let mut data = vec![0xff; 9];
    data.extend_from_slice(&[0x02, 0, 0]);
    data.extend_from_slice(&[0, 0, 0, 0, 1, 0, 0, 0]);

    let block = Arc::new(Block::new(data, None).unwrap());
    let mut it = iter(&block);
    assert!(!it.first());
    assert!(it.error().unwrap().is_corrupted());
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_released_iterator() {
    let block = build_block(&entries(5), 2);
    let mut it = iter(&block);
    assert!(it.first());

    it.release();
    assert!(!it.valid());
    assert_eq!(it.state(), IterState::Released);
    assert!(!it.next());
    assert!(it.error().unwrap().is_released());
    // Releasing twice is harmless.
    it.release();
}

#[test]
fn test_block_returns_buffer_to_pool() {
    let pool = Arc::new(BufferPool::new(1024));
    let mut writer = BlockWriter::new(4);
    for (k, v) in entries(10) {
        writer.append(&k, &v);
    }
    let raw = writer.finish().to_vec();

    let mut data = pool.get(raw.len());
    data.copy_from_slice(&raw);
    let block = Arc::new(Block::new(data, Some(pool.clone())).unwrap());
    let mut it = iter(&block);
    assert!(it.last());
    drop(it);
    drop(block);

    assert_eq!(pool.stats().put, 1);
}
