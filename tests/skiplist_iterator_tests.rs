// Skip list iterator: bidirectional traversal and seeking.

use recordkv::iterator::StorageIterator;
use recordkv::memtable::skiplist::SkipList;
use recordkv::types::Versioned;

fn list_of(keys: &[&str]) -> SkipList {
    let mut sl = SkipList::new();
    for (i, k) in keys.iter().enumerate() {
        sl.insert(k.as_bytes().to_vec(), Versioned::put(i as u64 + 1, k.to_uppercase().into_bytes()));
    }
    sl
}

// =============================================================================
// Test 1: Empty iterator
// =============================================================================
#[test]
fn iterator_empty_skiplist_is_invalid() {
    let sl = SkipList::new();
    let mut iter = sl.iter();
    assert!(!iter.is_valid());

    iter.seek_to_last().unwrap();
    assert!(!iter.is_valid());
}

// =============================================================================
// Test 2: Entries come out sorted whatever the insert order
// =============================================================================
#[test]
fn iterator_returns_sorted_order() {
    let sl = list_of(&["charlie", "alpha", "bravo"]);

    let mut iter = sl.iter();
    let mut seen = Vec::new();
    while iter.is_valid() {
        seen.push((iter.key().to_vec(), iter.value().to_vec()));
        iter.next().unwrap();
    }

    assert_eq!(
        seen,
        vec![
            (b"alpha".to_vec(), b"ALPHA".to_vec()),
            (b"bravo".to_vec(), b"BRAVO".to_vec()),
            (b"charlie".to_vec(), b"CHARLIE".to_vec()),
        ]
    );
}

// =============================================================================
// Test 3: Walk backwards from the last entry
// =============================================================================
#[test]
fn iterator_prev_walks_backwards() {
    let mut sl = SkipList::new();
    for i in 0..100u64 {
        sl.insert(format!("key_{:03}", i).into_bytes(), Versioned::put(i, Vec::new()));
    }

    let mut iter = sl.iter();
    iter.seek_to_last().unwrap();
    let mut collected = Vec::new();
    while iter.is_valid() {
        collected.push(iter.key().to_vec());
        iter.prev().unwrap();
    }

    assert_eq!(collected.len(), 100);
    for (i, key) in collected.iter().enumerate() {
        assert_eq!(key, format!("key_{:03}", 99 - i).as_bytes());
    }
}

// =============================================================================
// Test 4: seek lands on the key or the next one
// =============================================================================
#[test]
fn iterator_seek() {
    let sl = list_of(&["a", "c", "e"]);
    let mut iter = sl.iter();

    iter.seek(b"c").unwrap();
    assert_eq!(iter.key(), b"c");

    iter.seek(b"b").unwrap();
    assert_eq!(iter.key(), b"c");

    iter.seek(b"0").unwrap();
    assert_eq!(iter.key(), b"a");

    iter.seek(b"z").unwrap();
    assert!(!iter.is_valid());
}

// =============================================================================
// Test 5: seek_for_prev lands on the key or the previous one
// =============================================================================
#[test]
fn iterator_seek_for_prev() {
    let sl = list_of(&["a", "c", "e"]);
    let mut iter = sl.iter();

    iter.seek_for_prev(b"c").unwrap();
    assert_eq!(iter.key(), b"c");

    iter.seek_for_prev(b"d").unwrap();
    assert_eq!(iter.key(), b"c");

    iter.seek_for_prev(b"z").unwrap();
    assert_eq!(iter.key(), b"e");

    iter.seek_for_prev(b"0").unwrap();
    assert!(!iter.is_valid());
}

// =============================================================================
// Test 6: Direction changes mid-walk
// =============================================================================
#[test]
fn iterator_next_then_prev() {
    let sl = list_of(&["a", "b", "c"]);
    let mut iter = sl.iter();

    iter.seek_to_first().unwrap();
    iter.next().unwrap();
    assert_eq!(iter.key(), b"b");
    iter.prev().unwrap();
    assert_eq!(iter.key(), b"a");
    iter.prev().unwrap();
    assert!(!iter.is_valid());
}

// =============================================================================
// Test 7: Tombstones are visited with an empty value
// =============================================================================
#[test]
fn iterator_visits_tombstones() {
    let mut sl = list_of(&["a", "b"]);
    sl.insert(b"a".to_vec(), Versioned::tombstone(9));

    let iter = sl.iter();
    assert_eq!(iter.key(), b"a");
    assert!(iter.value().is_empty());
    assert!(iter.entry().is_tombstone());
    assert_eq!(iter.entry().sequence, 9);
}
