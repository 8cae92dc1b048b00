// Range lister: prefix bounds, begin/contain_begin, reverse, limit, stop.

use std::ops::ControlFlow;
use std::time::Duration;

use recordkv::iterator::StorageIterator;
use recordkv::list::scan;
use recordkv::memtable::skiplist::SkipList;
use recordkv::types::Versioned;
use recordkv::{Db, Error, ListOptions, Options};

fn open_db() -> Db {
    Db::open(
        Options::default()
            .with_in_memory(true)
            .with_maintenance_interval(Duration::ZERO),
    )
    .unwrap()
}

/// `user:01` .. `user:05` plus neighbours on both sides of the prefix.
fn seeded() -> Db {
    let db = open_db();
    db.update(|txn| {
        txn.set("user", "bare prefix, no colon")?;
        txn.set("useq:00", "just before")?;
        for i in 1..=5 {
            txn.set(&format!("user:{:02}", i), format!("u{}", i))?;
        }
        txn.set("user;", "just after")?;
        txn.set("zzz", "far")
    })
    .unwrap();
    db
}

fn keys(db: &Db, prefix: &str, opts: &ListOptions) -> Vec<String> {
    db.view(|txn| txn.list_keys(prefix, opts)).unwrap()
}

// =============================================================================
// Test 1: Only keys with the prefix, ascending
// =============================================================================
#[test]
fn forward_lists_prefix_only() {
    let db = seeded();
    assert_eq!(
        keys(&db, "user:", &ListOptions::new()),
        vec!["user:01", "user:02", "user:03", "user:04", "user:05"]
    );
}

// =============================================================================
// Test 2: Reverse starts at the last key with the prefix
// =============================================================================
#[test]
fn reverse_lists_descending() {
    let db = seeded();
    assert_eq!(
        keys(&db, "user:", &ListOptions::new().with_reverse(true)),
        vec!["user:05", "user:04", "user:03", "user:02", "user:01"]
    );
}

// =============================================================================
// Test 3: Values are handed to the visitor unless key_only
// =============================================================================
#[test]
fn values_and_key_only() {
    let db = seeded();
    let mut seen = Vec::new();
    db.list("user:0", &ListOptions::new().with_limit(2), |key, value| {
        seen.push((key.to_string(), value.map(<[u8]>::to_vec)));
        Ok(ControlFlow::Continue(()))
    })
    .unwrap();
    assert_eq!(
        seen,
        vec![
            ("user:01".to_string(), Some(b"u1".to_vec())),
            ("user:02".to_string(), Some(b"u2".to_vec())),
        ]
    );

    let mut values = Vec::new();
    db.list("user:", &ListOptions::new().with_key_only(true), |_, value| {
        values.push(value.is_none());
        Ok(ControlFlow::Continue(()))
    })
    .unwrap();
    assert_eq!(values, vec![true; 5]);
}

// =============================================================================
// Test 4: begin without contain_begin resumes after it
// =============================================================================
#[test]
fn begin_is_resume_after() {
    let db = seeded();
    let opts = ListOptions::new().with_begin("user:02");
    assert_eq!(keys(&db, "user:", &opts), vec!["user:03", "user:04", "user:05"]);

    let opts = opts.with_contain_begin(true);
    assert_eq!(keys(&db, "user:", &opts), vec!["user:02", "user:03", "user:04", "user:05"]);
}

// =============================================================================
// Test 5: A begin key that does not exist is not skipped over
// =============================================================================
#[test]
fn missing_begin_does_not_skip() {
    let db = seeded();
    let opts = ListOptions::new().with_begin("user:025");
    assert_eq!(keys(&db, "user:", &opts), vec!["user:03", "user:04", "user:05"]);

    let opts = ListOptions::new().with_begin("user:025").with_reverse(true);
    assert_eq!(keys(&db, "user:", &opts), vec!["user:02", "user:01"]);
}

// =============================================================================
// Test 6: Reverse with begin
// =============================================================================
#[test]
fn reverse_with_begin() {
    let db = seeded();
    let opts = ListOptions::new().with_begin("user:04").with_reverse(true);
    assert_eq!(keys(&db, "user:", &opts), vec!["user:03", "user:02", "user:01"]);

    let opts = opts.with_contain_begin(true).with_limit(2);
    assert_eq!(keys(&db, "user:", &opts), vec!["user:04", "user:03"]);
}

// =============================================================================
// Test 7: Pages of `limit` keys cover everything with no gap or overlap
// =============================================================================
#[test]
fn pagination_resumes_cleanly() {
    let db = seeded();
    for reverse in [false, true] {
        let mut all = Vec::new();
        let mut opts = ListOptions::new().with_limit(2).with_reverse(reverse);
        loop {
            let page = keys(&db, "user:", &opts);
            if page.is_empty() {
                break;
            }
            assert!(page.len() <= 2);
            opts = opts.with_begin(page.last().unwrap().clone());
            all.extend(page);
        }
        let mut expected = keys(&db, "user:", &ListOptions::new().with_reverse(reverse));
        assert_eq!(all, expected);
        expected.dedup();
        assert_eq!(all.len(), expected.len());
    }
}

// =============================================================================
// Test 8: Break and StopIteration end the listing successfully
// =============================================================================
#[test]
fn visitor_can_stop() {
    let db = seeded();

    let mut count = 0;
    db.list("user:", &ListOptions::new(), |_, _| {
        count += 1;
        Ok(if count == 2 { ControlFlow::Break(()) } else { ControlFlow::Continue(()) })
    })
    .unwrap();
    assert_eq!(count, 2);

    let mut count = 0;
    db.list("user:", &ListOptions::new(), |_, _| {
        count += 1;
        if count == 3 { Err(Error::StopIteration) } else { Ok(ControlFlow::Continue(())) }
    })
    .unwrap();
    assert_eq!(count, 3);
}

// =============================================================================
// Test 9: Other visitor errors abort and propagate
// =============================================================================
#[test]
fn visitor_error_propagates() {
    let db = seeded();
    let mut count = 0;
    let err = db
        .list("user:", &ListOptions::new(), |key, _| {
            count += 1;
            Err(Error::Corruption(key.to_string()))
        })
        .unwrap_err();
    assert!(matches!(err, Error::Corruption(ref k) if k == "user:01"));
    assert_eq!(count, 1);
}

// =============================================================================
// Test 10: Listing sees the transaction's own pending writes
// =============================================================================
#[test]
fn list_merges_pending_writes() {
    let db = seeded();
    db.update(|txn| {
        txn.delete("user:02")?;
        txn.set("user:03", "changed")?;
        txn.set("user:035", "new")?;

        assert_eq!(
            txn.list_keys("user:", &ListOptions::new())?,
            vec!["user:01", "user:03", "user:035", "user:04", "user:05"]
        );
        assert_eq!(
            txn.list_keys("user:", &ListOptions::new().with_reverse(true))?,
            vec!["user:05", "user:04", "user:035", "user:03", "user:01"]
        );
        assert_eq!(txn.get("user:03")?, b"changed");
        Ok(())
    })
    .unwrap();
}

// =============================================================================
// Test 11: Deleting keys from inside the visitor
// =============================================================================
#[test]
fn visitor_may_write_through_txn() {
    let db = seeded();
    db.update(|txn| {
        txn.list("user:", &ListOptions::new().with_key_only(true), |key, _| {
            txn.delete(key)?;
            Ok(ControlFlow::Continue(()))
        })
    })
    .unwrap();

    assert!(keys(&db, "user:", &ListOptions::new()).is_empty());
    assert_eq!(keys(&db, "user", &ListOptions::new()), vec!["user", "user;"]);
}

// =============================================================================
// Test 12: Prefixes ending in 0xff and the empty prefix
// =============================================================================
#[test]
fn scan_edge_prefixes() {
    let mut sl = SkipList::new();
    for (i, k) in [&b"a"[..], b"a\xff", b"a\xff\x01", b"b"].iter().enumerate() {
        sl.insert(k.to_vec(), Versioned::put(i as u64, Vec::new()));
    }

    let collect = |prefix: &[u8], reverse: bool| {
        let mut iter = sl.iter();
        let mut out = Vec::new();
        let opts = ListOptions::new().with_reverse(reverse).with_key_only(true);
        scan(&mut iter, prefix, &opts, |key, _| {
            out.push(key.to_string());
            Ok(ControlFlow::Continue(()))
        })
        .unwrap();
        assert!(!iter.is_valid() || !iter.key().starts_with(prefix));
        out
    };

    assert_eq!(collect(b"a\xff", true).len(), 2);
    assert_eq!(collect(b"", false).len(), 4);
    assert_eq!(collect(b"", true).len(), 4);
}
