// Database handle: conflict retry, options, stats.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::thread;
use std::time::Duration;

use recordkv::db::{DEFAULT_DIR, DIR_ENV};
use recordkv::{Db, Error, ListOptions, Options, RetryPolicy};

fn open_db() -> Db {
    Db::open(
        Options::default()
            .with_in_memory(true)
            .with_maintenance_interval(Duration::ZERO),
    )
    .unwrap()
}

// =============================================================================
// Test 1: Concurrent increments of one counter all land
// =============================================================================
#[test]
fn concurrent_increments_are_serialized() {
    let db = Arc::new(
        Db::open(
            Options::default()
                .with_in_memory(true)
                .with_maintenance_interval(Duration::ZERO)
                .with_retry(RetryPolicy { max_attempts: 0, ..RetryPolicy::default() }),
        )
        .unwrap(),
    );

    let handles: Vec<_> = (0..5)
        .map(|_| {
            let db = Arc::clone(&db);
            thread::spawn(move || {
                for _ in 0..20 {
                    db.retry_on_conflict(|txn| txn.increment("counter", 1)).unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let total: i64 = db.view(|txn| txn.unmarshal("counter")).unwrap();
    assert_eq!(total, 100);
    assert_eq!(db.stats().unwrap().commits, 100);
}

// =============================================================================
// Test 2: Retry gives up after max_attempts
// =============================================================================
#[test]
fn retry_exhaustion_returns_conflict() {
    let db = Db::open(
        Options::default()
            .with_in_memory(true)
            .with_maintenance_interval(Duration::ZERO)
            .with_retry(RetryPolicy {
                max_attempts: 3,
                initial_backoff: Duration::from_micros(10),
                max_backoff: Duration::from_micros(100),
            }),
    )
    .unwrap();
    db.update(|txn| txn.set("k", "0")).unwrap();

    let attempts = AtomicU32::new(0);
    let result = db.retry_on_conflict(|txn| {
        attempts.fetch_add(1, Ordering::SeqCst);
        txn.get("k")?;
        // Someone else always changes what we just read.
        db.update(|other| other.set("k", "changed"))?;
        txn.set("x", "mine")
    });

    assert!(matches!(result, Err(Error::Conflict)));
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert!(!db.view(|txn| txn.has("x")).unwrap());
}

// =============================================================================
// Test 3: Non-conflict errors are not retried
// =============================================================================
#[test]
fn other_errors_are_not_retried() {
    let db = open_db();
    let mut attempts = 0;
    let result: recordkv::Result<()> = db.retry_on_conflict(|_| {
        attempts += 1;
        Err(Error::Corruption("boom".into()))
    });
    assert!(matches!(result, Err(Error::Corruption(_))));
    assert_eq!(attempts, 1);
}

// =============================================================================
// Test 4: Backoff grows, is capped, and has jitter in the upper half
// =============================================================================
#[test]
fn backoff_is_capped_exponential() {
    let policy = RetryPolicy {
        max_attempts: 10,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(4),
    };

    let first = policy.backoff(0);
    assert!(first >= Duration::from_micros(500) && first <= Duration::from_millis(1));

    let second = policy.backoff(1);
    assert!(second >= Duration::from_millis(1) && second <= Duration::from_millis(2));

    for attempt in [5, 20, 1000] {
        let late = policy.backoff(attempt);
        assert!(late >= Duration::from_millis(2) && late <= Duration::from_millis(4));
    }

    assert_eq!(RetryPolicy::unbounded().backoff(7), Duration::ZERO);
    assert_eq!(RetryPolicy::default().max_attempts, 128);
}

// =============================================================================
// Test 5: Directory precedence
// =============================================================================
#[test]
fn directory_resolution() {
    let explicit = Options::default().with_dir("/srv/records");
    assert_eq!(explicit.resolve_dir(), PathBuf::from("/srv/records"));

    let fallback = match std::env::var_os(DIR_ENV) {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => PathBuf::from(DEFAULT_DIR),
    };
    assert_eq!(Options::default().resolve_dir(), fallback);

    let tmp = tempfile::tempdir().unwrap();
    let db = Db::open(
        Options::default()
            .with_dir(tmp.path())
            .with_maintenance_interval(Duration::ZERO),
    )
    .unwrap();
    assert_eq!(db.dir(), Some(tmp.path()));
    assert!(open_db().dir().is_none());
}

// =============================================================================
// Test 6: Stats count keys per namespace
// =============================================================================
#[test]
fn stats_by_namespace() {
    let db = open_db();
    db.update(|txn| {
        txn.set("user:1", "a")?;
        txn.set("user:2", "b")?;
        txn.set("order:9", "c")?;
        txn.set("plain", "d")?;
        txn.set(":orphan", "e")
    })
    .unwrap();
    db.update(|txn| txn.delete("user:2")).unwrap();

    let stats = db.stats().unwrap();
    assert_eq!(stats.keys, 4);
    assert_eq!(stats.tombstones, 1);
    assert_eq!(stats.commits, 2);
    assert_eq!(stats.wal_files, 0);

    let namespaces: Vec<(&str, usize)> = stats.namespaces.iter().map(|(k, v)| (k.as_str(), *v)).collect();
    assert_eq!(namespaces, vec![("default", 1), ("order", 1), ("plain", 1), ("user", 1)]);
}

// =============================================================================
// Test 7: Old versions and tombstones survive reclaim while a reader needs them
// =============================================================================
#[test]
fn reclaim_respects_open_readers() {
    let db = open_db();
    db.update(|txn| {
        for i in 0..10 {
            txn.set(&format!("k:{i}"), "v")?;
        }
        Ok(())
    })
    .unwrap();

    let reader = db.begin(false).unwrap();
    db.update(|txn| {
        for i in 0..10 {
            txn.delete(&format!("k:{i}"))?;
        }
        Ok(())
    })
    .unwrap();

    assert!(!db.reclaim().unwrap());
    let stats = db.stats().unwrap();
    assert_eq!(stats.tombstones, 10);
    assert_eq!(stats.versions, 10);
    assert_eq!(reader.get("k:3").unwrap(), b"v");
    assert_eq!(reader.list_keys("k:", &ListOptions::new()).unwrap().len(), 10);

    drop(reader);
    db.reclaim().unwrap();
    let stats = db.stats().unwrap();
    assert_eq!(stats.tombstones, 0);
    assert_eq!(stats.versions, 0);
    assert_eq!(stats.keys, 0);
}
