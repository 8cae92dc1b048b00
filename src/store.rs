//! Ordered transactional store: the memtable made durable by the WAL, with
//! optimistic concurrency control.
//!
//! ## Commit protocol
//! A transaction remembers the last committed sequence when it begins (its
//! read timestamp) and the keys it read. At commit, under the memtable write
//! lock:
//!
//! 1. every read key whose entry carries a sequence newer than the read
//!    timestamp fails the commit with `Conflict`
//! 2. the batch gets sequence `last + 1` and is appended to the WAL
//! 3. the batch is applied to the memtable
//!
//! Writers are serialized by the lock, so validation and apply are atomic.
//! Range scans only validate the keys they actually yielded; a key inserted
//! into a scanned range by a concurrent writer is not detected.
//!
//! ## Snapshots
//! Reads resolve every key as of the transaction's read timestamp. While any
//! other transaction is open, a commit moves the entries it overwrites into
//! the memtable's history; reclaim prunes history below the watermark.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use tracing::{debug, info, warn};

use crate::db::Stats;
use crate::error::{Error, Result};
use crate::iterator::StorageIterator;
use crate::memtable::MemTable;
use crate::types::{Direction, Key, Sequence, Value, namespace};
use crate::wal::reader::WALReader;
use crate::wal::record::RECORD_OVERHEAD;
use crate::wal::writer::WALManager;
use crate::wal::{RecordType, SyncPolicy, WALRecord};

/// Writes staged by a transaction. `None` is a delete.
pub type WriteBatch = BTreeMap<Key, Option<Value>>;

/// Keys read by a transaction.
pub type ReadSet = BTreeSet<Key>;

pub struct Store {
    memtable: RwLock<MemTable>,
    wal: Option<Mutex<WALManager>>,
    /// Read timestamps of open transactions, with multiplicity.
    readers: Mutex<BTreeMap<Sequence, usize>>,
    closed: AtomicBool,
    commits: AtomicU64,
    conflicts: AtomicU64,
    reclaims: AtomicU64,
}

impl Store {
    /// Open a durable store in `dir`, replaying any WAL files found there.
    pub fn open(dir: &Path, sync_policy: SyncPolicy) -> Result<Self> {
        let wal = WALManager::new(dir, sync_policy)?;
        let mut memtable = MemTable::new();

        for path in wal.sealed_files() {
            replay(path, &mut memtable)?;
        }

        info!(
            dir = %dir.display(),
            keys = memtable.live_len(),
            sequence = memtable.last_sequence(),
            wal_files = wal.file_count(),
            "store opened"
        );

        Ok(Store::with_parts(memtable, Some(wal)))
    }

    /// A store with no WAL. Contents are lost when it is dropped.
    pub fn in_memory() -> Self {
        Store::with_parts(MemTable::new(), None)
    }

    fn with_parts(memtable: MemTable, wal: Option<WALManager>) -> Self {
        Store {
            memtable: RwLock::new(memtable),
            wal: wal.map(Mutex::new),
            readers: Mutex::new(BTreeMap::new()),
            closed: AtomicBool::new(false),
            commits: AtomicU64::new(0),
            conflicts: AtomicU64::new(0),
            reclaims: AtomicU64::new(0),
        }
    }

    /// Shared access to committed state.
    pub fn memtable(&self) -> RwLockReadGuard<'_, MemTable> {
        self.memtable.read()
    }

    /// Register a new transaction and return its read timestamp.
    pub fn begin(&self) -> Sequence {
        // Registered under the memtable lock, so no commit can slip between
        // choosing the timestamp and becoming visible as a reader.
        let memtable = self.memtable.read();
        let read_ts = memtable.last_sequence();
        *self.readers.lock().entry(read_ts).or_insert(0) += 1;
        read_ts
    }

    /// Unregister a transaction started with `begin`.
    pub fn finish(&self, read_ts: Sequence) {
        let mut readers = self.readers.lock();
        if let Some(count) = readers.get_mut(&read_ts) {
            *count -= 1;
            if *count == 0 {
                readers.remove(&read_ts);
            }
        }
    }

    /// Smallest read timestamp among open transactions, or `last` when none
    /// are open. Tombstones at or below it can no longer cause a conflict.
    fn watermark(&self, last: Sequence) -> Sequence {
        self.readers.lock().keys().next().copied().unwrap_or(last)
    }

    /// Open transactions, the committing one included.
    fn open_readers(&self) -> usize {
        self.readers.lock().values().sum()
    }

    /// Validate and apply a transaction. Returns the commit sequence.
    pub fn commit(&self, read_ts: Sequence, reads: ReadSet, writes: WriteBatch) -> Result<Sequence> {
        if writes.is_empty() {
            return Ok(read_ts);
        }

        let mut memtable = self.memtable.write();
        if self.is_closed() {
            return Err(Error::Closed);
        }

        for key in &reads {
            if memtable.sequence_of(key) > read_ts {
                self.conflicts.fetch_add(1, Ordering::Relaxed);
                debug!(key = %String::from_utf8_lossy(key), read_ts, "commit conflict");
                return Err(Error::Conflict);
            }
        }

        let sequence = memtable.last_sequence() + 1;

        if let Some(wal) = &self.wal {
            let records: Vec<WALRecord> = writes
                .iter()
                .map(|(key, value)| match value {
                    Some(value) => WALRecord::put(key.clone(), value.clone()),
                    None => WALRecord::delete(key.clone()),
                })
                .collect();

            let mut wal = wal.lock();
            if let Err(e) = wal.active_writer().append_batch(&records, sequence) {
                // A half-written batch must end its file, or replay would
                // glue it onto the next commit.
                if let Err(rotate_err) = wal.rotate() {
                    warn!(error = %rotate_err, "failed to rotate WAL after write error");
                }
                return Err(e);
            }
        }

        // The committing transaction is registered too; anyone else may
        // still read the entries about to be replaced.
        if self.open_readers() > 1 {
            for key in writes.keys() {
                memtable.preserve(key);
            }
        } else {
            memtable.clear_history();
        }

        for (key, value) in writes {
            match value {
                Some(value) => memtable.put(key, value, sequence),
                None => memtable.delete(key, sequence),
            }
        }
        self.commits.fetch_add(1, Ordering::Relaxed);
        Ok(sequence)
    }

    /// Reclaim obsolete storage.
    ///
    /// Tombstones no open transaction can observe are purged from memory.
    /// When at least `discard_ratio` of the WAL is obsolete, the live data is
    /// rewritten as one snapshot batch into a fresh file and the older files
    /// are deleted. Returns whether the WAL was rewritten.
    pub fn reclaim(&self, discard_ratio: f64) -> Result<bool> {
        if self.is_closed() {
            return Err(Error::Closed);
        }

        let mut memtable = self.memtable.write();
        let watermark = self.watermark(memtable.last_sequence());
        let pruned = memtable.prune_history(watermark);
        let purged = memtable.purge_tombstones(watermark);
        if pruned > 0 || purged > 0 {
            debug!(pruned, purged, watermark, "dropped obsolete versions");
        }

        let Some(wal) = &self.wal else {
            return Ok(false);
        };
        let mut wal = wal.lock();

        let total = wal.total_bytes();
        if total == 0 {
            return Ok(false);
        }
        let live = memtable.live_bytes() + memtable.live_len() * RECORD_OVERHEAD;
        let discardable = 1.0 - live as f64 / total as f64;
        if discardable < discard_ratio {
            debug!(discardable, discard_ratio, "WAL rewrite not worth it");
            return Ok(false);
        }

        wal.rotate()?;

        let mut snapshot = Vec::with_capacity(memtable.live_len());
        let mut iter = memtable.iter();
        while iter.is_valid() {
            if let Some(value) = &iter.entry().value {
                snapshot.push(WALRecord::put(iter.key().to_vec(), value.clone()));
            }
            iter.next()?;
        }

        let writer = wal.active_writer();
        writer.append_batch(&snapshot, memtable.last_sequence())?;
        writer.sync()?;
        let removed = wal.delete_sealed()?;

        self.reclaims.fetch_add(1, Ordering::Relaxed);
        info!(
            keys = snapshot.len(),
            removed_files = removed,
            before = total,
            after = wal.total_bytes(),
            "WAL rewritten"
        );
        Ok(true)
    }

    /// Flush and fsync the active WAL file.
    pub fn sync(&self) -> Result<()> {
        match &self.wal {
            Some(wal) => wal.lock().active_writer().sync(),
            None => Ok(()),
        }
    }

    /// Refuse further commits and make the WAL durable.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        // Waits for an in-flight commit to finish.
        let _memtable = self.memtable.write();
        self.sync()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> Stats {
        let memtable = self.memtable.read();

        let mut namespaces = BTreeMap::new();
        let mut cursor = memtable.seek(Bound::Unbounded, Direction::Forward);
        while let Some((key, entry)) = cursor {
            if !entry.is_tombstone() {
                let key = String::from_utf8_lossy(key);
                *namespaces.entry(namespace(&key).to_string()).or_insert(0) += 1;
            }
            cursor = memtable.seek(Bound::Excluded(key), Direction::Forward);
        }

        let (wal_files, wal_bytes) = match &self.wal {
            Some(wal) => {
                let wal = wal.lock();
                (wal.file_count(), wal.total_bytes())
            }
            None => (0, 0),
        };

        Stats {
            keys: memtable.live_len(),
            tombstones: memtable.tombstones(),
            versions: memtable.versions(),
            live_bytes: memtable.live_bytes(),
            last_sequence: memtable.last_sequence(),
            commits: self.commits.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
            reclaims: self.reclaims.load(Ordering::Relaxed),
            wal_files,
            wal_bytes,
            namespaces,
        }
    }
}

/// Apply every complete batch of one WAL file to `memtable`.
fn replay(path: &Path, memtable: &mut MemTable) -> Result<()> {
    let reader = WALReader::new(path)?;
    let mut batch: Vec<WALRecord> = Vec::new();
    let mut batches = 0usize;

    let mut records = reader.iter();
    for record in records.by_ref() {
        let record = record?;
        match record.record_type {
            RecordType::Put | RecordType::Delete => batch.push(record),
            RecordType::Commit => {
                let sequence = record.sequence()?;
                for r in batch.drain(..) {
                    match r.record_type {
                        RecordType::Delete => memtable.delete(r.key, sequence),
                        _ => memtable.put(r.key, r.value, sequence),
                    }
                }
                memtable.set_last_sequence(sequence);
                batches += 1;
            }
        }
    }

    if !batch.is_empty() {
        warn!(
            path = %path.display(),
            records = batch.len(),
            "discarding uncommitted batch at end of WAL"
        );
    }
    if records.offset() < reader.len() {
        warn!(
            path = %path.display(),
            valid = records.offset(),
            len = reader.len(),
            "WAL has a corrupt or truncated tail"
        );
    }
    debug!(path = %path.display(), batches, "replayed WAL");
    Ok(())
}
