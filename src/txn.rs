//! Transaction handle over string keys.
//!
//! A `Txn` reads a snapshot: committed data as of its read timestamp, with
//! its own staged writes merged on top. Commits that land while it runs stay
//! invisible to it; a read-write transaction that read a key changed by one
//! of them fails to commit with `Conflict`. Nothing reaches the store until
//! `commit`. Dropping a transaction without committing discards it.
//!
//! Methods take `&self` so a listing visitor can read and write through the
//! same transaction it is iterating.

use std::cell::RefCell;
use std::ops::Bound;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::codec;
use crate::error::{Error, Result};
use crate::iterator::TxnIterator;
use crate::iterator::merge::merge_seek;
use crate::store::{ReadSet, Store, WriteBatch};
use crate::types::{Direction, Key, Sequence, Value};

pub struct Txn {
    store: Arc<Store>,
    read_ts: Sequence,
    writable: bool,
    compression: bool,
    pending: RefCell<WriteBatch>,
    reads: RefCell<ReadSet>,
}

impl Txn {
    pub(crate) fn new(store: Arc<Store>, writable: bool, compression: bool) -> Self {
        let read_ts = store.begin();
        Txn {
            store,
            read_ts,
            writable,
            compression,
            pending: RefCell::new(WriteBatch::new()),
            reads: RefCell::new(ReadSet::new()),
        }
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// Sequence of the last commit this transaction sees.
    pub fn read_ts(&self) -> Sequence {
        self.read_ts
    }

    /// Number of staged writes.
    pub fn pending_len(&self) -> usize {
        self.pending.borrow().len()
    }

    /// Value bytes of `key` (decompressed), or `KeyNotFound`.
    pub fn get(&self, key: &str) -> Result<Vec<u8>> {
        match self.stored(key.as_bytes())? {
            Some(stored) => Ok(codec::unpack(&stored)),
            None => Err(Error::not_found(key)),
        }
    }

    pub fn has(&self, key: &str) -> Result<bool> {
        Ok(self.stored(key.as_bytes())?.is_some())
    }

    /// Stage raw bytes under `key`. Strings and byte slices are stored as
    /// given, without quoting.
    pub fn set(&self, key: &str, value: impl AsRef<[u8]>) -> Result<()> {
        self.stage(key, Some(codec::pack(value.as_ref(), self.compression)))
    }

    /// Marshal `value` with the codec and stage it under `key`.
    pub fn set_value<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let raw = codec::marshal(value)?;
        self.set(key, raw)
    }

    /// Stage a delete. Deleting an absent key is not an error.
    pub fn delete(&self, key: &str) -> Result<()> {
        self.stage(key, None)
    }

    /// Read `key` and decode it into `T`.
    pub fn unmarshal<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let raw = self.get(key)?;
        codec::unmarshal(key, &raw)
    }

    /// Read `key` as an integer (absent reads as 0), add `step`, write it
    /// back. Only as atomic as the transaction itself. Overflow fails with
    /// `Corruption` and stages nothing.
    pub fn increment(&self, key: &str, step: i64) -> Result<i64> {
        let current = match self.unmarshal::<i64>(key) {
            Ok(n) => n,
            Err(e) if e.is_not_found() => 0,
            Err(e) => return Err(e),
        };
        let next = current
            .checked_add(step)
            .ok_or_else(|| Error::Corruption(format!("counter {key} overflows: {current} + {step}")))?;
        self.set_value(key, &next)?;
        Ok(next)
    }

    pub fn decrement(&self, key: &str, step: i64) -> Result<i64> {
        let step = step
            .checked_neg()
            .ok_or_else(|| Error::Corruption(format!("counter {key}: step {step} cannot be negated")))?;
        self.increment(key, step)
    }

    /// Cursor over this transaction's view. Values are stored bytes and may
    /// still be compressed; `key_only` skips copying them.
    pub fn iter(&self, key_only: bool) -> TxnIterator<'_> {
        TxnIterator::new(self, key_only)
    }

    /// Validate and apply the staged writes. A read-only transaction, or one
    /// with nothing staged, commits trivially.
    pub fn commit(self) -> Result<()> {
        if !self.writable {
            return Ok(());
        }
        let writes = self.pending.take();
        let reads = self.reads.take();
        self.store.commit(self.read_ts, reads, writes)?;
        Ok(())
    }

    /// Nearest visible entry from `start`, recorded in the read set.
    pub(crate) fn locate(
        &self,
        start: Bound<&[u8]>,
        direction: Direction,
        want_value: bool,
    ) -> Result<Option<(Key, Value)>> {
        self.ensure_open()?;
        let found = {
            let memtable = self.store.memtable();
            merge_seek(&memtable, &self.pending.borrow(), start, direction, self.read_ts, want_value)
        };
        if let Some((key, _)) = &found {
            self.track(key);
        }
        Ok(found)
    }

    /// Stored bytes of `key` as this transaction sees them.
    fn stored(&self, key: &[u8]) -> Result<Option<Value>> {
        self.ensure_open()?;
        if let Some(staged) = self.pending.borrow().get(key) {
            return Ok(staged.clone());
        }
        self.track(key);
        Ok(self.store.memtable().get_at(key, self.read_ts).map(<[u8]>::to_vec))
    }

    fn stage(&self, key: &str, value: Option<Value>) -> Result<()> {
        if !self.writable {
            return Err(Error::ReadOnly);
        }
        self.ensure_open()?;
        self.pending.borrow_mut().insert(key.as_bytes().to_vec(), value);
        Ok(())
    }

    fn track(&self, key: &[u8]) {
        if self.writable {
            let mut reads = self.reads.borrow_mut();
            if !reads.contains(key) {
                reads.insert(key.to_vec());
            }
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.store.is_closed() {
            Err(Error::Closed)
        } else {
            Ok(())
        }
    }
}

impl Drop for Txn {
    fn drop(&mut self) {
        self.store.finish(self.read_ts);
    }
}
