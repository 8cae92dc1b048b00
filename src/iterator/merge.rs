use std::ops::Bound;

use crate::error::Result;
use crate::iterator::StorageIterator;
use crate::memtable::MemTable;
use crate::store::WriteBatch;
use crate::txn::Txn;
use crate::types::{Direction, Key, Sequence, Value};

/// Find the nearest visible entry from `start` in `direction`, merging a
/// transaction's staged writes over committed data.
///
/// Two sorted sources:
/// - `pending`: the transaction's own writes; they shadow committed data, and
///   a staged delete hides the committed key
/// - `memtable`: committed entries as of `read_ts`, where tombstones are
///   skipped
///
/// On equal keys the staged write wins. When the winner is invisible the
/// search resumes strictly past it. The returned value is empty when
/// `want_value` is false.
pub(crate) fn merge_seek(
    memtable: &MemTable,
    pending: &WriteBatch,
    start: Bound<&[u8]>,
    direction: Direction,
    read_ts: Sequence,
    want_value: bool,
) -> Option<(Key, Value)> {
    let mut cursor: Bound<Key> = match start {
        Bound::Included(k) => Bound::Included(k.to_vec()),
        Bound::Excluded(k) => Bound::Excluded(k.to_vec()),
        Bound::Unbounded => Bound::Unbounded,
    };

    loop {
        let bound = as_ref(&cursor);
        let committed = memtable.seek_at(bound, direction, read_ts);
        let staged = match direction {
            Direction::Forward => pending.range::<[u8], _>((bound, Bound::Unbounded)).next(),
            Direction::Reverse => pending.range::<[u8], _>((Bound::Unbounded, bound)).next_back(),
        };

        let (key, value) = match (committed, staged) {
            (None, None) => return None,
            (Some((ck, cv)), None) => (ck.to_vec(), cv.value.as_ref()),
            (None, Some((sk, sv))) => (sk.clone(), sv.as_ref()),
            (Some((ck, cv)), Some((sk, sv))) => {
                let staged_first = match direction {
                    Direction::Forward => sk.as_slice() <= ck,
                    Direction::Reverse => sk.as_slice() >= ck,
                };
                if staged_first {
                    (sk.clone(), sv.as_ref())
                } else {
                    (ck.to_vec(), cv.value.as_ref())
                }
            }
        };

        match value {
            Some(v) if want_value => return Some((key, v.clone())),
            Some(_) => return Some((key, Vec::new())),
            None => cursor = Bound::Excluded(key),
        }
    }
}

fn as_ref(bound: &Bound<Key>) -> Bound<&[u8]> {
    match bound {
        Bound::Included(k) => Bound::Included(k.as_slice()),
        Bound::Excluded(k) => Bound::Excluded(k.as_slice()),
        Bound::Unbounded => Bound::Unbounded,
    }
}

/// Bidirectional cursor over what a transaction sees: its staged writes
/// merged over committed data.
///
/// The cursor owns a copy of the current entry and holds no lock between
/// steps; each step re-seeks from the current key. Callers may therefore read
/// and write through the same transaction while iterating. Values are stored
/// bytes (possibly compressed).
pub struct TxnIterator<'t> {
    txn: &'t Txn,
    key_only: bool,
    current: Option<(Key, Value)>,
}

impl<'t> TxnIterator<'t> {
    pub(crate) fn new(txn: &'t Txn, key_only: bool) -> Self {
        TxnIterator {
            txn,
            key_only,
            current: None,
        }
    }

    fn position(&mut self, start: Bound<&[u8]>, direction: Direction) -> Result<()> {
        self.current = self.txn.locate(start, direction, !self.key_only)?;
        Ok(())
    }

    fn step(&mut self, direction: Direction) -> Result<()> {
        if let Some((key, _)) = self.current.take() {
            self.position(Bound::Excluded(&key), direction)?;
        }
        Ok(())
    }
}

impl StorageIterator for TxnIterator<'_> {
    fn key(&self) -> &[u8] {
        &self.current.as_ref().expect("iterator is not valid").0
    }

    fn value(&self) -> &[u8] {
        &self.current.as_ref().expect("iterator is not valid").1
    }

    fn is_valid(&self) -> bool {
        self.current.is_some()
    }

    fn next(&mut self) -> Result<()> {
        self.step(Direction::Forward)
    }

    fn prev(&mut self) -> Result<()> {
        self.step(Direction::Reverse)
    }

    fn seek(&mut self, key: &[u8]) -> Result<()> {
        self.position(Bound::Included(key), Direction::Forward)
    }

    fn seek_for_prev(&mut self, key: &[u8]) -> Result<()> {
        self.position(Bound::Included(key), Direction::Reverse)
    }

    fn seek_to_first(&mut self) -> Result<()> {
        self.position(Bound::Unbounded, Direction::Forward)
    }

    fn seek_to_last(&mut self) -> Result<()> {
        self.position(Bound::Unbounded, Direction::Reverse)
    }
}
