pub mod skiplist;

use std::collections::BTreeMap;
use std::ops::Bound;

use skiplist::{SkipList, SkipListIterator};

use crate::types::{Direction, Sequence, Value, Versioned};

/// In-memory sorted table holding every committed key.
///
/// All committed state lives here; the WAL only exists to rebuild it after
/// a restart. Each entry is stamped with the sequence of the commit that last
/// wrote it, which is what commit-time conflict validation compares against.
///
/// Deletes are tombstones, not removals: a reader that saw the key before the
/// delete must still be able to notice the newer sequence. Tombstones are
/// dropped by `purge_tombstones` once no open transaction can care.
///
/// The skip list holds the newest entry of every key. Entries it replaced are
/// moved to `history` (see `preserve`) while some open transaction may still
/// read below the new sequence; `*_at` lookups resolve a key as of a read
/// timestamp from both.
pub struct MemTable {
    data: SkipList,
    /// Superseded entries per key, oldest first.
    history: BTreeMap<Vec<u8>, Vec<Versioned>>,
    last_sequence: Sequence,
    live_len: usize,
    live_bytes: usize,
    tombstones: usize,
}

impl MemTable {
    /// Create a new empty memtable.
    pub fn new() -> Self {
        MemTable {
            data: SkipList::new(),
            history: BTreeMap::new(),
            last_sequence: 0,
            live_len: 0,
            live_bytes: 0,
            tombstones: 0,
        }
    }

    /// Insert or update a key-value pair written by commit `sequence`.
    pub fn put(&mut self, key: Vec<u8>, value: Value, sequence: Sequence) {
        self.apply(key, Versioned::put(sequence, value));
    }

    /// Mark a key as deleted by commit `sequence`.
    pub fn delete(&mut self, key: Vec<u8>, sequence: Sequence) {
        self.apply(key, Versioned::tombstone(sequence));
    }

    fn apply(&mut self, key: Vec<u8>, entry: Versioned) {
        let key_len = key.len();
        let sequence = entry.sequence;
        let (new_live, new_bytes) = match &entry.value {
            Some(v) => (true, key_len + v.len()),
            None => (false, 0),
        };

        match self.data.insert(key, entry) {
            Some(old) => match &old.value {
                Some(v) => {
                    self.live_bytes -= key_len + v.len();
                    if !new_live {
                        self.live_len -= 1;
                        self.tombstones += 1;
                    }
                }
                None => {
                    if new_live {
                        self.tombstones -= 1;
                        self.live_len += 1;
                    }
                }
            },
            None if new_live => self.live_len += 1,
            None => self.tombstones += 1,
        }
        self.live_bytes += new_bytes;
        self.last_sequence = self.last_sequence.max(sequence);
    }

    /// Look up a key. Returns None if not found OR if tombstoned.
    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        self.data.get(key).and_then(|entry| entry.value.as_deref())
    }

    /// Value of `key` as of `read_ts`: the newest entry written at or before
    /// it. None if that entry is a tombstone or the key did not exist yet.
    pub fn get_at(&self, key: &[u8], read_ts: Sequence) -> Option<&[u8]> {
        let latest = self.data.get(key)?;
        self.resolve(key, latest, read_ts)
            .and_then(|entry| entry.value.as_deref())
    }

    /// Like `seek`, but every key is resolved as of `read_ts`. Keys created
    /// after `read_ts` are passed over; a key deleted at or before it comes
    /// back as its tombstone.
    pub fn seek_at(
        &self,
        bound: Bound<&[u8]>,
        direction: Direction,
        read_ts: Sequence,
    ) -> Option<(&[u8], &Versioned)> {
        let mut found = self.seek(bound, direction)?;
        loop {
            let (key, latest) = found;
            if let Some(entry) = self.resolve(key, latest, read_ts) {
                return Some((key, entry));
            }
            found = self.seek(Bound::Excluded(key), direction)?;
        }
    }

    fn resolve<'a>(&'a self, key: &[u8], latest: &'a Versioned, read_ts: Sequence) -> Option<&'a Versioned> {
        if latest.sequence <= read_ts {
            return Some(latest);
        }
        self.history
            .get(key)?
            .iter()
            .rev()
            .find(|entry| entry.sequence <= read_ts)
    }

    /// Keep the current entry of `key` readable for transactions that began
    /// before the next write to it.
    pub fn preserve(&mut self, key: &[u8]) {
        if let Some(entry) = self.data.get(key) {
            let entry = entry.clone();
            self.history.entry(key.to_vec()).or_default().push(entry);
        }
    }

    /// Number of superseded entries still held.
    pub fn versions(&self) -> usize {
        self.history.values().map(Vec::len).sum()
    }

    /// Drop superseded entries no transaction at or above `watermark` can
    /// read. Returns how many were dropped.
    pub fn prune_history(&mut self, watermark: Sequence) -> usize {
        let before = self.versions();
        let data = &self.data;
        self.history.retain(|key, versions| {
            let latest_visible = data.get(key).is_none_or(|latest| latest.sequence <= watermark);
            if latest_visible {
                return false;
            }
            // Everything older than the newest entry at or below the
            // watermark is unreachable.
            if let Some(keep_from) = versions.iter().rposition(|entry| entry.sequence <= watermark) {
                versions.drain(..keep_from);
            }
            !versions.is_empty()
        });
        before - self.versions()
    }

    /// Drop every superseded entry.
    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// Sequence of the last commit that touched `key`, tombstones included.
    /// Zero if the key was never written (or its tombstone was purged).
    pub fn sequence_of(&self, key: &[u8]) -> Sequence {
        self.data.get(key).map_or(0, |entry| entry.sequence)
    }

    /// Nearest entry from `bound` in the given direction, tombstones included.
    pub fn seek(&self, bound: Bound<&[u8]>, direction: Direction) -> Option<(&[u8], &Versioned)> {
        match direction {
            Direction::Forward => self.data.ceiling(bound),
            Direction::Reverse => self.data.floor(bound),
        }
    }

    /// Return a sorted iterator over all entries (including tombstones).
    pub fn iter(&self) -> SkipListIterator<'_> {
        self.data.iter()
    }

    /// Highest commit sequence applied so far.
    pub fn last_sequence(&self) -> Sequence {
        self.last_sequence
    }

    /// Raise the sequence floor, e.g. after replaying a snapshot batch.
    pub fn set_last_sequence(&mut self, sequence: Sequence) {
        self.last_sequence = self.last_sequence.max(sequence);
    }

    /// Number of live (non-tombstoned) keys.
    pub fn live_len(&self) -> usize {
        self.live_len
    }

    /// Key and value bytes of live entries.
    pub fn live_bytes(&self) -> usize {
        self.live_bytes
    }

    /// Number of tombstones still held.
    pub fn tombstones(&self) -> usize {
        self.tombstones
    }

    /// Drop tombstones written at or below `watermark`. Returns how many
    /// were dropped.
    pub fn purge_tombstones(&mut self, watermark: Sequence) -> usize {
        if self.tombstones == 0 {
            return 0;
        }
        let before = self.tombstones;
        self.data
            .retain(|_, entry| !(entry.is_tombstone() && entry.sequence <= watermark));
        self.tombstones = self.data.len() - self.live_len;
        before - self.tombstones
    }
}

impl Default for MemTable {
    fn default() -> Self {
        MemTable::new()
    }
}
