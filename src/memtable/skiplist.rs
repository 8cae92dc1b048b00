use std::ops::Bound;

use rand::Rng;

use crate::error::Result;
use crate::iterator::StorageIterator;
use crate::types::Versioned;

/// Maximum height of the skip list. LevelDB uses 12.
pub const MAX_HEIGHT: usize = 12;

/// Arena index of the head sentinel.
const HEAD: usize = 0;

/// A single node in the skip list.
///
/// Each node has `height` forward pointers. Level 0 contains all nodes
/// (a regular linked list). Higher levels skip over nodes, enabling
/// O(log n) average-case search.
///
/// ```text
/// Level 3:  HEAD ──────────────────────────────► 50 ──────────► NIL
/// Level 2:  HEAD ──────────► 20 ────────────────► 50 ──────────► NIL
/// Level 1:  HEAD ──► 10 ──► 20 ────► 35 ────────► 50 ──► 60 ──► NIL
/// Level 0:  HEAD ──► 10 ──► 20 ──► 25 ──► 35 ──► 50 ──► 60 ──► 70 ► NIL
/// ```
struct SkipNode {
    key: Vec<u8>,
    entry: Versioned,
    forward: Vec<Option<usize>>, // indices into SkipList.nodes
}

/// A probabilistic sorted map from key bytes to versioned entries.
///
/// Nodes live in an arena (`Vec<SkipNode>`) and link to each other by index,
/// so there is no unsafe code and iteration stays cache friendly. Nodes are
/// never unlinked; a delete is a tombstone entry, and `retain` rebuilds the
/// arena when tombstones need to go.
///
/// Only forward pointers exist. Stepping backwards is a fresh descent for the
/// greatest key below the current one, still O(log n).
pub struct SkipList {
    nodes: Vec<SkipNode>,
    height: usize,
    len: usize,
    size_bytes: usize,
}

impl SkipList {
    /// Create a new empty skip list.
    pub fn new() -> Self {
        let head = SkipNode {
            key: Vec::new(),
            entry: Versioned::tombstone(0),
            forward: vec![None; MAX_HEIGHT],
        };
        SkipList {
            nodes: vec![head],
            height: 1,
            len: 0,
            size_bytes: 0,
        }
    }

    /// Insert an entry. Overwrites if the key already exists and returns the
    /// previous entry.
    ///
    /// Algorithm:
    ///   1. Find the insertion point at each level (track predecessors)
    ///   2. Generate a random height for the new node (1/4 per level)
    ///   3. Create node with that height
    ///   4. Splice into the list at each level up to the node's height
    pub fn insert(&mut self, key: Vec<u8>, entry: Versioned) -> Option<Versioned> {
        let mut prev = [HEAD; MAX_HEIGHT];
        let found = self.find_greater_or_equal(&key, Some(&mut prev));

        if let Some(idx) = found {
            if self.nodes[idx].key == key {
                // Arena memory is append-only, so accounting only grows.
                self.size_bytes += entry.charge();
                return Some(std::mem::replace(&mut self.nodes[idx].entry, entry));
            }
        }

        let height = self.random_height();
        if height > self.height {
            for slot in prev.iter_mut().take(height).skip(self.height) {
                *slot = HEAD;
            }
            self.height = height;
        }

        let idx = self.nodes.len();
        let forward = (0..height)
            .map(|level| self.nodes[prev[level]].forward[level])
            .collect();

        self.size_bytes += key.len() + entry.charge();
        self.nodes.push(SkipNode {
            key,
            entry,
            forward,
        });
        for (level, &p) in prev.iter().enumerate().take(height) {
            self.nodes[p].forward[level] = Some(idx);
        }
        self.len += 1;
        None
    }

    /// Look up a key. Returns the entry if found (tombstones included).
    pub fn get(&self, key: &[u8]) -> Option<&Versioned> {
        self.find_greater_or_equal(key, None)
            .filter(|&idx| self.nodes[idx].key == key)
            .map(|idx| &self.nodes[idx].entry)
    }

    /// Number of entries in the skip list (tombstones included).
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the skip list is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Approximate memory usage in bytes. Never decreases.
    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    /// First entry at or after (`Included`) or strictly after (`Excluded`)
    /// the bound. `Unbounded` yields the first entry.
    pub fn ceiling(&self, bound: Bound<&[u8]>) -> Option<(&[u8], &Versioned)> {
        let idx = match bound {
            Bound::Unbounded => self.nodes[HEAD].forward[0],
            Bound::Included(key) => self.find_greater_or_equal(key, None),
            Bound::Excluded(key) => match self.find_greater_or_equal(key, None) {
                Some(idx) if self.nodes[idx].key == key => self.nodes[idx].forward[0],
                other => other,
            },
        };
        idx.map(|idx| self.node(idx))
    }

    /// Last entry at or before (`Included`) or strictly before (`Excluded`)
    /// the bound. `Unbounded` yields the last entry.
    pub fn floor(&self, bound: Bound<&[u8]>) -> Option<(&[u8], &Versioned)> {
        let idx = match bound {
            Bound::Unbounded => self.find_last(),
            Bound::Included(key) => match self.find_greater_or_equal(key, None) {
                Some(idx) if self.nodes[idx].key == key => Some(idx),
                _ => self.find_less_than(key),
            },
            Bound::Excluded(key) => self.find_less_than(key),
        };
        idx.map(|idx| self.node(idx))
    }

    /// Keep only the entries for which `keep` returns true. Rebuilds the arena.
    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(&[u8], &Versioned) -> bool,
    {
        let old = std::mem::replace(self, SkipList::new());
        let mut cursor = old.nodes[HEAD].forward[0];
        let mut nodes = old.nodes;
        while let Some(idx) = cursor {
            cursor = nodes[idx].forward[0];
            let node = &mut nodes[idx];
            if keep(&node.key, &node.entry) {
                let key = std::mem::take(&mut node.key);
                let entry = std::mem::replace(&mut node.entry, Versioned::tombstone(0));
                self.insert(key, entry);
            }
        }
    }

    /// Create an iterator over all entries in sorted order, positioned at
    /// the first entry.
    pub fn iter(&self) -> SkipListIterator<'_> {
        SkipListIterator {
            list: self,
            current: self.nodes[HEAD].forward[0],
        }
    }

    fn node(&self, idx: usize) -> (&[u8], &Versioned) {
        let node = &self.nodes[idx];
        (&node.key, &node.entry)
    }

    /// Descend from the top level to the first node with key >= target,
    /// optionally recording the last node visited on each level.
    fn find_greater_or_equal(
        &self,
        key: &[u8],
        mut prev: Option<&mut [usize; MAX_HEIGHT]>,
    ) -> Option<usize> {
        let mut x = HEAD;
        let mut level = self.height - 1;
        loop {
            let next = self.nodes[x].forward[level];
            match next {
                Some(n) if self.nodes[n].key.as_slice() < key => x = n,
                _ => {
                    if let Some(prev) = prev.as_deref_mut() {
                        prev[level] = x;
                    }
                    if level == 0 {
                        return next;
                    }
                    level -= 1;
                }
            }
        }
    }

    /// Last node with key < target, if any.
    fn find_less_than(&self, key: &[u8]) -> Option<usize> {
        let mut x = HEAD;
        let mut level = self.height - 1;
        loop {
            match self.nodes[x].forward[level] {
                Some(n) if self.nodes[n].key.as_slice() < key => x = n,
                _ if level == 0 => return (x != HEAD).then_some(x),
                _ => level -= 1,
            }
        }
    }

    fn find_last(&self) -> Option<usize> {
        let mut x = HEAD;
        let mut level = self.height - 1;
        loop {
            match self.nodes[x].forward[level] {
                Some(n) => x = n,
                None if level == 0 => return (x != HEAD).then_some(x),
                None => level -= 1,
            }
        }
    }

    /// Generate a random level for a new node.
    /// Each level has a 1/4 probability (LevelDB uses 1/4, not 1/2).
    fn random_height(&self) -> usize {
        let mut rng = rand::thread_rng();
        let mut height = 1;
        while height < MAX_HEIGHT && rng.gen_ratio(1, 4) {
            height += 1;
        }
        height
    }
}

impl Default for SkipList {
    fn default() -> Self {
        SkipList::new()
    }
}

/// Iterator over skip list entries in sorted order, tombstones included.
///
/// Forward steps follow level 0 pointers. Backward steps and `seek_for_prev`
/// re-descend from the top, because nodes carry no back pointers.
pub struct SkipListIterator<'a> {
    list: &'a SkipList,
    current: Option<usize>,
}

impl<'a> SkipListIterator<'a> {
    /// The full entry under the cursor, including its sequence.
    pub fn entry(&self) -> &'a Versioned {
        let idx = self.current.expect("iterator is not valid");
        &self.list.nodes[idx].entry
    }

    fn current_key(&self) -> &'a [u8] {
        let idx = self.current.expect("iterator is not valid");
        &self.list.nodes[idx].key
    }
}

impl StorageIterator for SkipListIterator<'_> {
    fn key(&self) -> &[u8] {
        self.current_key()
    }

    /// Tombstones read as an empty value; use `entry()` to tell them apart.
    fn value(&self) -> &[u8] {
        self.entry().value.as_deref().unwrap_or_default()
    }

    fn is_valid(&self) -> bool {
        self.current.is_some()
    }

    fn next(&mut self) -> Result<()> {
        if let Some(idx) = self.current {
            self.current = self.list.nodes[idx].forward[0];
        }
        Ok(())
    }

    fn prev(&mut self) -> Result<()> {
        if self.current.is_some() {
            self.current = self.list.find_less_than(self.current_key());
        }
        Ok(())
    }

    fn seek(&mut self, key: &[u8]) -> Result<()> {
        self.current = self.list.find_greater_or_equal(key, None);
        Ok(())
    }

    fn seek_for_prev(&mut self, key: &[u8]) -> Result<()> {
        self.current = match self.list.find_greater_or_equal(key, None) {
            Some(idx) if self.list.nodes[idx].key == key => Some(idx),
            _ => self.list.find_less_than(key),
        };
        Ok(())
    }

    fn seek_to_first(&mut self) -> Result<()> {
        self.current = self.list.nodes[HEAD].forward[0];
        Ok(())
    }

    fn seek_to_last(&mut self) -> Result<()> {
        self.current = self.list.find_last();
        Ok(())
    }
}
