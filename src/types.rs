/// Raw key bytes.
pub type Key = Vec<u8>;

/// Raw value bytes.
pub type Value = Vec<u8>;

/// Commit sequence number. Every committed transaction gets the next one,
/// so the sequence of an entry tells which commit wrote it last.
pub type Sequence = u64;

/// A committed entry in the memtable: either a value or a tombstone,
/// stamped with the sequence of the commit that wrote it.
///
/// A delete writes a tombstone instead of removing the node. The tombstone
/// keeps the sequence alive so that a transaction which read the key before
/// the delete still sees a conflict at commit time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned {
    pub sequence: Sequence,
    pub value: Option<Value>,
}

impl Versioned {
    /// A live value written at `sequence`.
    pub fn put(sequence: Sequence, value: Value) -> Self {
        Versioned {
            sequence,
            value: Some(value),
        }
    }

    /// A tombstone written at `sequence`.
    pub fn tombstone(sequence: Sequence) -> Self {
        Versioned {
            sequence,
            value: None,
        }
    }

    pub fn is_tombstone(&self) -> bool {
        self.value.is_none()
    }

    /// Approximate bytes this entry occupies, excluding the key.
    pub fn charge(&self) -> usize {
        std::mem::size_of::<Sequence>() + self.value.as_ref().map_or(0, Vec::len)
    }
}

/// Iteration direction over the ordered key space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Reverse,
}

/// Routing namespace of a key: the part before the first `:`.
///
/// Keys without a namespace (empty prefix) land in `"default"`.
pub fn namespace(key: &str) -> &str {
    match key.split_once(':') {
        Some(("", _)) => "default",
        Some((ns, _)) => ns,
        None if key.is_empty() => "default",
        None => key,
    }
}
