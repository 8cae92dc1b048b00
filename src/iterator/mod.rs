pub mod merge;

use crate::error::Result;

pub use merge::TxnIterator;

/// The central iteration abstraction.
///
/// Every ordered source (the skip list, a transaction's merged view of its
/// pending writes over committed data) implements this trait, and the range
/// lister is written against it. Iterators are bidirectional because listing
/// can run in reverse.
pub trait StorageIterator {
    /// Returns the current key. Only valid when is_valid() is true.
    fn key(&self) -> &[u8];

    /// Returns the current value. Only valid when is_valid() is true.
    fn value(&self) -> &[u8];

    /// Returns true if the iterator is positioned at a valid entry.
    fn is_valid(&self) -> bool;

    /// Advances to the next entry. Returns error on IO failure.
    fn next(&mut self) -> Result<()>;

    /// Steps back to the previous entry.
    fn prev(&mut self) -> Result<()>;

    /// Positions the iterator at the first entry with key >= target.
    fn seek(&mut self, key: &[u8]) -> Result<()>;

    /// Positions the iterator at the last entry with key <= target.
    fn seek_for_prev(&mut self, key: &[u8]) -> Result<()>;

    /// Positions the iterator at the smallest key.
    fn seek_to_first(&mut self) -> Result<()>;

    /// Positions the iterator at the largest key.
    fn seek_to_last(&mut self) -> Result<()>;
}
