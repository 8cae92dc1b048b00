pub mod reader;
pub mod record;
pub mod writer;

pub use record::{RecordType, WALRecord};

/// Controls when the WAL is fsync'd to disk.
///
/// Trade-off: durability vs throughput. Policies count commits, not
/// individual records: a transaction batch is synced as a unit.
///   - EveryWrite: zero data loss, slowest (each fsync waits for disk)
///   - EveryNWrites: batched durability, lose up to N commits on crash
///   - EveryNMillis: bounded loss window, much higher throughput
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPolicy {
    /// fsync after every commit. Safest, slowest.
    EveryWrite,
    /// fsync every N commits.
    EveryNWrites(usize),
    /// fsync when at least N milliseconds passed since the last sync.
    EveryNMillis(u64),
}

impl Default for SyncPolicy {
    fn default() -> Self {
        SyncPolicy::EveryWrite
    }
}
