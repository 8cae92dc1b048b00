use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::error::Result;
use crate::types::Sequence;
use crate::wal::SyncPolicy;
use crate::wal::record::WALRecord;

/// Extension of WAL files inside the database directory.
pub const WAL_EXTENSION: &str = "wal";

/// Writes WAL records to a file on disk.
///
/// Two layers of buffering:
///   BufWriter.flush()  → Rust buffer → OS page cache
///   file.sync_all()    → OS page cache → physical disk
pub struct WALWriter {
    writer: BufWriter<File>,
    offset: u64,
    sync_policy: SyncPolicy,
    writes_since_sync: usize,
    last_sync: Instant,
}

impl WALWriter {
    /// Create a new WAL writer at the given path. Appends if the file exists.
    pub fn new(path: &Path, sync_policy: SyncPolicy) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let offset = file.metadata()?.len();

        Ok(WALWriter {
            writer: BufWriter::new(file),
            offset,
            sync_policy,
            writes_since_sync: 0,
            last_sync: Instant::now(),
        })
    }

    /// Append a record to the WAL.
    /// Depending on SyncPolicy, may fsync after this write.
    pub fn append(&mut self, record: &WALRecord) -> Result<()> {
        self.write_record(record)?;
        self.writer.flush()?;
        self.writes_since_sync += 1;
        self.maybe_sync()
    }

    /// Append one transaction: its records, then the Commit record.
    /// The sync policy sees the batch as a single write.
    pub fn append_batch<'a, I>(&mut self, records: I, sequence: Sequence) -> Result<()>
    where
        I: IntoIterator<Item = &'a WALRecord>,
    {
        for record in records {
            self.write_record(record)?;
        }
        self.append(&WALRecord::commit(sequence))
    }

    fn write_record(&mut self, record: &WALRecord) -> Result<()> {
        let encoded = record.encode();
        self.writer.write_all(&encoded)?;
        self.offset += encoded.len() as u64;
        Ok(())
    }

    fn maybe_sync(&mut self) -> Result<()> {
        let due = match self.sync_policy {
            SyncPolicy::EveryWrite => true,
            SyncPolicy::EveryNWrites(n) => self.writes_since_sync >= n,
            SyncPolicy::EveryNMillis(ms) => self.last_sync.elapsed().as_millis() >= u128::from(ms),
        };
        if due { self.sync() } else { Ok(()) }
    }

    /// Force fsync to disk. Ensures all buffered writes are durable.
    pub fn sync(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        self.writes_since_sync = 0;
        self.last_sync = Instant::now();
        Ok(())
    }

    /// Current file offset (bytes written so far).
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Writes appended since the last fsync.
    pub fn writes_since_sync(&self) -> usize {
        self.writes_since_sync
    }
}

/// Manages the WAL files of one database directory.
///
/// Files are named `{id:06}.wal` with increasing ids. Opening the manager
/// seals every file already present (they are replayed by the store) and
/// starts a fresh active file, unless the newest one is still empty, in which
/// case it becomes the active file again. Reclaim rotates to a new file, writes a
/// snapshot into it, and then deletes the sealed ones.
///
/// CRITICAL INVARIANT: sealed files are only deleted AFTER the snapshot that
/// replaces them is fsync'd. Violating this loses data.
pub struct WALManager {
    dir: PathBuf,
    sync_policy: SyncPolicy,
    active: WALWriter,
    active_id: u64,
    active_path: PathBuf,
    sealed: Vec<PathBuf>,
    sealed_bytes: u64,
}

impl WALManager {
    /// Create a WAL manager for the given directory, sealing existing files.
    /// An empty newest file is reused as the active one.
    pub fn new(dir: &Path, sync_policy: SyncPolicy) -> Result<Self> {
        fs::create_dir_all(dir)?;

        let mut existing = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if let Some(id) = wal_id(&path) {
                existing.push((id, path));
            }
        }
        existing.sort();

        let mut sealed_bytes = 0;
        let mut last_len = 0;
        for (_, path) in &existing {
            last_len = fs::metadata(path)?.len();
            sealed_bytes += last_len;
        }

        // An empty newest file is taken over rather than sealed.
        let reused = match existing.last() {
            Some(_) if last_len == 0 => existing.pop(),
            _ => None,
        };
        let (active_id, active_path) = match reused {
            Some(found) => found,
            None => {
                let id = existing.last().map_or(1, |(id, _)| id + 1);
                (id, wal_path(dir, id))
            }
        };
        let active = WALWriter::new(&active_path, sync_policy)?;

        Ok(WALManager {
            dir: dir.to_path_buf(),
            sync_policy,
            active,
            active_id,
            active_path,
            sealed: existing.into_iter().map(|(_, path)| path).collect(),
            sealed_bytes,
        })
    }

    /// Sealed files in replay order (oldest first).
    pub fn sealed_files(&self) -> &[PathBuf] {
        &self.sealed
    }

    /// Rotate: seal the current WAL, create a new one.
    /// Returns the path of the old WAL (caller deletes it once superseded).
    pub fn rotate(&mut self) -> Result<PathBuf> {
        self.active.sync()?;

        let next_id = self.active_id + 1;
        let next_path = wal_path(&self.dir, next_id);
        let next = WALWriter::new(&next_path, self.sync_policy)?;

        let old = std::mem::replace(&mut self.active, next);
        self.sealed_bytes += old.offset();
        drop(old);

        let old_path = std::mem::replace(&mut self.active_path, next_path);
        self.active_id = next_id;
        self.sealed.push(old_path.clone());
        Ok(old_path)
    }

    /// Delete every sealed file. Returns how many were removed.
    pub fn delete_sealed(&mut self) -> Result<usize> {
        let count = self.sealed.len();
        for path in self.sealed.drain(..) {
            Self::delete_wal(&path)?;
        }
        self.sealed_bytes = 0;
        Ok(count)
    }

    /// Delete an old WAL file (safe only after its contents are superseded).
    pub fn delete_wal(path: &Path) -> Result<()> {
        fs::remove_file(path)?;
        Ok(())
    }

    /// Writer of the active file.
    pub fn active_writer(&mut self) -> &mut WALWriter {
        &mut self.active
    }

    pub fn active_path(&self) -> &Path {
        &self.active_path
    }

    /// Bytes across all WAL files, sealed and active.
    pub fn total_bytes(&self) -> u64 {
        self.sealed_bytes + self.active.offset()
    }

    /// Number of WAL files on disk, active included.
    pub fn file_count(&self) -> usize {
        self.sealed.len() + 1
    }
}

fn wal_path(dir: &Path, id: u64) -> PathBuf {
    dir.join(format!("{:06}.{}", id, WAL_EXTENSION))
}

fn wal_id(path: &Path) -> Option<u64> {
    if path.extension()? != WAL_EXTENSION {
        return None;
    }
    path.file_stem()?.to_str()?.parse().ok()
}
