//! Database handle: lifecycle, transactions, conflict retry and background
//! maintenance.

use std::collections::BTreeMap;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Sender, select};
use parking_lot::Mutex;
use rand::Rng;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::list::ListOptions;
use crate::store::Store;
use crate::txn::Txn;
use crate::types::Sequence;
use crate::wal::SyncPolicy;

/// Environment variable consulted when no directory is configured.
pub const DIR_ENV: &str = "DATABASE_DIR";

/// Directory used when neither the options nor the environment name one.
pub const DEFAULT_DIR: &str = "/tmp/db";

/// How `retry_on_conflict` re-runs a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts before giving up with `Conflict`. 0 retries forever.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 128,
            initial_backoff: Duration::from_micros(50),
            max_backoff: Duration::from_millis(10),
        }
    }
}

impl RetryPolicy {
    /// Retry forever without sleeping.
    pub fn unbounded() -> Self {
        RetryPolicy {
            max_attempts: 0,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Sleep before attempt `attempt + 1`: exponential, capped, with jitter
    /// in the upper half.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let base = self
            .initial_backoff
            .saturating_mul(1u32 << attempt.min(16))
            .min(self.max_backoff);
        if base.is_zero() {
            return base;
        }
        base.mul_f64(rand::thread_rng().gen_range(0.5..=1.0))
    }

    fn exhausted(&self, attempts: u32) -> bool {
        self.max_attempts != 0 && attempts >= self.max_attempts
    }
}

/// Configuration for `Db::open`.
#[derive(Debug, Clone)]
pub struct Options {
    /// Database directory. Falls back to `$DATABASE_DIR`, then `/tmp/db`.
    pub dir: Option<PathBuf>,
    /// Keep everything in memory; no directory is touched.
    pub in_memory: bool,
    /// Gzip values when that makes them smaller.
    pub compression: bool,
    pub sync_policy: SyncPolicy,
    /// Interval of the background reclaim. Zero disables it.
    pub maintenance_interval: Duration,
    /// Fraction of the WAL that must be obsolete before it is rewritten.
    pub discard_ratio: f64,
    pub retry: RetryPolicy,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            dir: None,
            in_memory: false,
            compression: true,
            sync_policy: SyncPolicy::EveryWrite,
            maintenance_interval: Duration::from_secs(5 * 60),
            discard_ratio: 0.7,
            retry: RetryPolicy::default(),
        }
    }
}

impl Options {
    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    pub fn with_in_memory(mut self, in_memory: bool) -> Self {
        self.in_memory = in_memory;
        self
    }

    pub fn with_compression(mut self, compression: bool) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_sync_policy(mut self, sync_policy: SyncPolicy) -> Self {
        self.sync_policy = sync_policy;
        self
    }

    pub fn with_maintenance_interval(mut self, interval: Duration) -> Self {
        self.maintenance_interval = interval;
        self
    }

    pub fn with_discard_ratio(mut self, discard_ratio: f64) -> Self {
        self.discard_ratio = discard_ratio;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Directory to open: explicit, else `$DATABASE_DIR`, else `/tmp/db`.
    pub fn resolve_dir(&self) -> PathBuf {
        if let Some(dir) = &self.dir {
            return dir.clone();
        }
        match std::env::var_os(DIR_ENV) {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => PathBuf::from(DEFAULT_DIR),
        }
    }
}

/// Snapshot of engine counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stats {
    /// Live keys.
    pub keys: usize,
    pub tombstones: usize,
    /// Superseded entries kept for open transactions.
    pub versions: usize,
    /// Key and value bytes of live entries.
    pub live_bytes: usize,
    pub last_sequence: Sequence,
    /// Successful commits since open.
    pub commits: u64,
    /// Commits rejected with `Conflict` since open.
    pub conflicts: u64,
    /// WAL rewrites since open.
    pub reclaims: u64,
    pub wal_files: usize,
    pub wal_bytes: u64,
    /// Live keys per namespace.
    pub namespaces: BTreeMap<String, usize>,
}

struct Maintenance {
    shutdown: Sender<()>,
    handle: JoinHandle<()>,
}

/// An open database.
///
/// ```
/// use recordkv::{Db, Options};
///
/// let db = Db::open(Options::default().with_in_memory(true))?;
/// db.update(|txn| txn.set("greeting", "hello"))?;
/// let value = db.view(|txn| txn.get("greeting"))?;
/// assert_eq!(value, b"hello");
/// db.close()?;
/// # Ok::<(), recordkv::Error>(())
/// ```
pub struct Db {
    /// `None` once closed. Shared with the maintenance thread so a tick and
    /// `close` never overlap.
    store: Arc<Mutex<Option<Arc<Store>>>>,
    options: Options,
    dir: Option<PathBuf>,
    maintenance: Mutex<Option<Maintenance>>,
}

impl Db {
    pub fn open(options: Options) -> Result<Self> {
        let (store, dir) = if options.in_memory {
            (Store::in_memory(), None)
        } else {
            let dir = options.resolve_dir();
            (Store::open(&dir, options.sync_policy)?, Some(dir))
        };
        let store = Arc::new(Mutex::new(Some(Arc::new(store))));

        let maintenance = if options.maintenance_interval.is_zero() {
            None
        } else {
            Some(spawn_maintenance(
                Arc::clone(&store),
                options.maintenance_interval,
                options.discard_ratio,
            )?)
        };

        info!(
            dir = ?dir,
            in_memory = options.in_memory,
            compression = options.compression,
            "database opened"
        );

        Ok(Db {
            store,
            options,
            dir,
            maintenance: Mutex::new(maintenance),
        })
    }

    /// Directory backing this database, `None` when in memory.
    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    fn store(&self) -> Result<Arc<Store>> {
        self.store.lock().clone().ok_or(Error::Closed)
    }

    /// Start a transaction. Read-only transactions reject writes.
    pub fn begin(&self, writable: bool) -> Result<Txn> {
        Ok(Txn::new(self.store()?, writable, self.options.compression))
    }

    /// Run `f` in a read-write transaction and commit it if `f` succeeds.
    pub fn update<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Txn) -> Result<T>,
    {
        let txn = self.begin(true)?;
        let out = f(&txn)?;
        txn.commit()?;
        Ok(out)
    }

    /// Run `f` in a read-only transaction.
    pub fn view<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Txn) -> Result<T>,
    {
        let txn = self.begin(false)?;
        f(&txn)
    }

    /// Like `update`, re-running `f` in a fresh transaction while the commit
    /// fails with `Conflict`, as the retry policy allows.
    pub fn retry_on_conflict<T, F>(&self, mut f: F) -> Result<T>
    where
        F: FnMut(&Txn) -> Result<T>,
    {
        let policy = self.options.retry;
        let mut attempts = 0u32;
        loop {
            match self.update(&mut f) {
                Err(Error::Conflict) => {
                    attempts += 1;
                    if policy.exhausted(attempts) {
                        warn!(attempts, "giving up after repeated conflicts");
                        return Err(Error::Conflict);
                    }
                    let backoff = policy.backoff(attempts - 1);
                    debug!(attempts, ?backoff, "conflict, retrying");
                    if !backoff.is_zero() {
                        thread::sleep(backoff);
                    }
                }
                other => return other,
            }
        }
    }

    /// List `prefix` in a read-only transaction.
    pub fn list<F>(&self, prefix: &str, opts: &ListOptions, visit: F) -> Result<()>
    where
        F: FnMut(&str, Option<&[u8]>) -> Result<ControlFlow<()>>,
    {
        self.view(|txn| txn.list(prefix, opts, visit))
    }

    /// Run a reclaim pass now. Returns whether the WAL was rewritten.
    pub fn reclaim(&self) -> Result<bool> {
        let guard = self.store.lock();
        let store = guard.as_ref().ok_or(Error::Closed)?;
        store.reclaim(self.options.discard_ratio)
    }

    pub fn stats(&self) -> Result<Stats> {
        Ok(self.store()?.stats())
    }

    pub fn is_closed(&self) -> bool {
        self.store.lock().is_none()
    }

    /// Stop maintenance, refuse new work and sync the WAL. Closing twice is a
    /// no-op. Transactions still open fail with `Closed`.
    pub fn close(&self) -> Result<()> {
        let store = self.store.lock().take();

        if let Some(maintenance) = self.maintenance.lock().take() {
            let _ = maintenance.shutdown.send(());
            if maintenance.handle.join().is_err() {
                warn!("maintenance thread panicked");
            }
        }

        if let Some(store) = store {
            store.close()?;
            info!(dir = ?self.dir, "database closed");
        }
        Ok(())
    }
}

impl Drop for Db {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "failed to close database");
        }
    }
}

fn spawn_maintenance(
    store: Arc<Mutex<Option<Arc<Store>>>>,
    interval: Duration,
    discard_ratio: f64,
) -> Result<Maintenance> {
    let (shutdown, stop) = crossbeam_channel::bounded::<()>(1);
    let ticker = crossbeam_channel::tick(interval);

    let handle = thread::Builder::new()
        .name("recordkv-maintenance".into())
        .spawn(move || {
            loop {
                let stop_now = select! {
                    recv(ticker) -> _ => !run_maintenance(&store, discard_ratio),
                    recv(stop) -> _ => true,
                };
                if stop_now {
                    break;
                }
            }
        })?;

    Ok(Maintenance { shutdown, handle })
}

/// One reclaim pass, holding the handle lock so `close` waits for it.
/// Returns false once the database is closed.
fn run_maintenance(store: &Mutex<Option<Arc<Store>>>, discard_ratio: f64) -> bool {
    let guard = store.lock();
    let Some(store) = guard.as_ref() else {
        return false;
    };
    match store.reclaim(discard_ratio) {
        Ok(rewritten) => debug!(rewritten, "maintenance pass"),
        Err(e) => warn!(error = %e, "maintenance pass failed"),
    }
    true
}
