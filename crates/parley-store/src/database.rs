//! Database connection management.
//!
//! The [`Database`] struct owns a single [`rusqlite::Connection`] behind a
//! mutex and guarantees that migrations are run before any other operation.
//! It is `Send + Sync` and meant to be shared behind an `Arc` by every
//! worker (network receive, UI reads, background pollers).
//!
//! Note: SQLCipher (encrypted SQLite) requires OpenSSL at build time and is
//! only used with the `sqlcipher` feature.  With `sqlite-plain` the key is
//! accepted and ignored.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use directories::ProjectDirs;
use parley_shared::constants::DEFAULT_CHANGE_BUFFER;
use parley_shared::Address;
use rusqlite::Connection;
use tokio::sync::broadcast;

use crate::clock::{Clock, SystemClock};
use crate::error::{Result, StoreError};
use crate::migrations;
use crate::notify::{Notifier, ThreadChange};

/// Callback invoked once when a conversation row is first created.
pub type ThreadCreatedHook = Arc<dyn Fn(i64, &Address) + Send + Sync>;

/// Knobs that are not part of the on-disk state.
#[derive(Clone)]
pub struct StoreOptions {
    /// Capacity of the thread / recipient change channels.
    pub change_buffer: usize,
    pub clock: Arc<dyn Clock>,
    pub notifier: Option<Arc<dyn Notifier>>,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            change_buffer: DEFAULT_CHANGE_BUFFER,
            clock: Arc::new(SystemClock),
            notifier: None,
        }
    }
}

impl StoreOptions {
    pub fn with_change_buffer(mut self, capacity: usize) -> Self {
        self.change_buffer = capacity;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }
}

/// Shared handle to the message store.
pub struct Database {
    conn: Mutex<Connection>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) notifier: Option<Arc<dyn Notifier>>,
    pub(crate) thread_changes: broadcast::Sender<ThreadChange>,
    pub(crate) recipient_changes: broadcast::Sender<Address>,
    /// Serialises the check-then-insert in `get_or_create_thread_id`.
    pub(crate) thread_create_lock: Mutex<()>,
    pub(crate) thread_addresses: Mutex<HashMap<i64, Address>>,
    pub(crate) thread_created_hook: Mutex<Option<ThreadCreatedHook>>,
}

impl Database {
    /// Open (or create) the default application database.
    ///
    /// The database file is placed in the platform-appropriate data directory:
    /// - Linux:   `~/.local/share/parley/parley.db`
    /// - macOS:   `~/Library/Application Support/org.parley.parley/parley.db`
    /// - Windows: `{FOLDERID_RoamingAppData}\parley\parley\data\parley.db`
    pub fn new(db_key: &[u8; 32]) -> Result<Self> {
        let project_dirs =
            ProjectDirs::from("org", "parley", "parley").ok_or(StoreError::NoDataDir)?;

        Self::open_in_dir(project_dirs.data_dir(), db_key, StoreOptions::default())
    }

    /// Open (or create) `parley.db` inside `dir`, creating the directory.
    pub fn open_in_dir(dir: &Path, db_key: &[u8; 32], options: StoreOptions) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let db_path = dir.join("parley.db");

        tracing::info!(path = %db_path.display(), "opening database");

        Self::open_with(&db_path, db_key, options)
    }

    /// Open (or create) a database at an explicit path.
    pub fn open_at(path: &Path, db_key: &[u8; 32]) -> Result<Self> {
        Self::open_with(path, db_key, StoreOptions::default())
    }

    pub fn open_with(path: &Path, db_key: &[u8; 32], options: StoreOptions) -> Result<Self> {
        let conn = Connection::open(path)?;
        apply_key(&conn, db_key)?;

        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::from_connection(conn, options)
    }

    /// A throwaway in-memory database, mostly for tests.
    pub fn in_memory() -> Result<Self> {
        Self::in_memory_with(StoreOptions::default())
    }

    pub fn in_memory_with(options: StoreOptions) -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?, options)
    }

    fn from_connection(conn: Connection, options: StoreOptions) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::run_migrations(&conn)?;

        // broadcast::channel panics on a zero capacity.
        let capacity = options.change_buffer.max(1);
        let (thread_changes, _) = broadcast::channel(capacity);
        let (recipient_changes, _) = broadcast::channel(capacity);

        Ok(Self {
            conn: Mutex::new(conn),
            clock: options.clock,
            notifier: options.notifier,
            thread_changes,
            recipient_changes,
            thread_create_lock: Mutex::new(()),
            thread_addresses: Mutex::new(HashMap::new()),
            thread_created_hook: Mutex::new(None),
        })
    }

    /// Lock the underlying connection.
    ///
    /// Callers must not hold the guard across another call into `Database`.
    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        lock(&self.conn)
    }

    /// Current time according to the configured clock.
    pub fn now_millis(&self) -> i64 {
        self.clock.now_millis()
    }

    /// Return the filesystem path of the open database (if any).
    pub fn path(&self) -> Option<PathBuf> {
        self.conn()
            .path()
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
    }
}

#[cfg(feature = "sqlcipher")]
fn apply_key(conn: &Connection, db_key: &[u8; 32]) -> Result<()> {
    conn.execute_batch(&format!("PRAGMA key = \"x'{}'\";", hex::encode(db_key)))?;
    Ok(())
}

#[cfg(not(feature = "sqlcipher"))]
fn apply_key(_conn: &Connection, _db_key: &[u8; 32]) -> Result<()> {
    Ok(())
}

/// Lock a std mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
