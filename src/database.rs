use std::{
    collections::BTreeMap,
    path::Path,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

use tracing::{debug, warn};

use crate::{
    executor::{
        query::{Mutation, Params, Query, RunResult},
        scan::Cursor,
    },
    storage::{
        page_cache::{DEFAULT_CACHE_PAGES, PageCache},
        page_store::PageStore,
        schema::{self, TableInfo},
        wal::{Wal, wal_path_for},
    },
    txn::{Transaction, TxnMode, TxnShared},
    types::{
        SeqNo,
        error::{DatabaseError, Result},
        row::Row,
    },
    utils::lock,
};

/// How to mount the database. `":memory:"` as the path also selects an
/// in-memory database, mirroring the wrapper this engine replaces.
#[derive(Debug, Clone)]
pub struct OpenOptions {
    pub read_only: bool,
    pub create_if_missing: bool,
    pub in_memory: bool,
    pub cache_pages: usize,
    pub double_write: bool,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            read_only: false,
            create_if_missing: true,
            in_memory: false,
            cache_pages: DEFAULT_CACHE_PAGES,
            double_write: false,
        }
    }
}

/// Everything a transaction borrows: the store and WAL behind their own
/// mutexes, the versioned cache, transaction admission state, and the
/// committed catalog.
#[derive(Debug)]
pub(crate) struct DatabaseInner {
    pub(crate) store: Mutex<PageStore>,
    pub(crate) wal: Mutex<Wal>,
    pub(crate) cache: PageCache,
    pub(crate) txn_state: Mutex<TxnShared>,
    pub(crate) catalog: Mutex<BTreeMap<String, TableInfo>>,
    pub(crate) read_only: bool,
    closed: AtomicBool,
}

impl DatabaseInner {
    pub(crate) fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DatabaseError::DatabaseClosed);
        }
        Ok(())
    }

    /// Flush dirty committed pages to the store, fsync, truncate the WAL.
    pub(crate) fn checkpoint(&self) -> Result<()> {
        self.cache.flush_dirty(&self.store)?;
        lock(&self.store)?.sync()?;
        lock(&self.wal)?.reset()
    }
}

#[derive(Debug)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

impl Database {
    /// Mount or create the page file, replay the WAL, and load the
    /// catalog.
    pub fn open<P: AsRef<Path>>(path: P, options: OpenOptions) -> Result<Self> {
        let path = path.as_ref();
        if options.in_memory || path.as_os_str() == ":memory:" {
            return Self::open_memory_with(options);
        }

        let exists = path.exists();
        let (store, wal, committed_seq) = if !exists {
            if options.read_only || !options.create_if_missing {
                return Err(DatabaseError::NotFound {
                    what: format!("database file {}", path.display()),
                });
            }
            let store = PageStore::create(path, options.double_write)?;
            let wal = Wal::open(path)?;
            (store, wal, 0)
        } else if options.read_only {
            let store = PageStore::open(path, true, false)?;
            let wal_path = wal_path_for(path);
            let wal_len = std::fs::metadata(&wal_path).map(|m| m.len()).unwrap_or(0);
            if wal_len > 0 {
                warn!(path = %wal_path.display(), "read-only open is ignoring a non-empty WAL");
            }
            (store, Wal::in_memory(), 0)
        } else {
            let mut store = PageStore::open(path, false, options.double_write)?;
            let mut wal = Wal::open(path)?;
            let (replayed, seq) = wal.recover(&mut store)?;
            if !replayed.is_empty() {
                debug!(
                    pages = replayed.len(),
                    seq, "recovered committed WAL frames at open"
                );
            }
            (store, wal, seq)
        };

        Self::build(store, wal, committed_seq, options)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::open_memory_with(OpenOptions {
            in_memory: true,
            ..OpenOptions::default()
        })
    }

    fn open_memory_with(options: OpenOptions) -> Result<Self> {
        let store = PageStore::in_memory()?;
        Self::build(store, Wal::in_memory(), 0, options)
    }

    fn build(
        mut store: PageStore,
        wal: Wal,
        committed_seq: SeqNo,
        options: OpenOptions,
    ) -> Result<Self> {
        let catalog = schema::load_catalog(&mut store)?;
        let cache = PageCache::new(options.cache_pages);
        cache.set_snapshot_floor(committed_seq);
        Ok(Self {
            inner: Arc::new(DatabaseInner {
                store: Mutex::new(store),
                wal: Mutex::new(wal),
                cache,
                txn_state: Mutex::new(TxnShared::new(committed_seq)),
                catalog: Mutex::new(catalog),
                read_only: options.read_only,
                closed: AtomicBool::new(false),
            }),
        })
    }

    pub fn begin(&self, mode: TxnMode) -> Result<Transaction> {
        Transaction::begin(self.inner.clone(), mode)
    }

    /// First matching row, or `None`. A scan driven one step.
    pub fn get(&self, query: &Query) -> Result<Option<Row>> {
        let txn = self.begin(TxnMode::ReadOnly)?;
        txn.get(query)
    }

    /// Every matching row, eagerly materialized in scan order.
    pub fn all(&self, query: &Query) -> Result<Vec<Row>> {
        let txn = self.begin(TxnMode::ReadOnly)?;
        txn.all(query)
    }

    /// Lazy row-at-a-time cursor over the same rows and order as `all`.
    /// The cursor owns its read transaction; dropping it ends the
    /// transaction.
    pub fn each(&self, query: &Query) -> Result<Cursor> {
        let txn = self.begin(TxnMode::ReadOnly)?;
        Cursor::with_owned_txn(txn, query)
    }

    /// Execute a mutation in its own write transaction, committing on
    /// success. A failure aborts; no partial effects remain visible.
    pub fn run(&self, mutation: &Mutation, params: &Params) -> Result<RunResult> {
        let mut txn = self.begin(TxnMode::ReadWrite)?;
        let result = txn.run(mutation, params)?;
        txn.commit()?;
        Ok(result)
    }

    /// Checkpoint, flush, release. Idempotent.
    pub fn close(&self) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if !self.inner.read_only {
            self.inner.checkpoint()?;
        }
        debug!("database closed");
        Ok(())
    }

    pub fn tables(&self) -> Result<Vec<String>> {
        Ok(lock(&self.inner.catalog)?.keys().cloned().collect())
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
