use std::{
    collections::BTreeMap,
    sync::{Arc, Weak},
};

use tracing::debug;

use crate::{
    database::DatabaseInner,
    executor::{
        heap,
        query::{Mutation, Params, Query, RunResult},
        scan::{Cursor, CursorStep, PageView},
    },
    storage::schema::TableInfo,
    types::{
        PageId, SeqNo,
        error::{DatabaseError, Result},
        page::{Page, PageType},
        row::Row,
    },
    utils::lock,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnMode {
    ReadOnly,
    ReadWrite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnState {
    Active,
    Committing,
    Committed,
    Aborting,
    Aborted,
}

/// Shared transaction bookkeeping owned by the database: the committed
/// sequence number, writer admission, and the snapshots of live readers.
#[derive(Debug)]
pub(crate) struct TxnShared {
    pub committed_seq: SeqNo,
    pub writer_active: bool,
    pub reader_snapshots: Vec<SeqNo>,
}

impl TxnShared {
    pub fn new(committed_seq: SeqNo) -> Self {
        Self {
            committed_seq,
            writer_active: false,
            reader_snapshots: Vec::new(),
        }
    }

    /// Oldest snapshot any live reader still needs.
    pub fn floor(&self) -> SeqNo {
        self.reader_snapshots
            .iter()
            .copied()
            .min()
            .unwrap_or(self.committed_seq)
    }
}

/// A transaction borrows the database's cache, WAL, and store through the
/// shared handle; it never owns them. At most one write transaction is
/// active at a time; readers see the snapshot taken at begin.
#[derive(Debug)]
pub struct Transaction {
    db: Arc<DatabaseInner>,
    mode: TxnMode,
    state: TxnState,
    snapshot: SeqNo,
    write_seq: SeqNo,
    staged_catalog: Option<BTreeMap<String, TableInfo>>,
    freed_pages: Vec<PageId>,
    token: Arc<()>,
}

impl Transaction {
    pub(crate) fn begin(db: Arc<DatabaseInner>, mode: TxnMode) -> Result<Self> {
        db.check_open()?;

        let mut shared = lock(&db.txn_state)?;
        let (snapshot, write_seq) = match mode {
            TxnMode::ReadOnly => {
                let snapshot = shared.committed_seq;
                shared.reader_snapshots.push(snapshot);
                (snapshot, 0)
            }
            TxnMode::ReadWrite => {
                if db.read_only {
                    return Err(DatabaseError::ReadOnly);
                }
                if shared.writer_active {
                    return Err(DatabaseError::WriterActive);
                }
                shared.writer_active = true;
                (shared.committed_seq, shared.committed_seq + 1)
            }
        };
        db.cache.set_snapshot_floor(shared.floor());
        drop(shared);

        Ok(Self {
            db,
            mode,
            state: TxnState::Active,
            snapshot,
            write_seq,
            staged_catalog: None,
            freed_pages: Vec::new(),
            token: Arc::new(()),
        })
    }

    pub fn mode(&self) -> TxnMode {
        self.mode
    }

    pub fn state(&self) -> TxnState {
        self.state
    }

    pub(crate) fn is_writer(&self) -> bool {
        self.mode == TxnMode::ReadWrite
    }

    pub(crate) fn token_weak(&self) -> Weak<()> {
        Arc::downgrade(&self.token)
    }

    pub(crate) fn view(&self) -> PageView {
        PageView::new(self.db.clone(), self.snapshot, self.is_writer())
    }

    fn check_active(&self) -> Result<()> {
        if self.state != TxnState::Active {
            return Err(DatabaseError::TransactionClosed);
        }
        Ok(())
    }

    pub(crate) fn fetch_page(&self, page_id: PageId) -> Result<Arc<Page>> {
        self.check_active()?;
        self.db
            .cache
            .fetch(page_id, self.snapshot, self.is_writer(), &self.db.store)
    }

    /// Mutate one page through the cache: clone out the latest version,
    /// apply `f`, and install the result as this transaction's
    /// uncommitted copy.
    pub(crate) fn update_page<F>(&mut self, page_id: PageId, f: F) -> Result<()>
    where
        F: FnOnce(&mut Page) -> Result<()>,
    {
        self.check_active()?;
        if !self.is_writer() {
            return Err(DatabaseError::ReadOnly);
        }
        let mut page = self.db.cache.fetch_mutable(page_id, &self.db.store)?;
        f(&mut page)?;
        self.db.cache.install(page_id, page)
    }

    /// Allocate a fresh page and register it with this transaction.
    pub(crate) fn alloc_page(&mut self, page_type: PageType) -> Result<PageId> {
        self.check_active()?;
        if !self.is_writer() {
            return Err(DatabaseError::ReadOnly);
        }
        let page_id = {
            let mut store = lock(&self.db.store)?;
            store.allocate_page()?
        };
        let page = Page::new(page_id, page_type);
        self.db.cache.install(page_id, page)?;
        Ok(page_id)
    }

    /// Queue a page for the free list. Applied after a successful commit;
    /// a crash beforehand only leaks the page, it never corrupts the list.
    pub(crate) fn free_page_deferred(&mut self, page_id: PageId) {
        self.freed_pages.push(page_id);
    }

    pub(crate) fn table_info(&self, name: &str) -> Result<TableInfo> {
        if let Some(staged) = &self.staged_catalog {
            return staged
                .get(name)
                .cloned()
                .ok_or_else(|| DatabaseError::TableNotFound {
                    name: name.to_string(),
                });
        }
        let catalog = lock(&self.db.catalog)?;
        catalog
            .get(name)
            .cloned()
            .ok_or_else(|| DatabaseError::TableNotFound {
                name: name.to_string(),
            })
    }

    /// Writable view of the catalog, initialized lazily from the shared
    /// committed copy. Published at commit, discarded on abort.
    pub(crate) fn stage_catalog(&mut self) -> Result<&mut BTreeMap<String, TableInfo>> {
        if self.staged_catalog.is_none() {
            let catalog = lock(&self.db.catalog)?.clone();
            self.staged_catalog = Some(catalog);
        }
        Ok(self.staged_catalog.get_or_insert_with(BTreeMap::new))
    }

    pub(crate) fn schema_root(&self) -> Result<PageId> {
        let store = lock(&self.db.store)?;
        Ok(store.header().schema_root)
    }

    pub fn get(&self, query: &Query) -> Result<Option<Row>> {
        let mut cursor = Cursor::new(self, query)?;
        match cursor.step()? {
            CursorStep::Row(row) => Ok(Some(row)),
            CursorStep::Done { .. } => Ok(None),
        }
    }

    pub fn all(&self, query: &Query) -> Result<Vec<Row>> {
        let mut cursor = Cursor::new(self, query)?;
        let mut rows = Vec::new();
        loop {
            match cursor.step()? {
                CursorStep::Row(row) => rows.push(row),
                CursorStep::Done { .. } => break,
            }
        }
        Ok(rows)
    }

    pub fn each(&self, query: &Query) -> Result<Cursor> {
        Cursor::new(self, query)
    }

    pub fn run(&mut self, mutation: &Mutation, params: &Params) -> Result<RunResult> {
        self.check_active()?;
        if !self.is_writer() {
            return Err(DatabaseError::ReadOnly);
        }
        heap::execute_mutation(self, mutation, params)
    }

    pub fn commit(mut self) -> Result<()> {
        self.check_active()?;
        match self.mode {
            TxnMode::ReadOnly => {
                self.end_read()?;
                self.state = TxnState::Committed;
                Ok(())
            }
            TxnMode::ReadWrite => self.commit_writer(),
        }
    }

    pub fn abort(mut self) -> Result<()> {
        self.check_active()?;
        self.abort_impl()
    }

    fn commit_writer(&mut self) -> Result<()> {
        self.state = TxnState::Committing;

        let dirty = match self.db.cache.uncommitted_pages() {
            Ok(dirty) => dirty,
            Err(e) => {
                let _ = self.abort_impl();
                return Err(e);
            }
        };
        let has_changes = !dirty.is_empty();

        if has_changes {
            // Write-ahead: every dirty page, then the commit marker, then
            // fsync. Nothing is durable until the sync returns.
            let result: Result<()> = (|| {
                let mut wal = lock(&self.db.wal)?;
                for (page_id, page) in &dirty {
                    wal.append_frame(*page_id, &page.to_bytes(), self.write_seq)?;
                }
                wal.append_commit(self.write_seq)?;
                wal.sync()
            })();
            if let Err(e) = result {
                // The log holds only this transaction's frames (every
                // successful commit truncates it), so drop them rather
                // than leave a tail a later marker could cover.
                if let Ok(mut wal) = lock(&self.db.wal) {
                    let _ = wal.reset();
                }
                let _ = self.abort_impl();
                return Err(e);
            }
            if let Err(e) = self.db.cache.promote(self.write_seq) {
                let _ = self.abort_impl();
                return Err(e);
            }
        }

        {
            let mut shared = lock(&self.db.txn_state)?;
            if has_changes {
                shared.committed_seq = self.write_seq;
            }
            shared.writer_active = false;
            self.db.cache.set_snapshot_floor(shared.floor());
        }

        if let Some(staged) = self.staged_catalog.take() {
            *lock(&self.db.catalog)? = staged;
        }
        self.state = TxnState::Committed;
        debug!(seq = self.write_seq, pages = dirty.len(), "transaction committed");

        // The transaction is durable; checkpoint failures propagate but
        // recovery will finish the apply from the WAL.
        if has_changes {
            self.db.checkpoint()?;
        }
        for page_id in std::mem::take(&mut self.freed_pages) {
            let mut store = lock(&self.db.store)?;
            store.free_page(page_id)?;
        }
        Ok(())
    }

    fn abort_impl(&mut self) -> Result<()> {
        match self.mode {
            TxnMode::ReadOnly => {
                self.end_read()?;
                self.state = TxnState::Aborted;
                Ok(())
            }
            TxnMode::ReadWrite => {
                self.state = TxnState::Aborting;
                self.db.cache.discard_uncommitted()?;
                self.staged_catalog = None;
                self.freed_pages.clear();
                let mut shared = lock(&self.db.txn_state)?;
                shared.writer_active = false;
                self.db.cache.set_snapshot_floor(shared.floor());
                drop(shared);
                self.state = TxnState::Aborted;
                Ok(())
            }
        }
    }

    fn end_read(&mut self) -> Result<()> {
        let mut shared = lock(&self.db.txn_state)?;
        if let Some(position) = shared
            .reader_snapshots
            .iter()
            .position(|&snapshot| snapshot == self.snapshot)
        {
            shared.reader_snapshots.swap_remove(position);
        }
        let floor = shared.floor();
        self.db.cache.set_snapshot_floor(floor);
        drop(shared);
        self.db.cache.prune(floor)?;
        Ok(())
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        // Abandonment before commit is an abort.
        if matches!(self.state, TxnState::Active | TxnState::Committing) {
            let _ = self.abort_impl();
        }
    }
}
