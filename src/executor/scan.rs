use std::sync::{Arc, Weak};

use crate::{
    database::DatabaseInner,
    executor::{
        heap,
        query::{Query, Selector},
    },
    txn::Transaction,
    types::{
        PageId, SeqNo,
        error::{DatabaseError, Result},
        page::Page,
        row::Row,
    },
};

/// Read access to versioned pages at a fixed snapshot. The writer's view
/// additionally sees its own uncommitted copies.
pub(crate) struct PageView {
    db: Arc<DatabaseInner>,
    snapshot: SeqNo,
    include_uncommitted: bool,
}

impl PageView {
    pub(crate) fn new(db: Arc<DatabaseInner>, snapshot: SeqNo, include_uncommitted: bool) -> Self {
        Self {
            db,
            snapshot,
            include_uncommitted,
        }
    }

    pub(crate) fn fetch(&self, page_id: PageId) -> Result<Arc<Page>> {
        self.db.check_open()?;
        self.db
            .cache
            .fetch(page_id, self.snapshot, self.include_uncommitted, &self.db.store)
    }
}

/// One step of a cursor: a row, or the terminal signal carrying the total
/// number of rows delivered. End-of-sequence is distinct from row
/// delivery; a count is never conflated with a row value.
#[derive(Debug, Clone, PartialEq)]
pub enum CursorStep {
    Row(Row),
    Done { count: u64 },
}

/// Lazy, forward-only, non-restartable scan bound to the transaction that
/// created it. Stepping after the transaction has ended fails with
/// `CursorInvalidated`.
pub struct Cursor {
    view: PageView,
    token: Weak<()>,
    // Present when the cursor owns its read transaction (`Database::each`);
    // dropping the cursor ends it.
    _owned_txn: Option<Transaction>,
    current_page: Option<PageId>,
    slot: usize,
    selector: Selector,
    delivered: u64,
    finished: bool,
}

impl Cursor {
    pub(crate) fn new(txn: &Transaction, query: &Query) -> Result<Self> {
        let (table, selector) = match query {
            Query::Lookup { table, row_id } => (table.as_str(), Selector::row_id(*row_id)),
            Query::Scan { table, selector } => (table.as_str(), selector.clone()),
        };
        let info = txn.table_info(table)?;
        Ok(Self {
            view: txn.view(),
            token: txn.token_weak(),
            _owned_txn: None,
            current_page: Some(info.first_page),
            slot: 0,
            selector,
            delivered: 0,
            finished: false,
        })
    }

    pub(crate) fn with_owned_txn(txn: Transaction, query: &Query) -> Result<Self> {
        let mut cursor = Self::new(&txn, query)?;
        cursor._owned_txn = Some(txn);
        Ok(cursor)
    }

    /// Advance to the next matching row, or the terminal count. The
    /// terminal step is idempotent.
    pub fn step(&mut self) -> Result<CursorStep> {
        if self.finished {
            return Ok(CursorStep::Done {
                count: self.delivered,
            });
        }
        if self.token.upgrade().is_none() {
            return Err(DatabaseError::CursorInvalidated);
        }

        loop {
            let Some(page_id) = self.current_page else {
                self.finished = true;
                return Ok(CursorStep::Done {
                    count: self.delivered,
                });
            };
            let page = self.view.fetch(page_id)?;
            if self.slot >= page.slot_directory.slots.len() {
                self.current_page = page.next_page;
                self.slot = 0;
                continue;
            }
            let slot = self.slot;
            self.slot += 1;
            let Some(cell) = page.get_cell(slot) else {
                continue;
            };
            let row = heap::decode_cell(&self.view, cell)?;
            if self.selector.matches(&row) {
                self.delivered += 1;
                return Ok(CursorStep::Row(row));
            }
        }
    }

    /// Rows delivered so far.
    pub fn delivered(&self) -> u64 {
        self.delivered
    }
}

impl Iterator for Cursor {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.step() {
            Ok(CursorStep::Row(row)) => Some(Ok(row)),
            Ok(CursorStep::Done { .. }) => None,
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}
