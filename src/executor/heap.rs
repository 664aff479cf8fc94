use std::collections::BTreeMap;

use crate::{
    executor::{
        query::{Arg, Mutation, Params, RunResult, Selector, resolve_arg, validate_params},
        scan::PageView,
    },
    storage::schema::TableInfo,
    txn::Transaction,
    types::{
        PAGE_HEADER_SIZE, PAGE_SIZE, PageId, SLOT_DIRECTORY_ENTRY_SIZE,
        error::{DatabaseError, Result},
        page::PageType,
        row::Row,
        value::Value,
    },
};

/// Cell kind markers. An inline cell is the encoded row; an overflow cell
/// is {kind, total length, first overflow page, inline prefix} with the
/// remainder chained across overflow pages.
pub(crate) const CELL_INLINE: u8 = 0;
pub(crate) const CELL_OVERFLOW: u8 = 1;

const OVERFLOW_CELL_HEADER_SIZE: usize = 1 + 4 + 4;
const MIN_OVERFLOW_PREFIX: usize = 64;

/// Largest cell payload a fresh page can hold.
fn max_cell_payload() -> usize {
    PAGE_SIZE - PAGE_HEADER_SIZE - SLOT_DIRECTORY_ENTRY_SIZE
}

/// Decode a row cell, transparently reassembling overflow chains.
pub(crate) fn decode_cell(view: &PageView, cell: &[u8]) -> Result<Row> {
    if cell.is_empty() {
        return Err(DatabaseError::SerializationError {
            details: "empty row cell".to_string(),
        });
    }
    match cell[0] {
        CELL_INLINE => Row::from_bytes(&cell[1..]),
        CELL_OVERFLOW => {
            if cell.len() < OVERFLOW_CELL_HEADER_SIZE {
                return Err(DatabaseError::SerializationError {
                    details: "truncated overflow cell header".to_string(),
                });
            }
            let total = u32::from_le_bytes([cell[1], cell[2], cell[3], cell[4]]) as usize;
            let first = PageId::from_le_bytes([cell[5], cell[6], cell[7], cell[8]]);
            let mut bytes = Vec::with_capacity(total);
            bytes.extend_from_slice(&cell[OVERFLOW_CELL_HEADER_SIZE..]);

            let mut current = Some(first);
            while bytes.len() < total {
                let Some(page_id) = current else {
                    return Err(DatabaseError::CorruptPage {
                        page_id: first,
                        reason: "overflow chain ended before row was complete".to_string(),
                    });
                };
                let page = view.fetch(page_id)?;
                if page.page_type != PageType::Overflow {
                    return Err(DatabaseError::CorruptPage {
                        page_id,
                        reason: "overflow chain links a non-overflow page".to_string(),
                    });
                }
                let chunk = page.get_cell(0).ok_or_else(|| DatabaseError::CorruptPage {
                    page_id,
                    reason: "overflow page has no payload cell".to_string(),
                })?;
                bytes.extend_from_slice(chunk);
                current = page.next_page;
            }
            if bytes.len() != total {
                return Err(DatabaseError::CorruptPage {
                    page_id: first,
                    reason: format!(
                        "overflow chain length mismatch: expected {}, got {}",
                        total,
                        bytes.len()
                    ),
                });
            }
            Row::from_bytes(&bytes)
        }
        other => Err(DatabaseError::SerializationError {
            details: format!("unknown cell kind: {}", other),
        }),
    }
}

/// First overflow page of a cell, if it spills.
pub(crate) fn cell_overflow_head(cell: &[u8]) -> Option<PageId> {
    if cell.len() >= OVERFLOW_CELL_HEADER_SIZE && cell[0] == CELL_OVERFLOW {
        Some(PageId::from_le_bytes([cell[5], cell[6], cell[7], cell[8]]))
    } else {
        None
    }
}

pub(crate) fn execute_mutation(
    txn: &mut Transaction,
    mutation: &Mutation,
    params: &Params,
) -> Result<RunResult> {
    validate_params(mutation, params)?;
    match mutation {
        Mutation::CreateTable { table } => {
            create_table(txn, table)?;
            Ok(RunResult::default())
        }
        Mutation::Insert { table, rows } => insert_rows(txn, table, rows, params),
        Mutation::Update {
            table,
            selector,
            assignments,
        } => {
            let changes = update_rows(txn, table, selector, assignments, params)?;
            Ok(RunResult {
                last_insert_id: None,
                changes,
            })
        }
        Mutation::Delete { table, selector } => {
            let changes = delete_rows(txn, table, selector)?;
            Ok(RunResult {
                last_insert_id: None,
                changes,
            })
        }
    }
}

fn create_table(txn: &mut Transaction, table: &str) -> Result<()> {
    match txn.table_info(table) {
        Ok(_) => {
            return Err(DatabaseError::TableExists {
                name: table.to_string(),
            });
        }
        Err(DatabaseError::TableNotFound { .. }) => {}
        Err(e) => return Err(e),
    }
    let first_page = txn.alloc_page(PageType::TableLeaf)?;
    txn.stage_catalog()?
        .insert(table.to_string(), TableInfo::new(table.to_string(), first_page));
    persist_catalog(txn)
}

fn insert_rows(
    txn: &mut Transaction,
    table: &str,
    rows: &[Vec<Arg>],
    params: &Params,
) -> Result<RunResult> {
    let mut info = txn.table_info(table)?;
    let mut last_insert_id = None;
    for args in rows {
        let values = args
            .iter()
            .map(|arg| resolve_arg(arg, params))
            .collect::<Result<Vec<Value>>>()?;
        let row_id = info.next_row_id;
        info.next_row_id += 1;
        let row = Row::with_row_id(row_id, values);
        place_row(txn, &mut info, &row)?;
        last_insert_id = Some(row_id);
    }
    let changes = rows.len() as u64;
    txn.stage_catalog()?.insert(table.to_string(), info);
    persist_catalog(txn)?;
    Ok(RunResult {
        last_insert_id,
        changes,
    })
}

fn delete_rows(txn: &mut Transaction, table: &str, selector: &Selector) -> Result<u64> {
    let info = txn.table_info(table)?;
    let view = txn.view();
    let mut count = 0u64;
    let mut current = Some(info.first_page);
    while let Some(page_id) = current {
        let page = view.fetch(page_id)?;
        current = page.next_page;

        let mut matched: Vec<usize> = Vec::new();
        let mut overflow_heads: Vec<PageId> = Vec::new();
        for slot in 0..page.slot_directory.slots.len() {
            let Some(cell) = page.get_cell(slot) else {
                continue;
            };
            let row = decode_cell(&view, cell)?;
            if selector.matches(&row) {
                matched.push(slot);
                if let Some(head) = cell_overflow_head(cell) {
                    overflow_heads.push(head);
                }
            }
        }
        if matched.is_empty() {
            continue;
        }

        txn.update_page(page_id, |page| {
            for slot in matched.iter().rev() {
                page.delete_cell(*slot)?;
            }
            Ok(())
        })?;
        for head in overflow_heads {
            free_overflow_chain(txn, head)?;
        }
        count += matched.len() as u64;
    }
    Ok(count)
}

fn update_rows(
    txn: &mut Transaction,
    table: &str,
    selector: &Selector,
    assignments: &[(usize, Arg)],
    params: &Params,
) -> Result<u64> {
    let mut info = txn.table_info(table)?;
    let resolved: Vec<(usize, Value)> = assignments
        .iter()
        .map(|(column, arg)| Ok((*column, resolve_arg(arg, params)?)))
        .collect::<Result<_>>()?;

    struct Matched {
        page_id: PageId,
        slot: usize,
        new_row: Row,
        overflow_head: Option<PageId>,
    }

    // Pass 1: find every matching row before touching anything, so rows
    // re-placed at the tail are never rescanned.
    let view = txn.view();
    let mut matches: Vec<Matched> = Vec::new();
    let mut current = Some(info.first_page);
    while let Some(page_id) = current {
        let page = view.fetch(page_id)?;
        current = page.next_page;
        for slot in 0..page.slot_directory.slots.len() {
            let Some(cell) = page.get_cell(slot) else {
                continue;
            };
            let row = decode_cell(&view, cell)?;
            if selector.matches(&row) {
                let mut new_row = row.clone();
                for (column, value) in &resolved {
                    new_row.set_value(*column, value.clone())?;
                }
                matches.push(Matched {
                    page_id,
                    slot,
                    new_row,
                    overflow_head: cell_overflow_head(cell),
                });
            }
        }
    }
    if matches.is_empty() {
        return Ok(0);
    }

    // Pass 2: drop the old cells, then re-place the rewritten rows.
    let mut by_page: BTreeMap<PageId, Vec<usize>> = BTreeMap::new();
    for matched in &matches {
        by_page.entry(matched.page_id).or_default().push(matched.slot);
    }
    for (page_id, mut slots) in by_page {
        slots.sort_unstable();
        txn.update_page(page_id, |page| {
            for slot in slots.iter().rev() {
                page.delete_cell(*slot)?;
            }
            Ok(())
        })?;
    }
    for matched in &matches {
        if let Some(head) = matched.overflow_head {
            free_overflow_chain(txn, head)?;
        }
    }

    let count = matches.len() as u64;
    for matched in matches {
        place_row(txn, &mut info, &matched.new_row)?;
    }
    txn.stage_catalog()?.insert(table.to_string(), info);
    persist_catalog(txn)?;
    Ok(count)
}

/// Append a row to the table's tail page, allocating and linking a new
/// tail when full and spilling oversized rows to an overflow chain.
fn place_row(txn: &mut Transaction, info: &mut TableInfo, row: &Row) -> Result<()> {
    let encoded = row.to_bytes();
    let inline_len = 1 + encoded.len();

    if inline_len <= max_cell_payload() {
        let tail = info.last_page;
        let fits = {
            let page = txn.fetch_page(tail)?;
            page.can_fit(inline_len)
        };
        let target = if fits { tail } else { new_tail(txn, info)? };

        let mut cell = Vec::with_capacity(inline_len);
        cell.push(CELL_INLINE);
        cell.extend_from_slice(&encoded);
        return txn.update_page(target, |page| {
            page.insert_cell(&cell)?;
            Ok(())
        });
    }

    // Overflow: keep a prefix inline, chain the rest.
    let mut tail = info.last_page;
    let mut available = {
        let page = txn.fetch_page(tail)?;
        page.available_space()
    };
    let minimum = OVERFLOW_CELL_HEADER_SIZE + MIN_OVERFLOW_PREFIX + SLOT_DIRECTORY_ENTRY_SIZE;
    if available < minimum {
        tail = new_tail(txn, info)?;
        available = {
            let page = txn.fetch_page(tail)?;
            page.available_space()
        };
    }

    let prefix_len =
        (available - SLOT_DIRECTORY_ENTRY_SIZE - OVERFLOW_CELL_HEADER_SIZE).min(encoded.len());
    let first_overflow = write_overflow_chain(txn, &encoded[prefix_len..])?;

    let mut cell = Vec::with_capacity(OVERFLOW_CELL_HEADER_SIZE + prefix_len);
    cell.push(CELL_OVERFLOW);
    cell.extend_from_slice(&(encoded.len() as u32).to_le_bytes());
    cell.extend_from_slice(&first_overflow.to_le_bytes());
    cell.extend_from_slice(&encoded[..prefix_len]);
    txn.update_page(tail, |page| {
        page.insert_cell(&cell)?;
        Ok(())
    })
}

fn new_tail(txn: &mut Transaction, info: &mut TableInfo) -> Result<PageId> {
    let page_id = txn.alloc_page(PageType::TableLeaf)?;
    let old_tail = info.last_page;
    txn.update_page(old_tail, |page| {
        page.next_page = Some(page_id);
        Ok(())
    })?;
    info.last_page = page_id;
    Ok(page_id)
}

fn write_overflow_chain(txn: &mut Transaction, data: &[u8]) -> Result<PageId> {
    let chunks: Vec<&[u8]> = data.chunks(max_cell_payload()).collect();
    let mut next: Option<PageId> = None;
    for chunk in chunks.iter().rev() {
        let page_id = txn.alloc_page(PageType::Overflow)?;
        let link = next;
        txn.update_page(page_id, |page| {
            page.next_page = link;
            page.insert_cell(chunk)?;
            Ok(())
        })?;
        next = Some(page_id);
    }
    next.ok_or_else(|| DatabaseError::SerializationError {
        details: "overflow chain for empty remainder".to_string(),
    })
}

fn free_overflow_chain(txn: &mut Transaction, head: PageId) -> Result<()> {
    let view = txn.view();
    let mut current = Some(head);
    while let Some(page_id) = current {
        let page = view.fetch(page_id)?;
        if page.page_type != PageType::Overflow {
            return Err(DatabaseError::CorruptPage {
                page_id,
                reason: "overflow chain links a non-overflow page".to_string(),
            });
        }
        current = page.next_page;
        txn.free_page_deferred(page_id);
    }
    Ok(())
}

/// Rewrite the catalog chain from the staged catalog. The chain is reused
/// in place, extended when the rows outgrow it, and trailing pages are
/// left empty.
fn persist_catalog(txn: &mut Transaction) -> Result<()> {
    let rows: Vec<Row> = txn
        .stage_catalog()?
        .values()
        .map(|info| info.to_row())
        .collect();
    let mut current = txn.schema_root()?;
    let mut index = 0usize;

    loop {
        let existing_next = {
            let page = txn.fetch_page(current)?;
            page.next_page
        };

        let index_before = index;
        txn.update_page(current, |page| {
            page.clear_cells();
            while index < rows.len() {
                let bytes = rows[index].to_bytes();
                if !page.can_fit(bytes.len()) {
                    break;
                }
                page.insert_cell(&bytes)?;
                index += 1;
            }
            Ok(())
        })?;
        if index == index_before && index < rows.len() {
            return Err(DatabaseError::SerializationError {
                details: "catalog row too large for a page".to_string(),
            });
        }

        if index >= rows.len() {
            // Clear any leftover chain pages from a previously larger
            // catalog.
            let mut leftover = existing_next;
            while let Some(page_id) = leftover {
                leftover = {
                    let page = txn.fetch_page(page_id)?;
                    page.next_page
                };
                txn.update_page(page_id, |page| {
                    page.clear_cells();
                    Ok(())
                })?;
            }
            return Ok(());
        }

        current = match existing_next {
            Some(page_id) => page_id,
            None => {
                let page_id = txn.alloc_page(PageType::TableLeaf)?;
                txn.update_page(current, |page| {
                    page.next_page = Some(page_id);
                    Ok(())
                })?;
                page_id
            }
        };
    }
}
