use std::collections::BTreeMap;

use crate::{
    storage::page_store::PageStore,
    types::{
        PageId, RowId,
        error::{DatabaseError, Result},
        page::Page,
        row::Row,
        value::Value,
    },
};

/// Catalog entry for one table. Stored as a row on the catalog page chain
/// rooted at the header's schema root:
/// {name, first_page, last_page, next_row_id}.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    pub name: String,
    pub first_page: PageId,
    pub last_page: PageId,
    pub next_row_id: RowId,
}

impl TableInfo {
    pub fn new(name: String, first_page: PageId) -> Self {
        Self {
            name,
            first_page,
            last_page: first_page,
            next_row_id: 1,
        }
    }

    pub fn to_row(&self) -> Row {
        Row::new(vec![
            Value::Text(self.name.clone()),
            Value::Integer(self.first_page as i64),
            Value::Integer(self.last_page as i64),
            Value::Integer(self.next_row_id as i64),
        ])
    }

    pub fn from_row(row: &Row) -> Result<Self> {
        if let (
            Some(Value::Text(name)),
            Some(Value::Integer(first_page)),
            Some(Value::Integer(last_page)),
            Some(Value::Integer(next_row_id)),
        ) = (
            row.get_value(0),
            row.get_value(1),
            row.get_value(2),
            row.get_value(3),
        ) {
            Ok(Self {
                name: name.clone(),
                first_page: *first_page as PageId,
                last_page: *last_page as PageId,
                next_row_id: *next_row_id as RowId,
            })
        } else {
            Err(DatabaseError::SerializationError {
                details: "malformed catalog row".to_string(),
            })
        }
    }
}

/// Load the full catalog by walking the chain from the schema root.
/// Runs at open time, before any transaction exists, so it reads the page
/// store directly.
pub fn load_catalog(store: &mut PageStore) -> Result<BTreeMap<String, TableInfo>> {
    let mut tables = BTreeMap::new();
    let mut current = Some(store.header().schema_root);
    while let Some(page_id) = current {
        let page = Page::from_bytes(&store.read_page(page_id)?)?;
        for slot in 0..page.slot_directory.slots.len() {
            if let Some(cell) = page.get_cell(slot) {
                let row = Row::from_bytes(cell)?;
                let info = TableInfo::from_row(&row)?;
                tables.insert(info.name.clone(), info);
            }
        }
        current = page.next_page;
    }
    Ok(tables)
}
