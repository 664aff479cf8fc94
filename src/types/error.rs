use thiserror::Error;

use crate::types::PageId;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("not found: {what}")]
    NotFound { what: String },

    #[error("corrupt header: {reason}")]
    CorruptHeader { reason: String },

    #[error("corrupt WAL frame at offset {offset}: {reason}")]
    CorruptFrame { offset: u64, reason: String },

    #[error("corrupt page: page_id={page_id}, reason={reason}")]
    CorruptPage { page_id: PageId, reason: String },

    #[error("page {page_id} out of range (page count: {page_count})")]
    OutOfRange { page_id: PageId, page_count: u32 },

    #[error("page cache exhausted (capacity: {capacity} pages)")]
    CacheExhausted { capacity: usize },

    #[error("cursor invalidated: parent transaction has ended")]
    CursorInvalidated,

    #[error("parameter mismatch: {details}")]
    ParamMismatch { details: String },

    #[error("table '{name}' not found")]
    TableNotFound { name: String },

    #[error("table '{name}' already exists")]
    TableExists { name: String },

    #[error("page is full (page_id: {page_id})")]
    PageFull { page_id: PageId },

    #[error("invalid slot index {index} (max: {max})")]
    InvalidSlotIndex { index: usize, max: usize },

    #[error("column index {index} out of bounds")]
    ColumnIndexOutOfBounds { index: usize },

    #[error("invalid page type: {0}")]
    InvalidPageType(u8),

    #[error("invalid page size: expected {expected} bytes, got {actual} bytes")]
    InvalidPageSize { expected: usize, actual: usize },

    #[error("serialization/deserialization error: {details}")]
    SerializationError { details: String },

    #[error("database is read-only")]
    ReadOnly,

    #[error("another write transaction is active")]
    WriterActive,

    #[error("transaction is no longer active")]
    TransactionClosed,

    #[error("database is closed")]
    DatabaseClosed,

    #[error("concurrent access violation")]
    ConcurrencyError,
}

pub type Result<T> = std::result::Result<T, DatabaseError>;
