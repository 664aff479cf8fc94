pub mod database;
pub mod executor;
pub mod storage;
pub mod txn;
pub mod types;
pub mod utils;

pub use database::{Database, OpenOptions};
pub use executor::query::{
    Arg, CompareOp, Mutation, Params, Predicate, Query, RowIdRange, RunResult, Selector,
};
pub use executor::scan::{Cursor, CursorStep};
pub use txn::{Transaction, TxnMode};
pub use types::error::{DatabaseError, Result};
pub use types::row::Row;
pub use types::value::Value;
