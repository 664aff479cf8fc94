pub mod hash;
pub mod mock;

use std::sync::{Mutex, MutexGuard};

use crate::types::error::{DatabaseError, Result};

/// Lock a mutex, surfacing poisoning as a database error instead of a panic.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex.lock().map_err(|_| DatabaseError::ConcurrencyError)
}
