use std::{
    fs,
    path::PathBuf,
    sync::atomic::{AtomicU64, Ordering},
    time::{SystemTime, UNIX_EPOCH},
};

use tempfile::env::temp_dir;

use crate::{
    database::{Database, OpenOptions},
    storage::wal::wal_path_for,
    types::error::Result,
};

static NEXT_ID: AtomicU64 = AtomicU64::new(0);

pub fn get_unix_timestamp_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis())
        .unwrap_or(0)
}

pub fn create_temp_db_path() -> PathBuf {
    create_temp_db_path_with_prefix("lumbung_test")
}

pub fn create_temp_db_path_with_prefix(prefix: &str) -> PathBuf {
    let mut temp_path = temp_dir();
    temp_path.push(format!(
        "{}_{}_{}_{}.db",
        prefix,
        std::process::id(),
        get_unix_timestamp_millis(),
        NEXT_ID.fetch_add(1, Ordering::SeqCst),
    ));
    temp_path
}

/// Test helper: a database at a temp path, removed (with its WAL and
/// scratch sidecars) on drop.
pub struct TempDatabase {
    pub path: PathBuf,
    pub database: Option<Database>,
}

impl TempDatabase {
    pub fn new() -> Self {
        Self {
            path: create_temp_db_path(),
            database: None,
        }
    }

    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            path: create_temp_db_path_with_prefix(prefix),
            database: None,
        }
    }

    pub fn open(&mut self) -> Result<&mut Database> {
        self.open_with(OpenOptions::default())
    }

    pub fn open_with(&mut self, options: OpenOptions) -> Result<&mut Database> {
        let database = Database::open(&self.path, options)?;
        Ok(self.database.insert(database))
    }

    pub fn close(&mut self) -> Result<()> {
        if let Some(database) = self.database.take() {
            database.close()?;
        }
        Ok(())
    }
}

impl Default for TempDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TempDatabase {
    fn drop(&mut self) {
        self.database = None;
        if self.path.exists() {
            let _ = fs::remove_file(&self.path);
        }
        let wal_path = wal_path_for(&self.path);
        if wal_path.exists() {
            let _ = fs::remove_file(&wal_path);
        }
        let mut scratch = self.path.as_os_str().to_os_string();
        scratch.push("-dw");
        let scratch = PathBuf::from(scratch);
        if scratch.exists() {
            let _ = fs::remove_file(&scratch);
        }
    }
}
