//! SQLite store for externally supplied vectors (baseline retriever).

pub mod vectors;

use crate::error::Result;
use rusqlite::Connection;
use std::path::{Path, PathBuf};

/// Database connection wrapper
pub struct Db {
    path: PathBuf,
}

impl Db {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Self {
        Self {
            path: db_path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open a new connection with the store's pragmas applied
    pub fn open_connection(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL; \
             PRAGMA synchronous = NORMAL; \
             PRAGMA temp_store = MEMORY; \
             PRAGMA cache_size = -65536;",
        )?;

        Ok(conn)
    }

    /// Execute a closure with a fresh connection
    pub fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut conn = self.open_connection()?;
        f(&mut conn)
    }
}
