pub mod schema;

use color_eyre::{eyre::eyre, Result};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::SyncError;

/// Shared connection to the local SQLite database.
///
/// Cloning is cheap; every clone talks to the same connection.
#[derive(Clone)]
pub struct Database {
  conn: Arc<Mutex<Connection>>,
}

impl Database {
  /// Open or create the database inside `data_dir`
  pub fn open(data_dir: &Path) -> Result<Self> {
    let path = Self::path_in(data_dir);

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create database directory: {}", e))?;
    }

    let conn = Connection::open(&path)
      .map_err(|e| eyre!("Failed to open database at {}: {}", path.display(), e))?;

    Self::from_connection(conn)
  }

  /// Open a private in-memory database
  #[allow(dead_code)]
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory database: {}", e))?;
    Self::from_connection(conn)
  }

  /// Database file location for a data directory
  pub fn path_in(data_dir: &Path) -> PathBuf {
    data_dir.join("rancho.db")
  }

  fn from_connection(conn: Connection) -> Result<Self> {
    let db = Self {
      conn: Arc::new(Mutex::new(conn)),
    };
    db.run_migrations()?;
    Ok(db)
  }

  /// Run database migrations
  fn run_migrations(&self) -> Result<()> {
    self
      .with_conn(|conn| conn.execute_batch(schema::SCHEMA))
      .map_err(|e| eyre!("Failed to run migrations: {}", e))?;
    Ok(())
  }

  /// Run `f` with exclusive access to the connection.
  pub fn with_conn<T>(
    &self,
    f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
  ) -> Result<T, SyncError> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| SyncError::Storage(format!("Lock poisoned: {}", e)))?;
    Ok(f(&*conn)?)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn table_count(db: &Database) -> i64 {
    db.with_conn(|conn| {
      conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN
         ('durable_store', 'session_store', 'pending_writes')",
        [],
        |row| row.get(0),
      )
    })
    .unwrap()
  }

  #[test]
  fn test_in_memory_runs_migrations() {
    let db = Database::open_in_memory().unwrap();
    assert_eq!(table_count(&db), 3);
  }

  #[test]
  fn test_reopen_keeps_data() {
    let dir = tempfile::tempdir().unwrap();

    {
      let db = Database::open(dir.path()).unwrap();
      db.with_conn(|conn| {
        conn.execute(
          "INSERT INTO durable_store (key, data) VALUES ('k', 'v')",
          [],
        )
      })
      .unwrap();
    }

    let db = Database::open(dir.path()).unwrap();
    let data: String = db
      .with_conn(|conn| conn.query_row("SELECT data FROM durable_store WHERE key = 'k'", [], |r| r.get(0)))
      .unwrap();
    assert_eq!(data, "v");
  }
}
