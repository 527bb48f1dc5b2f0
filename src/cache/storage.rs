//! Storage tier implementations: in-memory, SQLite-backed, and disabled.

use rusqlite::{params, OptionalExtension};
use std::collections::HashMap;
use std::sync::Mutex;

use super::traits::CacheTier;
use crate::db::Database;
use crate::error::SyncError;

/// Process-local tier. Fastest, lost on restart.
#[derive(Default)]
pub struct MemoryTier {
  entries: Mutex<HashMap<String, String>>,
}

impl MemoryTier {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, SyncError> {
    self
      .entries
      .lock()
      .map_err(|e| SyncError::Storage(format!("Lock poisoned: {}", e)))
  }
}

impl CacheTier for MemoryTier {
  fn name(&self) -> &'static str {
    "memory"
  }

  fn read(&self, key: &str) -> Result<Option<String>, SyncError> {
    Ok(self.lock()?.get(key).cloned())
  }

  fn write(&self, key: &str, data: &str) -> Result<(), SyncError> {
    self.lock()?.insert(key.to_string(), data.to_string());
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<(), SyncError> {
    self.lock()?.remove(key);
    Ok(())
  }

  fn remove_prefix(&self, prefix: &str) -> Result<usize, SyncError> {
    let mut entries = self.lock()?;
    let before = entries.len();
    entries.retain(|k, _| !k.starts_with(prefix));
    Ok(before - entries.len())
  }
}

/// Which SQLite table a [`SqliteTier`] reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqliteTable {
  /// Survives restarts until explicitly cleared
  Durable,
  /// Wiped whenever a session starts or ends
  Session,
}

impl SqliteTable {
  fn table_name(self) -> &'static str {
    match self {
      SqliteTable::Durable => "durable_store",
      SqliteTable::Session => "session_store",
    }
  }
}

/// SQLite-based tier over one of the key/value tables.
pub struct SqliteTier {
  db: Database,
  table: SqliteTable,
}

impl SqliteTier {
  pub fn durable(db: Database) -> Self {
    Self {
      db,
      table: SqliteTable::Durable,
    }
  }

  pub fn session(db: Database) -> Self {
    Self {
      db,
      table: SqliteTable::Session,
    }
  }
}

impl CacheTier for SqliteTier {
  fn name(&self) -> &'static str {
    match self.table {
      SqliteTable::Durable => "durable",
      SqliteTable::Session => "session",
    }
  }

  fn read(&self, key: &str) -> Result<Option<String>, SyncError> {
    let sql = format!("SELECT data FROM {} WHERE key = ?", self.table.table_name());
    self
      .db
      .with_conn(|conn| conn.query_row(&sql, params![key], |row| row.get(0)).optional())
  }

  fn write(&self, key: &str, data: &str) -> Result<(), SyncError> {
    let sql = format!(
      "INSERT OR REPLACE INTO {} (key, data, stored_at) VALUES (?, ?, datetime('now'))",
      self.table.table_name()
    );
    self
      .db
      .with_conn(|conn| conn.execute(&sql, params![key, data]))?;
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<(), SyncError> {
    let sql = format!("DELETE FROM {} WHERE key = ?", self.table.table_name());
    self.db.with_conn(|conn| conn.execute(&sql, params![key]))?;
    Ok(())
  }

  fn remove_prefix(&self, prefix: &str) -> Result<usize, SyncError> {
    // substr() instead of LIKE: namespaces contain '_' which LIKE treats as a wildcard
    let sql = format!(
      "DELETE FROM {} WHERE substr(key, 1, length(?1)) = ?1",
      self.table.table_name()
    );
    self.db.with_conn(|conn| conn.execute(&sql, params![prefix]))
  }
}

/// Tier that doesn't cache anything.
/// Used when a tier is disabled - all operations are no-ops.
pub struct NoopTier;

impl CacheTier for NoopTier {
  fn name(&self) -> &'static str {
    "disabled"
  }

  fn read(&self, _key: &str) -> Result<Option<String>, SyncError> {
    Ok(None) // Always miss
  }

  fn write(&self, _key: &str, _data: &str) -> Result<(), SyncError> {
    Ok(()) // Discard
  }

  fn remove(&self, _key: &str) -> Result<(), SyncError> {
    Ok(())
  }

  fn remove_prefix(&self, _prefix: &str) -> Result<usize, SyncError> {
    Ok(0)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn exercise(tier: &dyn CacheTier) {
    tier.write("refeicoes_cache_a", "1").unwrap();
    tier.write("refeicoes_cache_b", "2").unwrap();
    tier.write("other_c", "3").unwrap();

    assert_eq!(tier.read("refeicoes_cache_a").unwrap().as_deref(), Some("1"));

    tier.write("refeicoes_cache_a", "10").unwrap();
    assert_eq!(tier.read("refeicoes_cache_a").unwrap().as_deref(), Some("10"));

    tier.remove("refeicoes_cache_b").unwrap();
    assert_eq!(tier.read("refeicoes_cache_b").unwrap(), None);

    tier.write("refeicoes_cache_b", "2").unwrap();
    assert_eq!(tier.remove_prefix("refeicoes_cache_").unwrap(), 2);
    assert_eq!(tier.read("refeicoes_cache_a").unwrap(), None);
    assert_eq!(tier.read("other_c").unwrap().as_deref(), Some("3"));
  }

  #[test]
  fn test_memory_tier() {
    exercise(&MemoryTier::new());
  }

  #[test]
  fn test_sqlite_tiers() {
    let db = Database::open_in_memory().unwrap();
    exercise(&SqliteTier::durable(db.clone()));
    exercise(&SqliteTier::session(db));
  }

  #[test]
  fn test_sqlite_tables_are_separate() {
    let db = Database::open_in_memory().unwrap();
    let durable = SqliteTier::durable(db.clone());
    let session = SqliteTier::session(db);

    durable.write("k", "durable").unwrap();
    assert_eq!(session.read("k").unwrap(), None);

    session.remove_prefix("").unwrap();
    assert_eq!(durable.read("k").unwrap().as_deref(), Some("durable"));
  }

  #[test]
  fn test_prefix_underscore_is_literal() {
    let tier = SqliteTier::durable(Database::open_in_memory().unwrap());
    tier.write("refeicoesXcacheXa", "1").unwrap();
    assert_eq!(tier.remove_prefix("refeicoes_cache_").unwrap(), 0);
  }

  #[test]
  fn test_noop_tier_always_misses() {
    let tier = NoopTier;
    tier.write("k", "v").unwrap();
    assert_eq!(tier.read("k").unwrap(), None);
    assert_eq!(tier.remove_prefix("").unwrap(), 0);
  }
}
