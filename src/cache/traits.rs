//! Core traits and types for the caching system.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::SyncError;

/// Trait for reference data that is cached as a whole collection.
///
/// Collections are refreshed wholesale from the backend and stored under a
/// single logical key, never merged item by item.
pub trait Cacheable: Clone + Send + Sync + Serialize + DeserializeOwned {
  /// Logical cache key holding the full collection (e.g. "fornecedores")
  fn collection_key() -> &'static str;

  /// Entity type name used in log lines (e.g. "supplier")
  fn entity_type() -> &'static str;
}

/// A single storage tier: a flat string key/value store.
///
/// Tiers store serialized [`CacheEntry`] documents; interpreting them is the
/// job of the tiered cache, so a tier never needs to know the value type.
pub trait CacheTier: Send + Sync {
  /// Tier name for log lines
  fn name(&self) -> &'static str;

  /// Read the raw document stored under `key`.
  fn read(&self, key: &str) -> Result<Option<String>, SyncError>;

  /// Store a raw document under `key`, replacing any previous one.
  fn write(&self, key: &str, data: &str) -> Result<(), SyncError>;

  /// Remove `key` if present.
  fn remove(&self, key: &str) -> Result<(), SyncError>;

  /// Remove every key starting with `prefix`. Returns how many were removed.
  fn remove_prefix(&self, prefix: &str) -> Result<usize, SyncError>;
}

/// Persisted cache document.
///
/// Serialized as `{ value, timestamp, scopeKey, version }` where `timestamp`
/// is milliseconds since the Unix epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry<T> {
  pub value: T,
  pub timestamp: i64,
  pub scope_key: String,
  pub version: String,
}

impl<T> CacheEntry<T> {
  pub fn new(value: T, scope_key: &str, version: &str, stored_at: DateTime<Utc>) -> Self {
    Self {
      value,
      timestamp: stored_at.timestamp_millis(),
      scope_key: scope_key.to_string(),
      version: version.to_string(),
    }
  }

  /// Age of the entry in milliseconds at `now`.
  pub fn age_millis(&self, now: DateTime<Utc>) -> i64 {
    now.timestamp_millis() - self.timestamp
  }

  /// Reject entries written under another scope.
  pub fn check_scope(&self, current: &str) -> Result<(), SyncError> {
    if self.scope_key == current {
      Ok(())
    } else {
      Err(SyncError::ScopeMismatch {
        found: self.scope_key.clone(),
        current: current.to_string(),
      })
    }
  }
}

/// Which tier satisfied a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  Memory,
  Durable,
  SessionBackup,
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;

  #[test]
  fn test_entry_wire_shape() {
    let at = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
    let entry = CacheEntry::new(vec!["a"], "700TA", "1.0.0", at);
    let json = serde_json::to_value(&entry).unwrap();

    assert_eq!(
      json,
      serde_json::json!({
        "value": ["a"],
        "timestamp": 1_700_000_000_000i64,
        "scopeKey": "700TA",
        "version": "1.0.0"
      })
    );
  }

  #[test]
  fn test_check_scope() {
    let entry = CacheEntry::new(1, "A", "1.0.0", Utc::now());
    assert!(entry.check_scope("A").is_ok());
    assert!(matches!(
      entry.check_scope("B"),
      Err(SyncError::ScopeMismatch { .. })
    ));
  }

  #[test]
  fn test_age_millis() {
    let at = Utc.timestamp_millis_opt(1_000).unwrap();
    let entry = CacheEntry::new((), "A", "1.0.0", at);
    let now = Utc.timestamp_millis_opt(4_500).unwrap();
    assert_eq!(entry.age_millis(now), 3_500);
  }
}
