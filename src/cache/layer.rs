//! Tiered cache that orchestrates the memory, durable and session tiers.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::storage::{MemoryTier, NoopTier, SqliteTier};
use super::traits::{CacheEntry, CacheSource, CacheTier};
use crate::config::CacheConfig;
use crate::db::Database;

pub const DEFAULT_NAMESPACE: &str = "refeicoes_cache_";
pub const DEFAULT_VERSION: &str = "1.0.0";
/// Default maximum age accepted by [`TieredCache::is_valid`].
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

const BACKUP_SUFFIX: &str = "_backup";

/// Key-scoped cache over three tiers.
///
/// Every write goes to all tiers, tagged with the current scope (team code).
/// Reads try memory, then the durable store, then the session backup, and
/// only accept entries tagged with the caller's current scope. Storage
/// failures are logged and degrade to a miss; they never reach the caller.
#[derive(Clone)]
pub struct TieredCache {
  memory: Arc<dyn CacheTier>,
  durable: Arc<dyn CacheTier>,
  session: Arc<dyn CacheTier>,
  namespace: String,
  version: String,
  scope: Arc<RwLock<String>>,
}

impl TieredCache {
  /// Create a cache over explicit tiers with the default namespace and version.
  pub fn new(
    memory: Arc<dyn CacheTier>,
    durable: Arc<dyn CacheTier>,
    session: Arc<dyn CacheTier>,
  ) -> Self {
    Self {
      memory,
      durable,
      session,
      namespace: DEFAULT_NAMESPACE.to_string(),
      version: DEFAULT_VERSION.to_string(),
      scope: Arc::new(RwLock::new(String::new())),
    }
  }

  /// Build the standard tier stack, substituting a no-op tier for each tier
  /// disabled in configuration.
  pub fn from_config(config: &CacheConfig, db: &Database) -> Self {
    let memory: Arc<dyn CacheTier> = if config.memory {
      Arc::new(MemoryTier::new())
    } else {
      Arc::new(NoopTier)
    };
    let durable: Arc<dyn CacheTier> = if config.durable {
      Arc::new(SqliteTier::durable(db.clone()))
    } else {
      Arc::new(NoopTier)
    };
    let session: Arc<dyn CacheTier> = if config.session {
      Arc::new(SqliteTier::session(db.clone()))
    } else {
      Arc::new(NoopTier)
    };

    Self::new(memory, durable, session)
      .with_namespace(&config.namespace)
      .with_version(&config.version)
  }

  pub fn with_namespace(mut self, namespace: &str) -> Self {
    self.namespace = namespace.to_string();
    self
  }

  pub fn with_version(mut self, version: &str) -> Self {
    self.version = version.to_string();
    self
  }

  /// The scope new entries are tagged with and reads are checked against.
  pub fn scope(&self) -> String {
    match self.scope.read() {
      Ok(scope) => scope.clone(),
      Err(poisoned) => poisoned.into_inner().clone(),
    }
  }

  /// Switch the current scope (team). Entries of other scopes stay stored
  /// but are ignored by reads.
  pub fn set_scope(&self, scope: &str) {
    let mut guard = match self.scope.write() {
      Ok(guard) => guard,
      Err(poisoned) => poisoned.into_inner(),
    };
    if *guard != scope {
      debug!("Cache scope changed: '{}' -> '{}'", guard, scope);
      *guard = scope.to_string();
    }
  }

  fn durable_key(&self, key: &str) -> String {
    format!("{}{}", self.namespace, key)
  }

  fn backup_key(&self, key: &str) -> String {
    format!("{}{}{}", self.namespace, key, BACKUP_SUFFIX)
  }

  /// Store `value` under `key` in every tier.
  pub fn set<T: Serialize>(&self, key: &str, value: &T) {
    self.set_at(key, value, Utc::now());
  }

  /// Store `value` as if written at `stored_at`.
  pub fn set_at<T: Serialize>(&self, key: &str, value: &T, stored_at: DateTime<Utc>) {
    let value = match serde_json::to_value(value) {
      Ok(v) => v,
      Err(e) => {
        warn!("Failed to serialize cache value {}: {}", key, e);
        return;
      }
    };
    let count = value.as_array().map(Vec::len);

    let scope = self.scope();
    let entry = CacheEntry::new(value, &scope, &self.version, stored_at);
    let data = match serde_json::to_string(&entry) {
      Ok(data) => data,
      Err(e) => {
        warn!("Failed to serialize cache entry {}: {}", key, e);
        return;
      }
    };

    let durable_key = self.durable_key(key);
    let writes = [
      (&self.memory, durable_key.clone()),
      (&self.durable, durable_key),
      (&self.session, self.backup_key(key)),
    ];
    for (tier, tier_key) in writes {
      if let Err(e) = tier.write(&tier_key, &data) {
        warn!("Cache write to {} tier failed for {}: {}", tier.name(), key, e);
      }
    }

    match count {
      Some(n) => info!("Cache stored: {} ({} items, scope '{}')", key, n, scope),
      None => info!("Cache stored: {} (scope '{}')", key, scope),
    }
  }

  /// Look up `key`, returning the first in-scope hit.
  pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
    self.get_with_source(key).map(|(value, _)| value)
  }

  /// Look up `key` and report which tier answered.
  pub fn get_with_source<T: DeserializeOwned>(&self, key: &str) -> Option<(T, CacheSource)> {
    let durable_key = self.durable_key(key);
    let lookups = [
      (&self.memory, durable_key.clone(), CacheSource::Memory),
      (&self.durable, durable_key, CacheSource::Durable),
      (&self.session, self.backup_key(key), CacheSource::SessionBackup),
    ];
    let scope = self.scope();

    for (tier, tier_key, source) in lookups {
      let Some((raw, entry)) = read_entry(&**tier, &tier_key) else {
        continue;
      };

      if let Err(e) = entry.check_scope(&scope) {
        debug!("Ignoring {} cache hit for {}: {}", tier.name(), key, e);
        continue;
      }

      let value = match serde_json::from_value::<T>(entry.value) {
        Ok(v) => v,
        Err(e) => {
          warn!("Cached {} in {} tier has unexpected shape: {}", key, tier.name(), e);
          continue;
        }
      };

      if source != CacheSource::Memory {
        // Promote so the next read is served from memory
        if let Err(e) = self.memory.write(&self.durable_key(key), &raw) {
          debug!("Failed to promote {} into memory: {}", key, e);
        }
      }

      debug!("Cache hit in {} tier: {}", tier.name(), key);
      return Some((value, source));
    }

    debug!("Cache miss: {}", key);
    None
  }

  /// Remove one key from every tier, or every namespaced key when `key` is None.
  pub fn clear(&self, key: Option<&str>) {
    let tiers = [&self.memory, &self.durable, &self.session];

    match key {
      Some(key) => {
        for tier in tiers {
          let result = tier
            .remove(&self.durable_key(key))
            .and_then(|_| tier.remove(&self.backup_key(key)));
          if let Err(e) = result {
            warn!("Failed to clear {} from {} tier: {}", key, tier.name(), e);
          }
        }
        info!("Cache cleared: {}", key);
      }
      None => {
        for tier in tiers {
          match tier.remove_prefix(&self.namespace) {
            Ok(n) => debug!("Removed {} entries from {} tier", n, tier.name()),
            Err(e) => warn!("Failed to clear {} tier: {}", tier.name(), e),
          }
        }
        info!("Entire cache cleared");
      }
    }
  }

  /// Drop everything held by the session backup tier, namespaced or not.
  pub fn reset_session_tier(&self) {
    match self.session.remove_prefix("") {
      Ok(n) => debug!("Session backup reset ({} entries)", n),
      Err(e) => warn!("Failed to reset session backup: {}", e),
    }
  }

  /// Whether the durable entry for `key` is younger than `max_age`.
  pub fn is_valid(&self, key: &str, max_age: Duration) -> bool {
    self.is_valid_at(key, max_age, Utc::now())
  }

  /// [`is_valid`](Self::is_valid) evaluated at an explicit instant.
  pub fn is_valid_at(&self, key: &str, max_age: Duration, now: DateTime<Utc>) -> bool {
    let Some((_, entry)) = read_entry(&*self.durable, &self.durable_key(key)) else {
      return false;
    };
    let max_age_millis = i64::try_from(max_age.as_millis()).unwrap_or(i64::MAX);
    entry.age_millis(now) < max_age_millis
  }
}

/// Read and parse a raw entry; read failures and malformed documents are misses.
fn read_entry(tier: &dyn CacheTier, key: &str) -> Option<(String, CacheEntry<Value>)> {
  let raw = match tier.read(key) {
    Ok(Some(raw)) => raw,
    Ok(None) => return None,
    Err(e) => {
      warn!("Cache read from {} tier failed for {}: {}", tier.name(), key, e);
      return None;
    }
  };

  match serde_json::from_str::<CacheEntry<Value>>(&raw) {
    Ok(entry) => Some((raw, entry)),
    Err(e) => {
      warn!("Malformed entry in {} tier for {}: {}", tier.name(), key, e);
      None
    }
  }
}
