//! Meal client with cache-first reference data.

use std::time::Duration;

use tracing::{info, warn};

use crate::cache::{Cacheable, TieredCache};
use crate::error::SyncError;

use super::client::MealClient;
use super::types::{StaffMember, SupplierRecord};

/// Wraps [`MealClient`] so reference lists come from the tiered cache while
/// fresh, are refetched when stale, and fall back to stale data offline.
#[derive(Clone)]
pub struct CachedMealClient {
  inner: MealClient,
  cache: TieredCache,
  max_age: Duration,
}

/// Where a reference list came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
  /// Cached entry younger than the max age
  Cached,
  /// Fetched from the backend just now
  Fetched,
  /// Backend unreachable; an expired cache entry was served
  Stale,
}

impl CachedMealClient {
  pub fn new(inner: MealClient, cache: TieredCache, max_age: Duration) -> Self {
    Self {
      inner,
      cache,
      max_age,
    }
  }

  pub fn inner(&self) -> &MealClient {
    &self.inner
  }

  /// Cache key of the supplier list for `project`.
  pub fn suppliers_key(project: &str) -> String {
    format!("{}_{}", SupplierRecord::collection_key(), project)
  }

  /// Cache key of the staff roster; the team is the cache scope.
  pub fn staff_key() -> String {
    StaffMember::collection_key().to_string()
  }

  /// Active suppliers for `project`.
  pub async fn suppliers(
    &self,
    project: &str,
    refresh: bool,
  ) -> Result<(Vec<SupplierRecord>, Freshness), SyncError> {
    let key = Self::suppliers_key(project);
    let inner = self.inner.clone();
    let project = project.to_string();
    self
      .fetch(&key, refresh, || async move { inner.get_suppliers(&project).await })
      .await
  }

  /// Staff roster for `team`.
  pub async fn staff(
    &self,
    team: &str,
    refresh: bool,
  ) -> Result<(Vec<StaffMember>, Freshness), SyncError> {
    let key = Self::staff_key();
    let inner = self.inner.clone();
    let team = team.to_string();
    self
      .fetch(&key, refresh, || async move { inner.get_staff(&team).await })
      .await
  }

  async fn fetch<T, F, Fut>(
    &self,
    key: &str,
    refresh: bool,
    fetcher: F,
  ) -> Result<(Vec<T>, Freshness), SyncError>
  where
    T: Cacheable,
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<Vec<T>, SyncError>>,
  {
    if !refresh && self.cache.is_valid(key, self.max_age) {
      if let Some(items) = self.cache.get::<Vec<T>>(key) {
        return Ok((items, Freshness::Cached));
      }
    }

    match fetcher().await {
      Ok(items) => {
        info!("Fetched {} {} record(s)", items.len(), T::entity_type());
        self.cache.set(key, &items);
        Ok((items, Freshness::Fetched))
      }
      Err(e) => match self.cache.get::<Vec<T>>(key) {
        Some(items) => {
          warn!(
            "Failed to refresh {} list, serving cached copy: {}",
            T::entity_type(),
            e
          );
          Ok((items, Freshness::Stale))
        }
        None => Err(e),
      },
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::{CacheConfig, ServerConfig};
  use crate::db::Database;
  use chrono::{Duration as ChronoDuration, Utc};

  fn client() -> CachedMealClient {
    let db = Database::open_in_memory().unwrap();
    let cache = TieredCache::from_config(&CacheConfig::default(), &db);
    cache.set_scope("700TA");
    // Nothing listens on port 9; every fetch fails fast
    let server = ServerConfig {
      origin: "http://127.0.0.1".to_string(),
      loopback_port: 9,
      request_timeout_secs: 2,
    };
    let inner = MealClient::new(&server).unwrap();
    CachedMealClient::new(inner, cache, Duration::from_secs(60 * 60))
  }

  fn record(name: &str) -> SupplierRecord {
    SupplierRecord {
      name: name.to_string(),
      closure_code: Some("F01".to_string()),
      unit_price: Some(9.0),
      supplier_type: None,
    }
  }

  #[tokio::test]
  async fn test_valid_cache_skips_network() {
    let client = client();
    let key = CachedMealClient::suppliers_key("OBRA1");
    client.cache.set(&key, &vec![record("MARMITARIA SOL")]);

    let (items, freshness) = client.suppliers("OBRA1", false).await.unwrap();
    assert_eq!(freshness, Freshness::Cached);
    assert_eq!(items, vec![record("MARMITARIA SOL")]);
  }

  #[tokio::test]
  async fn test_stale_cache_served_when_offline() {
    let client = client();
    let key = CachedMealClient::suppliers_key("OBRA1");
    let old = Utc::now() - ChronoDuration::hours(5);
    client
      .cache
      .set_at(&key, &vec![record("MARMITARIA SOL")], old);

    let (items, freshness) = client.suppliers("OBRA1", false).await.unwrap();
    assert_eq!(freshness, Freshness::Stale);
    assert_eq!(items.len(), 1);
  }

  #[tokio::test]
  async fn test_offline_without_cache_is_error() {
    let client = client();
    let err = client.staff("700TA", false).await.unwrap_err();
    assert!(matches!(err, SyncError::Network(_)));
  }
}
