//! Error taxonomy for the cache and sync subsystem.
//!
//! Application plumbing such as config loading reports through
//! `color_eyre::Result`. Failures that have to be classified, such as a storage
//! tier that failed or a delivery that should be retried, use [`SyncError`].

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
  /// Serialization, quota or SQLite failure in a storage tier.
  #[error("storage fault: {0}")]
  Storage(String),

  /// Delivery attempt failed to reach the backend or timed out.
  #[error("network fault: {0}")]
  Network(String),

  /// Backend answered with a truthy `error` field.
  #[error("backend rejected write: {0}")]
  Application(String),

  /// Cached entry was written under another team.
  #[error("cached entry belongs to scope '{found}', current scope is '{current}'")]
  ScopeMismatch { found: String, current: String },

  /// Malformed or unknown inter-context message.
  #[error("protocol error: {0}")]
  Protocol(String),

  #[error("sync worker is not running")]
  WorkerGone,
}

impl SyncError {
  /// Network and application faults are retried on the next drain pass.
  pub fn is_retryable(&self) -> bool {
    matches!(self, SyncError::Network(_) | SyncError::Application(_))
  }
}

impl From<rusqlite::Error> for SyncError {
  fn from(e: rusqlite::Error) -> Self {
    SyncError::Storage(e.to_string())
  }
}

impl From<serde_json::Error> for SyncError {
  fn from(e: serde_json::Error) -> Self {
    SyncError::Storage(e.to_string())
  }
}

impl From<reqwest::Error> for SyncError {
  fn from(e: reqwest::Error) -> Self {
    if e.is_timeout() {
      SyncError::Network(format!("request timed out: {}", e))
    } else {
      SyncError::Network(e.to_string())
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_retryable_faults() {
    assert!(SyncError::Network("down".into()).is_retryable());
    assert!(SyncError::Application("bad payload".into()).is_retryable());
    assert!(!SyncError::Storage("quota".into()).is_retryable());
    assert!(!SyncError::WorkerGone.is_retryable());
  }

  #[test]
  fn test_json_errors_are_storage_faults() {
    let err: SyncError = serde_json::from_str::<serde_json::Value>("{oops")
      .unwrap_err()
      .into();
    assert!(matches!(err, SyncError::Storage(_)));
  }
}
