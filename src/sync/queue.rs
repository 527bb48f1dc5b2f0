//! Pending writes and the durable queue that owns them.

use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;

use crate::db::Database;
use crate::error::SyncError;
use crate::notify::Notification;

/// The two independent write queues.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum QueueKind {
  /// Meal orders, posted to `/api/salvar-pedido`
  Order,
  /// Temperature readings, posted to `/api/afericao-temperatura`
  Temperature,
}

impl QueueKind {
  pub const ALL: [QueueKind; 2] = [QueueKind::Order, QueueKind::Temperature];

  pub fn as_str(self) -> &'static str {
    match self {
      QueueKind::Order => "order",
      QueueKind::Temperature => "temperature",
    }
  }

  /// Backend path a pending write of this kind is posted to.
  pub fn endpoint(self) -> &'static str {
    match self {
      QueueKind::Order => "/api/salvar-pedido",
      QueueKind::Temperature => "/api/afericao-temperatura",
    }
  }

  /// Notification shown after a fully successful drain of `count` items.
  pub fn success_notification(self, count: usize) -> Notification {
    match self {
      QueueKind::Order => Notification::new(
        "Orders sent",
        format!("{} order(s) were sent automatically!", count),
        "pedidos-enviados",
      ),
      QueueKind::Temperature => Notification::new(
        "Temperature checks sent",
        format!("{} temperature check(s) were sent automatically!", count),
        "temperaturas-enviadas",
      ),
    }
  }

  fn parse(s: &str) -> Option<Self> {
    match s {
      "order" => Some(QueueKind::Order),
      "temperature" => Some(QueueKind::Temperature),
      _ => None,
    }
  }
}

impl fmt::Display for QueueKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A write that could not complete immediately.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingWriteItem {
  /// Row id in the durable queue; monotonic per database
  pub id: i64,
  pub kind: QueueKind,
  pub payload: Value,
  pub enqueued_at: DateTime<Utc>,
}

impl PendingWriteItem {
  /// Short digest of the payload, used to spot duplicate deliveries in logs.
  pub fn fingerprint(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.payload.to_string().as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..12].to_string()
  }
}

/// Authoritative, durable store of pending writes.
///
/// Only the foreground touches this store; the sync worker sees copies.
#[derive(Clone)]
pub struct QueueStore {
  db: Database,
}

impl QueueStore {
  pub fn new(db: Database) -> Self {
    Self { db }
  }

  /// Append a payload to the queue of `kind`.
  pub fn enqueue(&self, kind: QueueKind, payload: &Value) -> Result<PendingWriteItem, SyncError> {
    let enqueued_at = Utc::now();
    let data = serde_json::to_string(payload)?;

    let id = self.db.with_conn(|conn| {
      conn.execute(
        "INSERT INTO pending_writes (kind, payload, enqueued_at) VALUES (?, ?, ?)",
        params![kind.as_str(), data, enqueued_at.to_rfc3339()],
      )?;
      Ok(conn.last_insert_rowid())
    })?;

    Ok(PendingWriteItem {
      id,
      kind,
      payload: payload.clone(),
      enqueued_at,
    })
  }

  /// All pending items of `kind`, oldest first.
  pub fn list(&self, kind: QueueKind) -> Result<Vec<PendingWriteItem>, SyncError> {
    let rows: Vec<(i64, String, String, String)> = self.db.with_conn(|conn| {
      let mut stmt = conn.prepare(
        "SELECT id, kind, payload, enqueued_at FROM pending_writes
         WHERE kind = ? ORDER BY id",
      )?;
      let rows = stmt
        .query_map(params![kind.as_str()], |row| {
          Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
      Ok(rows)
    })?;

    rows
      .into_iter()
      .map(|(id, kind_str, payload, enqueued_at)| {
        let kind = QueueKind::parse(&kind_str)
          .ok_or_else(|| SyncError::Storage(format!("Unknown queue kind '{}'", kind_str)))?;
        let enqueued_at = DateTime::parse_from_rfc3339(&enqueued_at)
          .map(|dt| dt.with_timezone(&Utc))
          .map_err(|e| SyncError::Storage(format!("Bad enqueue time '{}': {}", enqueued_at, e)))?;
        Ok(PendingWriteItem {
          id,
          kind,
          payload: serde_json::from_str(&payload)?,
          enqueued_at,
        })
      })
      .collect()
  }

  pub fn count(&self, kind: QueueKind) -> Result<usize, SyncError> {
    let count: i64 = self.db.with_conn(|conn| {
      conn.query_row(
        "SELECT COUNT(*) FROM pending_writes WHERE kind = ?",
        params![kind.as_str()],
        |row| row.get(0),
      )
    })?;
    Ok(count as usize)
  }

  /// Remove every item of `kind`.
  pub fn clear(&self, kind: QueueKind) -> Result<usize, SyncError> {
    self.db.with_conn(|conn| {
      conn.execute(
        "DELETE FROM pending_writes WHERE kind = ?",
        params![kind.as_str()],
      )
    })
  }

  /// Remove items of `kind` with id up to and including `through_id`.
  pub fn clear_through(&self, kind: QueueKind, through_id: i64) -> Result<usize, SyncError> {
    self.db.with_conn(|conn| {
      conn.execute(
        "DELETE FROM pending_writes WHERE kind = ? AND id <= ?",
        params![kind.as_str(), through_id],
      )
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn store() -> QueueStore {
    QueueStore::new(Database::open_in_memory().unwrap())
  }

  #[test]
  fn test_enqueue_and_list_per_kind() {
    let store = store();
    store
      .enqueue(QueueKind::Order, &json!({"tipo_refeicao": "almoco"}))
      .unwrap();
    store
      .enqueue(QueueKind::Temperature, &json!({"pedido_id": 7}))
      .unwrap();
    store
      .enqueue(QueueKind::Order, &json!({"tipo_refeicao": "janta"}))
      .unwrap();

    let orders = store.list(QueueKind::Order).unwrap();
    assert_eq!(orders.len(), 2);
    assert_eq!(orders[0].payload["tipo_refeicao"], "almoco");
    assert_eq!(orders[1].payload["tipo_refeicao"], "janta");
    assert!(orders[0].id < orders[1].id);
    assert_eq!(store.count(QueueKind::Temperature).unwrap(), 1);
  }

  #[test]
  fn test_clear_through_keeps_later_items() {
    let store = store();
    let first = store.enqueue(QueueKind::Order, &json!({"n": 1})).unwrap();
    let second = store.enqueue(QueueKind::Order, &json!({"n": 2})).unwrap();
    let third = store.enqueue(QueueKind::Order, &json!({"n": 3})).unwrap();
    store.enqueue(QueueKind::Temperature, &json!({"n": 4})).unwrap();

    assert_eq!(store.clear_through(QueueKind::Order, second.id).unwrap(), 2);

    let remaining = store.list(QueueKind::Order).unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, third.id);
    assert!(first.id < third.id);
    assert_eq!(store.count(QueueKind::Temperature).unwrap(), 1);
  }

  #[test]
  fn test_ids_are_not_reused_after_clear() {
    let store = store();
    let first = store.enqueue(QueueKind::Order, &json!({})).unwrap();
    store.clear(QueueKind::Order).unwrap();
    let second = store.enqueue(QueueKind::Order, &json!({})).unwrap();
    assert!(second.id > first.id);
  }

  #[test]
  fn test_fingerprint_tracks_payload() {
    let store = store();
    let a = store.enqueue(QueueKind::Order, &json!({"n": 1})).unwrap();
    let b = store.enqueue(QueueKind::Order, &json!({"n": 1})).unwrap();
    let c = store.enqueue(QueueKind::Order, &json!({"n": 2})).unwrap();

    assert_eq!(a.fingerprint().len(), 12);
    assert_eq!(a.fingerprint(), b.fingerprint());
    assert_ne!(a.fingerprint(), c.fingerprint());
  }

  #[test]
  fn test_success_notification_tags() {
    let n = QueueKind::Order.success_notification(3);
    assert_eq!(n.tag, "pedidos-enviados");
    assert!(n.body.contains('3'));
    assert_eq!(
      QueueKind::Temperature.success_notification(1).tag,
      "temperaturas-enviadas"
    );
  }
}
