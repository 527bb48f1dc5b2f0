//! Foreground side of the sync protocol.

use serde_json::Value;
use tracing::{debug, info};

use super::protocol::{ClientMessage, WorkerMessage, WorkerReply};
use super::queue::{PendingWriteItem, QueueKind, QueueStore};
use super::worker::WorkerHandle;
use crate::error::SyncError;
use crate::event::Trigger;

/// Owns the durable queues and keeps the worker's mirrors in step with them.
///
/// Every mutation of a durable queue is followed by a full replace of the
/// matching mirror.
#[derive(Clone)]
pub struct ForegroundQueueBridge {
  store: QueueStore,
  worker: WorkerHandle,
}

impl ForegroundQueueBridge {
  pub fn new(store: QueueStore, worker: WorkerHandle) -> Self {
    Self { store, worker }
  }

  fn push_mirror(&self, kind: QueueKind) -> Result<(), SyncError> {
    let queue = self.store.list(kind)?;
    debug!("Pushing {} mirror ({} items)", kind, queue.len());
    self.worker.send(WorkerMessage::replace(kind, queue))
  }

  /// Queue a write for background delivery.
  pub fn enqueue(&self, kind: QueueKind, payload: &Value) -> Result<PendingWriteItem, SyncError> {
    let item = self.store.enqueue(kind, payload)?;
    info!(id = item.id, fingerprint = %item.fingerprint(), "Queued {} for sync", kind);
    self.push_mirror(kind)?;
    Ok(item)
  }

  /// Drop every pending item of `kind`. Returns how many were removed.
  pub fn clear(&self, kind: QueueKind) -> Result<usize, SyncError> {
    let removed = self.store.clear(kind)?;
    info!("Cleared {} pending {} item(s)", removed, kind);
    self.push_mirror(kind)?;
    Ok(removed)
  }

  pub fn pending(&self, kind: QueueKind) -> Result<Vec<PendingWriteItem>, SyncError> {
    self.store.list(kind)
  }

  pub fn count(&self, kind: QueueKind) -> Result<usize, SyncError> {
    self.store.count(kind)
  }

  /// Re-push both mirrors; the worker starts with nothing.
  pub fn resync(&self) -> Result<(), SyncError> {
    for kind in QueueKind::ALL {
      self.push_mirror(kind)?;
    }
    Ok(())
  }

  /// Refresh both mirrors from the durable store, then pass `trigger` on.
  ///
  /// Other processes enqueue into the same store, so the mirrors this bridge
  /// pushed earlier may be behind.
  pub fn trigger(&self, trigger: Trigger) -> Result<(), SyncError> {
    self.resync()?;
    self.worker.trigger(trigger)
  }

  pub fn force_sync(&self) -> Result<(), SyncError> {
    self.worker.send(WorkerMessage::ForceBackgroundSync)
  }

  pub fn keep_alive(&self) -> Result<(), SyncError> {
    self.worker.send(WorkerMessage::KeepAlive)
  }

  pub fn save_login(&self, data: Value) -> Result<(), SyncError> {
    self.worker.send(WorkerMessage::SaveLogin { data })
  }

  pub fn clear_login(&self) -> Result<(), SyncError> {
    self.worker.send(WorkerMessage::ClearLogin)
  }

  pub async fn get_login(&self) -> Result<Option<Value>, SyncError> {
    match self.worker.request(WorkerMessage::GetLogin).await? {
      WorkerReply::LoginData { data } => Ok(data),
    }
  }

  /// Apply a clear instruction from the worker.
  pub fn handle_client_message(&self, message: ClientMessage) -> Result<(), SyncError> {
    let kind = message.kind();
    let removed = self.store.clear_through(kind, message.through_id())?;
    info!(
      "Removed {} delivered {} item(s) through id {}",
      removed,
      kind,
      message.through_id()
    );
    self.push_mirror(kind)
  }

  pub async fn wait_idle(&self) -> Result<(), SyncError> {
    self.worker.wait_idle().await
  }
}
