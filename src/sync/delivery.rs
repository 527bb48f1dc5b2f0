use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;

use super::queue::QueueKind;
use crate::api::MealClient;
use crate::error::SyncError;

/// One write attempt against the backend.
pub trait Deliver: Send + Sync + 'static {
  fn deliver<'a>(&'a self, kind: QueueKind, payload: &'a Value) -> BoxFuture<'a, Result<(), SyncError>>;
}

impl Deliver for MealClient {
  fn deliver<'a>(&'a self, kind: QueueKind, payload: &'a Value) -> BoxFuture<'a, Result<(), SyncError>> {
    self.submit(kind, payload).boxed()
  }
}
