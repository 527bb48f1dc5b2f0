//! Messages exchanged between the foreground bridge and the sync worker.
//!
//! On the wire every message is a JSON object tagged by `type`. Parsing
//! validates the tag and payload shape; anything else is a protocol error.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::queue::{PendingWriteItem, QueueKind};
use crate::error::SyncError;

/// Foreground → worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerMessage {
  /// Replace the order mirror
  UpdateDatabaseQueue { queue: Vec<PendingWriteItem> },
  /// Replace the temperature mirror
  UpdateTemperaturaQueue { queue: Vec<PendingWriteItem> },
  /// Empty the order mirror
  ClearDatabaseQueue,
  /// Empty the temperature mirror
  ClearTemperaturaQueue,
  ForceBackgroundSync,
  KeepAlive,
  SaveLogin { data: Value },
  ClearLogin,
  GetLogin,
}

impl WorkerMessage {
  /// Replace message carrying the full queue of `kind`.
  pub fn replace(kind: QueueKind, queue: Vec<PendingWriteItem>) -> Self {
    match kind {
      QueueKind::Order => WorkerMessage::UpdateDatabaseQueue { queue },
      QueueKind::Temperature => WorkerMessage::UpdateTemperaturaQueue { queue },
    }
  }

  pub fn parse(raw: &str) -> Result<Self, SyncError> {
    serde_json::from_str(raw).map_err(|e| SyncError::Protocol(e.to_string()))
  }

  pub fn name(&self) -> &'static str {
    match self {
      WorkerMessage::UpdateDatabaseQueue { .. } => "UPDATE_DATABASE_QUEUE",
      WorkerMessage::UpdateTemperaturaQueue { .. } => "UPDATE_TEMPERATURA_QUEUE",
      WorkerMessage::ClearDatabaseQueue => "CLEAR_DATABASE_QUEUE",
      WorkerMessage::ClearTemperaturaQueue => "CLEAR_TEMPERATURA_QUEUE",
      WorkerMessage::ForceBackgroundSync => "FORCE_BACKGROUND_SYNC",
      WorkerMessage::KeepAlive => "KEEP_ALIVE",
      WorkerMessage::SaveLogin { .. } => "SAVE_LOGIN",
      WorkerMessage::ClearLogin => "CLEAR_LOGIN",
      WorkerMessage::GetLogin => "GET_LOGIN",
    }
  }
}

/// Worker → foreground reply to a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerReply {
  LoginData { data: Option<Value> },
}

/// Worker → foreground instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
  /// Delete durable orders with id <= `through_id`
  ClearDatabaseQueue {
    #[serde(rename = "throughId")]
    through_id: i64,
  },
  /// Delete durable temperature checks with id <= `through_id`
  ClearTemperaturaQueue {
    #[serde(rename = "throughId")]
    through_id: i64,
  },
}

impl ClientMessage {
  pub fn clear_through(kind: QueueKind, through_id: i64) -> Self {
    match kind {
      QueueKind::Order => ClientMessage::ClearDatabaseQueue { through_id },
      QueueKind::Temperature => ClientMessage::ClearTemperaturaQueue { through_id },
    }
  }

  pub fn kind(&self) -> QueueKind {
    match self {
      ClientMessage::ClearDatabaseQueue { .. } => QueueKind::Order,
      ClientMessage::ClearTemperaturaQueue { .. } => QueueKind::Temperature,
    }
  }

  pub fn through_id(&self) -> i64 {
    match *self {
      ClientMessage::ClearDatabaseQueue { through_id }
      | ClientMessage::ClearTemperaturaQueue { through_id } => through_id,
    }
  }
}
