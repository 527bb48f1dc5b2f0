//! Offline write queues and the background worker that delivers them.
//!
//! - [`QueueStore`] holds pending writes durably; only the foreground uses it
//! - [`BackgroundSyncWorker`] delivers a mirror of each queue when triggered
//! - [`ForegroundQueueBridge`] keeps the mirrors in step and applies the
//!   worker's clear instructions

mod bridge;
mod delivery;
mod protocol;
mod queue;
mod worker;

pub use bridge::ForegroundQueueBridge;
pub use protocol::{ClientMessage, WorkerMessage};
pub use queue::{QueueKind, QueueStore};
pub use worker::BackgroundSyncWorker;
