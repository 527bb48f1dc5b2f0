//! Background sync worker.
//!
//! The worker is a reactor task that owns a disposable mirror of each pending
//! write queue. It never touches durable storage: mirrors change only through
//! replace messages from the foreground, and a fully successful drain is
//! reported back as a clear instruction for the foreground to apply.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::delivery::Deliver;
use super::protocol::{ClientMessage, WorkerMessage, WorkerReply};
use super::queue::{PendingWriteItem, QueueKind};
use crate::error::SyncError;
use crate::event::Trigger;
use crate::notify::Notifier;

/// Worker-side copy of one queue plus its drain state.
#[derive(Debug, Default)]
struct QueueMirror {
  items: Vec<PendingWriteItem>,
  draining: bool,
  rerun: bool,
  /// Highest id covered by a fully successful drain
  delivered_through: i64,
}

/// Outcome of one drain pass over a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainReport {
  pub kind: QueueKind,
  pub attempted: usize,
  pub succeeded: usize,
  pub failed: usize,
  /// Highest item id in the snapshot
  pub through_id: i64,
}

enum WorkerInput {
  Message(WorkerMessage, Option<oneshot::Sender<WorkerReply>>),
  Trigger(Trigger),
  Flush(oneshot::Sender<()>),
}

/// Foreground handle to a running worker.
#[derive(Clone)]
pub struct WorkerHandle {
  tx: mpsc::UnboundedSender<WorkerInput>,
}

impl WorkerHandle {
  /// Post a message without waiting for a reply.
  pub fn send(&self, message: WorkerMessage) -> Result<(), SyncError> {
    self
      .tx
      .send(WorkerInput::Message(message, None))
      .map_err(|_| SyncError::WorkerGone)
  }

  /// Post a message and wait for its reply.
  pub async fn request(&self, message: WorkerMessage) -> Result<WorkerReply, SyncError> {
    let (reply_tx, reply_rx) = oneshot::channel();
    self
      .tx
      .send(WorkerInput::Message(message, Some(reply_tx)))
      .map_err(|_| SyncError::WorkerGone)?;
    reply_rx.await.map_err(|_| SyncError::WorkerGone)
  }

  pub fn trigger(&self, trigger: Trigger) -> Result<(), SyncError> {
    self
      .tx
      .send(WorkerInput::Trigger(trigger))
      .map_err(|_| SyncError::WorkerGone)
  }

  /// Resolve once no drain is in progress or pending a rerun.
  pub async fn wait_idle(&self) -> Result<(), SyncError> {
    let (done_tx, done_rx) = oneshot::channel();
    self
      .tx
      .send(WorkerInput::Flush(done_tx))
      .map_err(|_| SyncError::WorkerGone)?;
    done_rx.await.map_err(|_| SyncError::WorkerGone)
  }
}

pub struct BackgroundSyncWorker;

impl BackgroundSyncWorker {
  /// Start the worker.
  ///
  /// Returns the handle, the receiver of clear instructions for the
  /// foreground, and the reactor task. The reactor stops once every handle
  /// has been dropped.
  pub fn spawn<D: Deliver, N: Notifier>(
    delivery: Arc<D>,
    notifier: Arc<N>,
    attempt_timeout: Duration,
  ) -> (
    WorkerHandle,
    mpsc::UnboundedReceiver<ClientMessage>,
    JoinHandle<()>,
  ) {
    let (tx, inbox) = mpsc::unbounded_channel();
    let (client_tx, client_rx) = mpsc::unbounded_channel();
    let (done_tx, done_rx) = mpsc::unbounded_channel();

    let reactor = Reactor {
      delivery,
      notifier,
      attempt_timeout,
      mirrors: QueueKind::ALL
        .iter()
        .map(|kind| (*kind, QueueMirror::default()))
        .collect(),
      login: None,
      client_tx,
      done_tx,
      idle_waiters: Vec::new(),
    };

    let task = tokio::spawn(reactor.run(inbox, done_rx));
    info!("Background sync worker started");

    (WorkerHandle { tx }, client_rx, task)
  }
}

struct Reactor<D, N> {
  delivery: Arc<D>,
  notifier: Arc<N>,
  attempt_timeout: Duration,
  mirrors: BTreeMap<QueueKind, QueueMirror>,
  login: Option<Value>,
  client_tx: mpsc::UnboundedSender<ClientMessage>,
  done_tx: mpsc::UnboundedSender<DrainReport>,
  idle_waiters: Vec<oneshot::Sender<()>>,
}

impl<D: Deliver, N: Notifier> Reactor<D, N> {
  async fn run(
    mut self,
    mut inbox: mpsc::UnboundedReceiver<WorkerInput>,
    mut done_rx: mpsc::UnboundedReceiver<DrainReport>,
  ) {
    loop {
      tokio::select! {
        input = inbox.recv() => match input {
          Some(input) => self.handle_input(input),
          None => break,
        },
        Some(report) = done_rx.recv() => self.finish_drain(report),
      }
    }
    info!("Background sync worker stopped");
  }

  fn mirror(&mut self, kind: QueueKind) -> &mut QueueMirror {
    self.mirrors.entry(kind).or_default()
  }

  fn handle_input(&mut self, input: WorkerInput) {
    match input {
      WorkerInput::Message(message, reply) => self.handle_message(message, reply),
      WorkerInput::Trigger(trigger) => self.handle_trigger(trigger),
      WorkerInput::Flush(waiter) => {
        self.idle_waiters.push(waiter);
        self.release_idle_waiters();
      }
    }
  }

  fn handle_message(&mut self, message: WorkerMessage, reply: Option<oneshot::Sender<WorkerReply>>) {
    debug!("Worker received {}", message.name());

    match message {
      WorkerMessage::UpdateDatabaseQueue { queue } => self.replace(QueueKind::Order, queue),
      WorkerMessage::UpdateTemperaturaQueue { queue } => self.replace(QueueKind::Temperature, queue),
      WorkerMessage::ClearDatabaseQueue => self.replace(QueueKind::Order, Vec::new()),
      WorkerMessage::ClearTemperaturaQueue => self.replace(QueueKind::Temperature, Vec::new()),
      WorkerMessage::ForceBackgroundSync => self.handle_trigger(Trigger::Forced),
      WorkerMessage::KeepAlive => debug!("Keep-alive received"),
      WorkerMessage::SaveLogin { data } => {
        self.login = Some(data);
        info!("Login cached in worker");
      }
      WorkerMessage::ClearLogin => {
        self.login = None;
        info!("Login cleared from worker");
      }
      WorkerMessage::GetLogin => {
        let answer = WorkerReply::LoginData {
          data: self.login.clone(),
        };
        match reply {
          Some(reply) => {
            if reply.send(answer).is_err() {
              debug!("Login requester went away");
            }
          }
          None => debug!("GET_LOGIN without a reply channel ignored"),
        }
      }
    }
  }

  fn replace(&mut self, kind: QueueKind, mut items: Vec<PendingWriteItem>) {
    let mirror = self.mirror(kind);
    // A replace read before the foreground applied our last clear still
    // carries delivered items; ids are never reused so they can be skipped
    let received = items.len();
    items.retain(|item| item.id > mirror.delivered_through);
    if items.len() < received {
      debug!(
        "Skipped {} already delivered {} item(s) through id {}",
        received - items.len(),
        kind,
        mirror.delivered_through
      );
    }
    debug!("{} mirror replaced ({} items)", kind, items.len());
    mirror.items = items;
  }

  fn handle_trigger(&mut self, trigger: Trigger) {
    match trigger {
      Trigger::Tick => {
        for kind in QueueKind::ALL {
          if !self.mirror(kind).items.is_empty() {
            self.start_drain(kind);
          }
        }
      }
      Trigger::ConnectivityRestored | Trigger::Forced => {
        info!("Sync triggered ({:?})", trigger);
        for kind in QueueKind::ALL {
          self.start_drain(kind);
        }
      }
    }
  }

  fn start_drain(&mut self, kind: QueueKind) {
    let mirror = self.mirror(kind);

    if mirror.draining {
      debug!("{} drain in progress, rerun scheduled", kind);
      mirror.rerun = true;
      return;
    }
    if mirror.items.is_empty() {
      debug!("No pending {} items", kind);
      return;
    }

    mirror.draining = true;
    let snapshot = mirror.items.clone();
    info!("Draining {} pending {} item(s)", snapshot.len(), kind);

    let delivery = Arc::clone(&self.delivery);
    let done_tx = self.done_tx.clone();
    let attempt_timeout = self.attempt_timeout;
    tokio::spawn(async move {
      let report = drain_pass(&*delivery, kind, snapshot, attempt_timeout).await;
      // The reactor owns the other end for its whole lifetime
      let _ = done_tx.send(report);
    });
  }

  fn finish_drain(&mut self, report: DrainReport) {
    let kind = report.kind;
    let mirror = self.mirror(kind);
    mirror.draining = false;

    if report.failed == 0 {
      // Drop the delivered snapshot now so a rerun cannot resend it before
      // the foreground's replace arrives
      mirror.items.retain(|item| item.id > report.through_id);
      mirror.delivered_through = mirror.delivered_through.max(report.through_id);
      let rerun = mirror.rerun;

      info!(
        "{} drain complete: {} sent{}",
        kind,
        report.succeeded,
        if rerun { ", rerun pending" } else { "" }
      );

      if self
        .client_tx
        .send(ClientMessage::clear_through(kind, report.through_id))
        .is_err()
      {
        warn!("Foreground gone, {} clear instruction dropped", kind);
      }
      if report.succeeded > 0 {
        self.notifier.notify(kind.success_notification(report.succeeded));
      }
    } else {
      warn!(
        "{} drain incomplete: {} of {} failed, queue kept for retry",
        kind, report.failed, report.attempted
      );
    }

    let mirror = self.mirror(kind);
    if mirror.rerun {
      mirror.rerun = false;
      self.start_drain(kind);
    }

    self.release_idle_waiters();
  }

  fn release_idle_waiters(&mut self) {
    if self.mirrors.values().any(|m| m.draining) {
      return;
    }
    for waiter in self.idle_waiters.drain(..) {
      let _ = waiter.send(());
    }
  }
}

/// Deliver every item of `snapshot` in order, one attempt each.
async fn drain_pass<D: Deliver + ?Sized>(
  delivery: &D,
  kind: QueueKind,
  snapshot: Vec<PendingWriteItem>,
  attempt_timeout: Duration,
) -> DrainReport {
  let mut report = DrainReport {
    kind,
    attempted: snapshot.len(),
    succeeded: 0,
    failed: 0,
    through_id: snapshot.iter().map(|item| item.id).max().unwrap_or(0),
  };

  for item in &snapshot {
    let result = match tokio::time::timeout(attempt_timeout, delivery.deliver(kind, &item.payload)).await
    {
      Ok(result) => result,
      Err(_) => Err(SyncError::Network(format!(
        "attempt timed out after {:?}",
        attempt_timeout
      ))),
    };

    match result {
      Ok(()) => {
        report.succeeded += 1;
        debug!(id = item.id, fingerprint = %item.fingerprint(), "{} delivered", kind);
      }
      Err(e) => {
        report.failed += 1;
        warn!(
          id = item.id,
          fingerprint = %item.fingerprint(),
          retryable = e.is_retryable(),
          "{} delivery failed: {}",
          kind,
          e
        );
      }
    }
  }

  report
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::notify::tests::RecordingNotifier;
  use chrono::Utc;
  use futures::future::{BoxFuture, FutureExt};
  use serde_json::json;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::Mutex;

  /// Delivery backend that fails payloads marked `"fail": true`.
  #[derive(Default)]
  struct FakeDelivery {
    delay: Duration,
    calls: Mutex<Vec<Value>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
  }

  impl FakeDelivery {
    fn slow(delay: Duration) -> Self {
      Self {
        delay,
        ..Self::default()
      }
    }

    fn calls(&self) -> Vec<Value> {
      self.calls.lock().unwrap().clone()
    }
  }

  impl Deliver for FakeDelivery {
    fn deliver<'a>(&'a self, _kind: QueueKind, payload: &'a Value) -> BoxFuture<'a, Result<(), SyncError>> {
      async move {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
          tokio::time::sleep(self.delay).await;
        }
        self.calls.lock().unwrap().push(payload.clone());
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if payload["fail"] == json!(true) {
          Err(SyncError::Application("Erro ao salvar pedido".to_string()))
        } else {
          Ok(())
        }
      }
      .boxed()
    }
  }

  fn item(id: i64, payload: Value) -> PendingWriteItem {
    PendingWriteItem {
      id,
      kind: QueueKind::Order,
      payload,
      enqueued_at: Utc::now(),
    }
  }

  fn spawn(
    delivery: &Arc<FakeDelivery>,
    notifier: &Arc<RecordingNotifier>,
  ) -> (WorkerHandle, mpsc::UnboundedReceiver<ClientMessage>) {
    let (handle, client_rx, _task) = BackgroundSyncWorker::spawn(
      Arc::clone(delivery),
      Arc::clone(notifier),
      Duration::from_secs(30),
    );
    (handle, client_rx)
  }

  #[tokio::test]
  async fn test_full_success_clears_and_notifies() {
    let delivery = Arc::new(FakeDelivery::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let (worker, mut client_rx) = spawn(&delivery, &notifier);

    let queue = (1..=3).map(|id| item(id, json!({"n": id}))).collect();
    worker.send(WorkerMessage::replace(QueueKind::Order, queue)).unwrap();
    worker.trigger(Trigger::Forced).unwrap();
    worker.wait_idle().await.unwrap();

    assert_eq!(delivery.calls().len(), 3);
    assert_eq!(
      client_rx.try_recv().unwrap(),
      ClientMessage::ClearDatabaseQueue { through_id: 3 }
    );
    let sent = notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].tag, "pedidos-enviados");
    assert!(sent[0].body.starts_with("3 "));
  }

  #[tokio::test]
  async fn test_partial_failure_keeps_queue() {
    let delivery = Arc::new(FakeDelivery::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let (worker, mut client_rx) = spawn(&delivery, &notifier);

    let queue = vec![
      item(1, json!({"n": 1})),
      item(2, json!({"n": 2, "fail": true})),
      item(3, json!({"n": 3})),
    ];
    worker.send(WorkerMessage::replace(QueueKind::Order, queue)).unwrap();
    worker.trigger(Trigger::Forced).unwrap();
    worker.wait_idle().await.unwrap();

    // Every item is still attempted once
    assert_eq!(delivery.calls().len(), 3);
    assert!(client_rx.try_recv().is_err());
    assert!(notifier.sent().is_empty());

    // Retained mirror is retried in full
    worker.trigger(Trigger::Tick).unwrap();
    worker.wait_idle().await.unwrap();
    assert_eq!(delivery.calls().len(), 6);
  }

  #[tokio::test]
  async fn test_empty_mirror_runs_no_pass() {
    let delivery = Arc::new(FakeDelivery::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let (worker, mut client_rx) = spawn(&delivery, &notifier);

    worker.trigger(Trigger::ConnectivityRestored).unwrap();
    worker.send(WorkerMessage::ForceBackgroundSync).unwrap();
    worker.wait_idle().await.unwrap();

    assert!(delivery.calls().is_empty());
    assert!(client_rx.try_recv().is_err());
    assert!(notifier.sent().is_empty());
  }

  #[tokio::test(start_paused = true)]
  async fn test_forced_sync_during_drain_reruns_once() {
    let delivery = Arc::new(FakeDelivery::slow(Duration::from_secs(1)));
    let notifier = Arc::new(RecordingNotifier::default());
    let (worker, _client_rx) = spawn(&delivery, &notifier);

    worker
      .send(WorkerMessage::replace(
        QueueKind::Order,
        vec![item(1, json!({"fail": true}))],
      ))
      .unwrap();
    worker.trigger(Trigger::Forced).unwrap();
    worker.send(WorkerMessage::ForceBackgroundSync).unwrap();
    worker.trigger(Trigger::Forced).unwrap();
    worker.wait_idle().await.unwrap();

    // First pass plus exactly one rerun, never overlapping
    assert_eq!(delivery.calls().len(), 2);
    assert_eq!(delivery.max_in_flight.load(Ordering::SeqCst), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_items_added_mid_drain_survive() {
    let delivery = Arc::new(FakeDelivery::slow(Duration::from_secs(1)));
    let notifier = Arc::new(RecordingNotifier::default());
    let (worker, mut client_rx) = spawn(&delivery, &notifier);

    let first = vec![item(1, json!({"n": 1})), item(2, json!({"n": 2}))];
    worker
      .send(WorkerMessage::replace(QueueKind::Order, first.clone()))
      .unwrap();
    worker.trigger(Trigger::Forced).unwrap();

    // Foreground enqueues while the drain is in flight
    let mut second = first;
    second.push(item(3, json!({"n": 3})));
    worker.send(WorkerMessage::replace(QueueKind::Order, second)).unwrap();
    worker.wait_idle().await.unwrap();

    assert_eq!(
      client_rx.try_recv().unwrap(),
      ClientMessage::ClearDatabaseQueue { through_id: 2 }
    );

    // Only the late item is left for the next pass
    worker.trigger(Trigger::Tick).unwrap();
    worker.wait_idle().await.unwrap();
    assert_eq!(
      delivery.calls(),
      vec![json!({"n": 1}), json!({"n": 2}), json!({"n": 3})]
    );
  }

  #[tokio::test]
  async fn test_stale_replace_does_not_resend_delivered_items() {
    let delivery = Arc::new(FakeDelivery::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let (worker, mut client_rx) = spawn(&delivery, &notifier);

    let queue = vec![item(1, json!({"n": 1})), item(2, json!({"n": 2}))];
    worker
      .send(WorkerMessage::replace(QueueKind::Order, queue.clone()))
      .unwrap();
    worker.trigger(Trigger::Forced).unwrap();
    worker.wait_idle().await.unwrap();
    assert_eq!(
      client_rx.try_recv().unwrap(),
      ClientMessage::ClearDatabaseQueue { through_id: 2 }
    );

    // Foreground re-read its store before applying the clear
    let mut stale = queue;
    stale.push(item(3, json!({"n": 3})));
    worker.send(WorkerMessage::replace(QueueKind::Order, stale)).unwrap();
    worker.trigger(Trigger::Tick).unwrap();
    worker.wait_idle().await.unwrap();

    assert_eq!(
      delivery.calls(),
      vec![json!({"n": 1}), json!({"n": 2}), json!({"n": 3})]
    );
    assert_eq!(
      client_rx.try_recv().unwrap(),
      ClientMessage::ClearDatabaseQueue { through_id: 3 }
    );
  }

  #[tokio::test(start_paused = true)]
  async fn test_attempt_timeout_counts_as_failure() {
    let delivery = Arc::new(FakeDelivery::slow(Duration::from_secs(60)));
    let notifier = Arc::new(RecordingNotifier::default());
    let (worker, mut client_rx, _task) = BackgroundSyncWorker::spawn(
      Arc::clone(&delivery),
      Arc::clone(&notifier),
      Duration::from_secs(5),
    );

    worker
      .send(WorkerMessage::replace(QueueKind::Order, vec![item(1, json!({}))]))
      .unwrap();
    worker.trigger(Trigger::Forced).unwrap();
    worker.wait_idle().await.unwrap();

    assert!(client_rx.try_recv().is_err());
    assert!(notifier.sent().is_empty());
  }

  #[tokio::test]
  async fn test_login_round_trip() {
    let delivery = Arc::new(FakeDelivery::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let (worker, _client_rx) = spawn(&delivery, &notifier);

    let empty = worker.request(WorkerMessage::GetLogin).await.unwrap();
    assert_eq!(empty, WorkerReply::LoginData { data: None });

    let data = json!({"equipe": "700TA", "nome": "Ana"});
    worker
      .send(WorkerMessage::SaveLogin { data: data.clone() })
      .unwrap();
    let saved = worker.request(WorkerMessage::GetLogin).await.unwrap();
    assert_eq!(saved, WorkerReply::LoginData { data: Some(data) });

    worker.send(WorkerMessage::ClearLogin).unwrap();
    let cleared = worker.request(WorkerMessage::GetLogin).await.unwrap();
    assert_eq!(cleared, WorkerReply::LoginData { data: None });
  }
}
