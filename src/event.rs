use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Reasons for the sync worker to attempt a drain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
  /// Periodic tick
  Tick,
  /// Backend became reachable again after being unreachable
  ConnectivityRestored,
  /// User asked for an immediate sync
  Forced,
}

/// Detects offline → online transitions from successive probe results.
#[derive(Debug, Default)]
pub struct ConnectivityTracker {
  previous: Option<bool>,
}

impl ConnectivityTracker {
  /// Record a probe result; true when it marks a recovery.
  pub fn observe(&mut self, online: bool) -> bool {
    let restored = online && self.previous == Some(false);
    if self.previous != Some(online) {
      if online {
        info!("Backend reachable");
      } else {
        info!("Backend unreachable, writes will be queued");
      }
    }
    self.previous = Some(online);
    restored
  }
}

/// Produces sync triggers from a tick timer and a connectivity probe
pub struct TriggerSource {
  rx: mpsc::UnboundedReceiver<Trigger>,
}

impl TriggerSource {
  /// Start the tick and probe tasks. `probe` answers whether the backend is
  /// reachable right now.
  pub fn spawn<P, Fut>(tick_interval: Duration, probe_interval: Duration, probe: P) -> Self
  where
    P: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = bool> + Send,
  {
    let (tx, rx) = mpsc::unbounded_channel();

    // Tick timer
    let tick_tx = tx.clone();
    tokio::spawn(async move {
      let mut ticker = interval_at(Instant::now() + tick_interval, tick_interval);
      ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
      loop {
        ticker.tick().await;
        if tick_tx.send(Trigger::Tick).is_err() {
          break;
        }
      }
    });

    // Connectivity probe
    tokio::spawn(async move {
      let mut tracker = ConnectivityTracker::default();
      let mut ticker = interval_at(Instant::now(), probe_interval);
      ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
      loop {
        ticker.tick().await;
        let online = probe().await;
        debug!("Connectivity probe: {}", if online { "online" } else { "offline" });
        if tracker.observe(online) && tx.send(Trigger::ConnectivityRestored).is_err() {
          break;
        }
        if tx.is_closed() {
          break;
        }
      }
    });

    Self { rx }
  }

  /// Receive the next trigger
  pub async fn next(&mut self) -> Option<Trigger> {
    self.rx.recv().await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::VecDeque;
  use std::sync::{Arc, Mutex};

  #[test]
  fn test_only_offline_to_online_is_a_recovery() {
    let mut tracker = ConnectivityTracker::default();
    // First observation has nothing to recover from
    assert!(!tracker.observe(true));
    assert!(!tracker.observe(true));
    assert!(!tracker.observe(false));
    assert!(!tracker.observe(false));
    assert!(tracker.observe(true));
    assert!(!tracker.observe(true));
  }

  #[test]
  fn test_starting_offline_then_online() {
    let mut tracker = ConnectivityTracker::default();
    assert!(!tracker.observe(false));
    assert!(tracker.observe(true));
  }

  #[tokio::test(start_paused = true)]
  async fn test_source_emits_ticks_and_recovery() {
    let script = Arc::new(Mutex::new(VecDeque::from([false, false, true])));
    let probe = {
      let script = Arc::clone(&script);
      move || {
        let online = script.lock().unwrap().pop_front().unwrap_or(true);
        async move { online }
      }
    };

    let mut source = TriggerSource::spawn(Duration::from_secs(60), Duration::from_secs(15), probe);

    // Probes at 0s, 15s, 30s: recovery at 30s precedes the first tick at 60s
    assert_eq!(source.next().await, Some(Trigger::ConnectivityRestored));
    assert_eq!(source.next().await, Some(Trigger::Tick));
  }
}
