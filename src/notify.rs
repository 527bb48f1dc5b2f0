//! User-visible notifications: drain results and the daily order reminder.

use chrono::{DateTime, Duration as ChronoDuration, NaiveTime, TimeZone};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// A notification as handed to the platform. Notifications sharing a `tag`
/// replace each other instead of stacking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
  pub title: String,
  pub body: String,
  pub tag: String,
}

impl Notification {
  pub fn new(title: impl Into<String>, body: impl Into<String>, tag: impl Into<String>) -> Self {
    Self {
      title: title.into(),
      body: body.into(),
      tag: tag.into(),
    }
  }

  /// The daily "place your order" reminder.
  pub fn order_reminder() -> Self {
    Self::new(
      "Time to order your meals!",
      "Don't forget to place tomorrow's meal order!",
      "meal-reminder",
    )
  }
}

/// Sink for user-visible notifications.
pub trait Notifier: Send + Sync + 'static {
  fn notify(&self, notification: Notification);
}

/// Notifier that writes to the log and to stdout.
pub struct LogNotifier;

impl Notifier for LogNotifier {
  fn notify(&self, notification: Notification) {
    info!(tag = %notification.tag, "Notification: {}", notification.title);
    println!("[{}] {}: {}", notification.tag, notification.title, notification.body);
  }
}

/// Actions offered on the reminder notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderAction {
  /// Open the order screen
  PlaceOrder,
  /// Show the reminder again after the snooze delay
  RemindLater,
  /// Notification closed without choosing
  Dismiss,
}

impl ReminderAction {
  pub fn from_action_id(id: &str) -> Self {
    match id {
      "fazer-pedido" | "place-order" => ReminderAction::PlaceOrder,
      "lembrar-depois" | "remind-later" => ReminderAction::RemindLater,
      _ => ReminderAction::Dismiss,
    }
  }
}

/// Next instant at which the daily reminder fires.
///
/// Today at `at` unless that moment has already passed, in which case
/// tomorrow at `at`.
pub fn next_reminder_at<Tz: TimeZone>(now: &DateTime<Tz>, at: NaiveTime) -> DateTime<Tz> {
  let tz = now.timezone();
  let mut date = now.date_naive();

  loop {
    // A local time that doesn't exist (DST gap) is skipped to the next day
    if let Some(candidate) = tz.from_local_datetime(&date.and_time(at)).earliest() {
      if candidate >= *now {
        return candidate;
      }
    }
    date = match date.succ_opt() {
      Some(next) => next,
      None => return now.clone() + ChronoDuration::days(1),
    };
  }
}

/// Schedules the daily reminder and its snoozes.
pub struct Reminder<N: Notifier> {
  notifier: Arc<N>,
  at: NaiveTime,
  snooze: Duration,
}

impl<N: Notifier> Reminder<N> {
  pub fn new(notifier: Arc<N>, at: NaiveTime, snooze: Duration) -> Self {
    Self {
      notifier,
      at,
      snooze,
    }
  }

  /// Fire the reminder every day at the configured local time.
  pub fn spawn_daily(&self) -> JoinHandle<()> {
    let notifier = Arc::clone(&self.notifier);
    let at = self.at;

    tokio::spawn(async move {
      loop {
        let now = chrono::Local::now();
        let next = next_reminder_at(&now, at);
        info!("Next meal reminder at {}", next.format("%Y-%m-%d %H:%M"));

        let wait = (next - now).to_std().unwrap_or_default();
        tokio::time::sleep(wait).await;
        notifier.notify(Notification::order_reminder());

        // Step past the firing minute so the next computation lands tomorrow
        tokio::time::sleep(Duration::from_secs(1)).await;
      }
    })
  }

  /// React to a reminder action. Returns the snooze task when one was scheduled.
  pub fn handle_action(&self, action: ReminderAction) -> Option<JoinHandle<()>> {
    match action {
      ReminderAction::RemindLater => {
        debug!("Reminder snoozed for {:?}", self.snooze);
        let notifier = Arc::clone(&self.notifier);
        let snooze = self.snooze;
        Some(tokio::spawn(async move {
          tokio::time::sleep(snooze).await;
          notifier.notify(Notification::order_reminder());
        }))
      }
      ReminderAction::PlaceOrder | ReminderAction::Dismiss => None,
    }
  }
}

#[cfg(test)]
pub(crate) mod tests {
  use super::*;
  use chrono::Utc;
  use std::sync::Mutex;

  /// Notifier that records everything it is given.
  #[derive(Default)]
  pub(crate) struct RecordingNotifier {
    pub(crate) sent: Mutex<Vec<Notification>>,
  }

  impl RecordingNotifier {
    pub(crate) fn sent(&self) -> Vec<Notification> {
      self.sent.lock().unwrap().clone()
    }
  }

  impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) {
      self.sent.lock().unwrap().push(notification);
    }
  }

  fn at(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
  }

  #[test]
  fn test_reminder_later_today() {
    let now = Utc.with_ymd_and_hms(2026, 3, 10, 8, 0, 0).unwrap();
    let next = next_reminder_at(&now, at(19, 30));
    assert_eq!(next, Utc.with_ymd_and_hms(2026, 3, 10, 19, 30, 0).unwrap());
  }

  #[test]
  fn test_reminder_passed_moves_to_tomorrow() {
    let now = Utc.with_ymd_and_hms(2026, 3, 10, 19, 31, 0).unwrap();
    let next = next_reminder_at(&now, at(19, 30));
    assert_eq!(next, Utc.with_ymd_and_hms(2026, 3, 11, 19, 30, 0).unwrap());
  }

  #[test]
  fn test_reminder_exact_time_fires_now() {
    let now = Utc.with_ymd_and_hms(2026, 3, 10, 19, 30, 0).unwrap();
    assert_eq!(next_reminder_at(&now, at(19, 30)), now);
  }

  #[test]
  fn test_action_ids() {
    assert_eq!(
      ReminderAction::from_action_id("lembrar-depois"),
      ReminderAction::RemindLater
    );
    assert_eq!(
      ReminderAction::from_action_id("fazer-pedido"),
      ReminderAction::PlaceOrder
    );
    assert_eq!(ReminderAction::from_action_id(""), ReminderAction::Dismiss);
  }

  #[tokio::test(start_paused = true)]
  async fn test_remind_later_fires_after_snooze() {
    let notifier = Arc::new(RecordingNotifier::default());
    let reminder = Reminder::new(
      Arc::clone(&notifier),
      at(19, 30),
      Duration::from_secs(30 * 60),
    );

    assert!(reminder.handle_action(ReminderAction::Dismiss).is_none());
    let task = reminder.handle_action(ReminderAction::RemindLater).unwrap();

    tokio::time::sleep(Duration::from_secs(29 * 60)).await;
    assert!(notifier.sent().is_empty());

    task.await.unwrap();
    assert_eq!(notifier.sent(), vec![Notification::order_reminder()]);
  }
}
