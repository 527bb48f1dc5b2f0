use crate::api::{CachedMealClient, Freshness, MealClient};
use crate::cache::TieredCache;
use crate::commands::{CacheAction, Command};
use crate::config::Config;
use crate::db::Database;
use crate::event::TriggerSource;
use crate::notify::{LogNotifier, Notifier, Reminder, ReminderAction};
use crate::session::{Session, SessionStore};
use crate::supplier::{SelectionInput, SupplierResolver};
use crate::sync::{
  BackgroundSyncWorker, ClientMessage, ForegroundQueueBridge, QueueKind, QueueStore, WorkerMessage,
};
use color_eyre::{eyre::eyre, Result};
use serde_json::Value;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Foreground context: durable queues, reference cache and session, plus the
/// background worker they feed.
pub struct App {
  config: Config,
  cache: TieredCache,
  client: CachedMealClient,
  bridge: ForegroundQueueBridge,
  client_rx: mpsc::UnboundedReceiver<ClientMessage>,
  sessions: SessionStore,
  session: Option<Session>,
  notifier: Arc<LogNotifier>,
  worker_task: JoinHandle<()>,
}

impl App {
  pub async fn new(config: Config, data_dir: &Path) -> Result<Self> {
    let db = Database::open(data_dir)?;
    let cache = TieredCache::from_config(&config.cache, &db);

    let meal_client = MealClient::new(&config.server)?;
    let client = CachedMealClient::new(meal_client.clone(), cache.clone(), config.cache.max_age());

    let notifier = Arc::new(LogNotifier);
    let (worker, client_rx, worker_task) = BackgroundSyncWorker::spawn(
      Arc::new(meal_client),
      Arc::clone(&notifier),
      config.server.request_timeout(),
    );

    let bridge = ForegroundQueueBridge::new(QueueStore::new(db.clone()), worker);
    // The worker starts empty; hand it the stored queues
    bridge.resync()?;

    let mut app = Self {
      config,
      cache,
      client,
      bridge,
      client_rx,
      sessions: SessionStore::new(db),
      session: None,
      notifier,
      worker_task,
    };
    app.restore_session()?;

    Ok(app)
  }

  /// Resume the stored session and hand it to the worker's login cache.
  fn restore_session(&mut self) -> Result<()> {
    let session = match self.sessions.load() {
      Ok(session) => session,
      Err(e) => {
        warn!("Session store unreadable, starting logged out: {}", e);
        None
      }
    };

    if let Some(session) = &session {
      debug!("Resumed session for team {}", session.team);
      self.cache.set_scope(session.scope());
      self.bridge.save_login(session.to_payload()?)?;
    }
    self.session = session;
    Ok(())
  }

  fn require_session(&self) -> Result<&Session> {
    self
      .session
      .as_ref()
      .ok_or_else(|| eyre!("Not logged in. Run `rancho login --team <code>` first"))
  }

  /// Execute one command, then stop the worker.
  pub async fn run(mut self, command: Command) -> Result<()> {
    self.execute(command).await?;

    let Self {
      bridge, worker_task, ..
    } = self;
    // Dropping the last handle stops the reactor
    drop(bridge);
    if let Err(e) = worker_task.await {
      warn!("Sync worker ended abnormally: {}", e);
    }
    Ok(())
  }

  async fn execute(&mut self, command: Command) -> Result<()> {
    match command {
      Command::Login {
        team,
        project,
        name,
        leader,
      } => self.login(&project, &team, &name, leader),
      Command::Logout => self.logout(),
      Command::Whoami => {
        match &self.session {
          Some(s) => println!(
            "{}, team {}, project {}{}",
            if s.name.is_empty() { "(no name)" } else { s.name.as_str() },
            s.team,
            if s.project.is_empty() { "-" } else { s.project.as_str() },
            if s.leader { " (leader)" } else { "" }
          ),
          None => println!("Not logged in"),
        }
        Ok(())
      }
      Command::Enqueue { kind, file } => {
        let payload = read_payload(&file)?;
        let item = self.bridge.enqueue(kind, &payload)?;
        println!("Queued {} #{} ({})", kind, item.id, item.fingerprint());
        Ok(())
      }
      Command::Pending => self.print_pending(),
      Command::Clear { kind } => {
        let removed = self.bridge.clear(kind)?;
        println!("Removed {} pending {} item(s)", removed, kind);
        Ok(())
      }
      Command::Sync => self.sync_now().await,
      Command::Run => self.run_daemon().await,
      Command::Suppliers { refresh } => self.print_suppliers(refresh).await,
      Command::Staff { refresh } => self.print_staff(refresh).await,
      Command::Supplier {
        meal,
        option,
        custom,
        price,
      } => self.resolve_supplier(&meal, option, custom, price).await,
      Command::Cache {
        action: CacheAction::Clear { key },
      } => {
        self.cache.clear(key.as_deref());
        match key {
          Some(key) => println!("Cleared cache entry {}", key),
          None => println!("Cleared cache"),
        }
        Ok(())
      }
    }
  }

  fn login(&mut self, project: &str, team: &str, name: &str, leader: bool) -> Result<()> {
    let session = Session::login(project, team, name, leader)?;

    self.cache.reset_session_tier();
    self.cache.set_scope(session.scope());
    self.sessions.save(&session)?;
    self.bridge.save_login(session.to_payload()?)?;

    info!("Logged in to team {}", session.team);
    println!("Logged in to team {}", session.team);
    self.session = Some(session);
    Ok(())
  }

  fn logout(&mut self) -> Result<()> {
    self.cache.reset_session_tier();
    self.cache.set_scope("");
    self.sessions.forget()?;
    self.bridge.clear_login()?;

    match self.session.take() {
      Some(session) => {
        info!("Logged out of team {}", session.team);
        println!("Logged out of team {}", session.team);
      }
      None => println!("Not logged in"),
    }
    Ok(())
  }

  fn print_pending(&self) -> Result<()> {
    for kind in QueueKind::ALL {
      let items = self.bridge.pending(kind)?;
      println!("{} ({} pending)", kind, items.len());
      for item in items {
        println!(
          "  #{:<5} {}  {}",
          item.id,
          item.enqueued_at.format("%Y-%m-%d %H:%M:%S"),
          item.fingerprint()
        );
      }
    }
    Ok(())
  }

  /// Apply every clear instruction the worker has sent so far.
  fn apply_worker_instructions(&mut self) -> Result<()> {
    while let Ok(message) = self.client_rx.try_recv() {
      self.bridge.handle_client_message(message)?;
    }
    Ok(())
  }

  async fn sync_now(&mut self) -> Result<()> {
    self.bridge.force_sync()?;
    self.bridge.wait_idle().await?;
    self.apply_worker_instructions()?;

    let mut remaining = 0;
    for kind in QueueKind::ALL {
      let count = self.bridge.count(kind)?;
      if count > 0 {
        println!("{} {} item(s) still pending", count, kind);
      }
      remaining += count;
    }
    if remaining == 0 {
      println!("Nothing pending");
    }
    Ok(())
  }

  /// Sync in the background until interrupted.
  ///
  /// Lines on stdin are control input: JSON `FORCE_BACKGROUND_SYNC` or
  /// `KEEP_ALIVE` messages, or a reminder action id.
  async fn run_daemon(&mut self) -> Result<()> {
    let probe_client = self.client.inner().clone();
    let mut triggers = TriggerSource::spawn(
      self.config.sync.tick_interval(),
      self.config.sync.probe_interval(),
      move || {
        let client = probe_client.clone();
        async move { client.check_connection().await }
      },
    );

    let reminder = Reminder::new(
      Arc::clone(&self.notifier),
      self.config.reminder.at,
      self.config.reminder.snooze(),
    );
    let daily = self.config.reminder.enabled.then(|| reminder.spawn_daily());

    let mut control = BufReader::new(tokio::io::stdin()).lines();
    let mut control_open = true;

    info!("Sync daemon running against {}", self.client.inner().base_url());
    loop {
      tokio::select! {
        trigger = triggers.next() => match trigger {
          Some(trigger) => self.bridge.trigger(trigger)?,
          None => break,
        },
        message = self.client_rx.recv() => match message {
          Some(message) => self.bridge.handle_client_message(message)?,
          None => break,
        },
        line = control.next_line(), if control_open => match line {
          Ok(Some(line)) => {
            let outcome = self.handle_control_line(&line, &reminder)?;
            debug!("Control input handled: {:?}", outcome);
          }
          Ok(None) => control_open = false,
          Err(e) => {
            warn!("Control input closed: {}", e);
            control_open = false;
          }
        },
        _ = tokio::signal::ctrl_c() => {
          info!("Interrupted, shutting down");
          break;
        }
      }
    }

    if let Some(daily) = daily {
      daily.abort();
    }
    Ok(())
  }

  fn handle_control_line<N: Notifier>(
    &self,
    line: &str,
    reminder: &Reminder<N>,
  ) -> Result<ControlOutcome> {
    let line = line.trim();
    if line.is_empty() {
      return Ok(ControlOutcome::Ignored);
    }

    if line.starts_with('{') {
      let outcome = match WorkerMessage::parse(line) {
        Ok(message @ WorkerMessage::ForceBackgroundSync) => {
          self.bridge.force_sync()?;
          ControlOutcome::Forwarded(message.name())
        }
        Ok(message @ WorkerMessage::KeepAlive) => {
          self.bridge.keep_alive()?;
          ControlOutcome::Forwarded(message.name())
        }
        Ok(other) => {
          warn!("{} is not accepted as control input", other.name());
          ControlOutcome::Refused
        }
        Err(e) => {
          warn!("Ignoring control input: {}", e);
          ControlOutcome::Ignored
        }
      };
      return Ok(outcome);
    }

    let outcome = match ReminderAction::from_action_id(line) {
      ReminderAction::PlaceOrder => {
        println!("Place the order with `rancho enqueue order <file>`");
        ControlOutcome::PlaceOrder
      }
      ReminderAction::RemindLater => {
        // Snooze task runs detached
        let _ = reminder.handle_action(ReminderAction::RemindLater);
        ControlOutcome::Snoozed
      }
      ReminderAction::Dismiss => {
        warn!("Unknown control input '{}'", line);
        ControlOutcome::Ignored
      }
    };
    Ok(outcome)
  }

  async fn print_suppliers(&self, refresh: bool) -> Result<()> {
    let session = self.require_session()?;
    let (suppliers, freshness) = self.client.suppliers(&session.project, refresh).await?;

    println!(
      "{} supplier(s) for {}{}",
      suppliers.len(),
      session.project,
      freshness_note(freshness)
    );
    for s in suppliers {
      println!(
        "  {:<40} {:<8} {:>8}",
        s.name,
        s.closure_code.as_deref().unwrap_or("-"),
        s.unit_price
          .map(|p| format!("{:.2}", p))
          .unwrap_or_else(|| "-".to_string())
      );
    }
    Ok(())
  }

  async fn print_staff(&self, refresh: bool) -> Result<()> {
    let session = self.require_session()?;
    let (staff, freshness) = self.client.staff(&session.team, refresh).await?;

    println!(
      "{} staff member(s) in {}{}",
      staff.len(),
      session.team,
      freshness_note(freshness)
    );
    for m in staff {
      println!(
        "  {:<6} {:<40} {}{}",
        m.id,
        m.name,
        m.role.as_deref().unwrap_or("-"),
        if m.is_leader { " (leader)" } else { "" }
      );
    }
    Ok(())
  }

  async fn resolve_supplier(
    &self,
    meal: &str,
    option: Option<String>,
    custom: Option<String>,
    price: Option<String>,
  ) -> Result<()> {
    let session = self.require_session()?;

    // Make sure a supplier list is cached; offline we resolve against what we have
    if let Err(e) = self.client.suppliers(&session.project, false).await {
      warn!("Supplier list unavailable: {}", e);
    }

    let input = match (custom, option) {
      (Some(name), _) => SelectionInput::custom(&name),
      (None, Some(label)) => SelectionInput::listed(&label),
      (None, None) => return Err(eyre!("Pick a supplier with --option or --custom")),
    };
    let input = match price {
      Some(price) => input.with_price(&price),
      None => input,
    };

    let mut resolver = SupplierResolver::new(self.cache.clone(), &session.project);
    resolver.select(meal, input);

    let Some(selection) = resolver.resolve(meal) else {
      return Err(eyre!("No supplier selected for {}", meal));
    };
    let closure = resolver.closure_status(meal);

    println!("Meal:     {}", meal);
    println!(
      "Supplier: {}{}",
      selection.display_name,
      if selection.is_custom { " (custom)" } else { "" }
    );
    println!(
      "Closure:  {}",
      if closure.is_empty() { "-" } else { closure.as_str() }
    );
    println!("Price:    {:.2}", resolver.price(meal));
    Ok(())
  }
}

/// What the daemon did with one line of control input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ControlOutcome {
  /// Passed on to the worker
  Forwarded(&'static str),
  /// Well-formed message the daemon does not take from outside
  Refused,
  Snoozed,
  PlaceOrder,
  Ignored,
}

fn freshness_note(freshness: Freshness) -> &'static str {
  match freshness {
    Freshness::Cached => " (cached)",
    Freshness::Fetched => "",
    Freshness::Stale => " (offline, cached copy)",
  }
}

/// Read a JSON object from `path`, or stdin when `path` is "-".
fn read_payload(path: &Path) -> Result<Value> {
  let contents = if path == Path::new("-") {
    let mut buf = String::new();
    std::io::stdin()
      .read_to_string(&mut buf)
      .map_err(|e| eyre!("Failed to read payload from stdin: {}", e))?;
    buf
  } else {
    std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read payload file {}: {}", path.display(), e))?
  };

  let payload: Value = serde_json::from_str(&contents)
    .map_err(|e| eyre!("Invalid JSON in {}: {}", path.display(), e))?;
  if !payload.is_object() {
    return Err(eyre!("Payload in {} must be a JSON object", path.display()));
  }
  Ok(payload)
}
