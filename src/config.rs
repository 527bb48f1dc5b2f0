use chrono::NaiveTime;
use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::cache::{DEFAULT_MAX_AGE, DEFAULT_NAMESPACE, DEFAULT_VERSION};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub server: ServerConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub sync: SyncConfig,
  #[serde(default)]
  pub reminder: ReminderConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
  /// Origin the app is served from (e.g. "https://meals.example.com").
  /// Loopback origins are redirected to `loopback_port`.
  pub origin: String,
  /// Port of the local development backend
  pub loopback_port: u16,
  /// Upper bound for a single HTTP request, delivery attempts included
  pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      origin: "http://localhost:8082".to_string(),
      loopback_port: 8082,
      request_timeout_secs: 30,
    }
  }
}

impl ServerConfig {
  pub fn request_timeout(&self) -> Duration {
    Duration::from_secs(self.request_timeout_secs)
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// Key prefix for every cache entry
  pub namespace: String,
  /// Version marker written into entries
  pub version: String,
  /// Entries older than this are refreshed from the backend
  pub max_age_hours: u64,
  /// Tier toggles; a disabled tier always misses
  pub memory: bool,
  pub durable: bool,
  pub session: bool,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      namespace: DEFAULT_NAMESPACE.to_string(),
      version: DEFAULT_VERSION.to_string(),
      max_age_hours: DEFAULT_MAX_AGE.as_secs() / 3600,
      memory: true,
      durable: true,
      session: true,
    }
  }
}

impl CacheConfig {
  pub fn max_age(&self) -> Duration {
    Duration::from_secs(self.max_age_hours * 3600)
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
  /// Periodic drain tick
  pub tick_interval_secs: u64,
  /// How often connectivity is probed to detect recovery
  pub probe_interval_secs: u64,
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      tick_interval_secs: 60,
      probe_interval_secs: 15,
    }
  }
}

impl SyncConfig {
  pub fn tick_interval(&self) -> Duration {
    Duration::from_secs(self.tick_interval_secs.max(1))
  }

  pub fn probe_interval(&self) -> Duration {
    Duration::from_secs(self.probe_interval_secs.max(1))
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReminderConfig {
  pub enabled: bool,
  /// Local time of the daily order reminder
  #[serde(deserialize_with = "deserialize_time")]
  pub at: NaiveTime,
  /// Delay for the "remind me later" action
  pub snooze_minutes: u64,
}

impl Default for ReminderConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      at: NaiveTime::from_hms_opt(19, 30, 0).expect("19:30 is a valid time"),
      snooze_minutes: 30,
    }
  }
}

impl ReminderConfig {
  pub fn snooze(&self) -> Duration {
    Duration::from_secs(self.snooze_minutes * 60)
  }
}

fn deserialize_time<'de, D>(deserializer: D) -> Result<NaiveTime, D::Error>
where
  D: serde::Deserializer<'de>,
{
  let s = String::deserialize(deserializer)?;
  NaiveTime::parse_from_str(s.trim(), "%H:%M").map_err(serde::de::Error::custom)
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./rancho.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/rancho/config.yaml
  ///
  /// Built-in defaults are used when no file exists. `RANCHO_ORIGIN`
  /// overrides the server origin either way.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => {
        debug!("No configuration file found, using defaults");
        Config::default()
      }
    };

    if let Ok(origin) = std::env::var("RANCHO_ORIGIN") {
      config.server.origin = origin;
    }

    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("rancho.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("rancho").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self, serde_yaml::Error> {
    serde_yaml::from_str(contents)
  }

  /// Default data directory for the database and logs.
  pub fn default_data_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("rancho"))
  }
}
