//! Logged-in user and team.

use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::{CacheTier, SqliteTier};
use crate::db::Database;
use crate::error::SyncError;

/// Durable-store key of the persisted session. Kept outside the cache
/// namespace so clearing the cache does not log the user out.
const SESSION_KEY: &str = "rancho_session";

/// Current user context. The team code is the cache scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
  #[serde(rename = "projeto")]
  pub project: String,
  #[serde(rename = "equipe")]
  pub team: String,
  #[serde(rename = "nome")]
  pub name: String,
  #[serde(rename = "lider", default)]
  pub leader: bool,
}

impl Session {
  pub fn login(project: &str, team: &str, name: &str, leader: bool) -> Result<Self> {
    let team = team.trim();
    if team.is_empty() {
      return Err(eyre!("Team code is required"));
    }

    Ok(Self {
      project: project.trim().to_string(),
      team: team.to_string(),
      name: name.trim().to_string(),
      leader,
    })
  }

  pub fn scope(&self) -> &str {
    &self.team
  }

  /// Payload cached in the sync worker.
  pub fn to_payload(&self) -> Result<Value, SyncError> {
    Ok(serde_json::to_value(self)?)
  }
}

/// Persists the session across invocations.
pub struct SessionStore {
  tier: SqliteTier,
}

impl SessionStore {
  pub fn new(db: Database) -> Self {
    Self {
      tier: SqliteTier::durable(db),
    }
  }

  /// Stored session, if any. An unreadable record counts as logged out.
  pub fn load(&self) -> Result<Option<Session>, SyncError> {
    let Some(raw) = self.tier.read(SESSION_KEY)? else {
      return Ok(None);
    };

    match serde_json::from_str(&raw) {
      Ok(session) => Ok(Some(session)),
      Err(e) => {
        warn!("Discarding unreadable session record: {}", e);
        Ok(None)
      }
    }
  }

  pub fn save(&self, session: &Session) -> Result<(), SyncError> {
    let data = serde_json::to_string(session)?;
    self.tier.write(SESSION_KEY, &data)?;
    debug!("Session saved for team {}", session.team);
    Ok(())
  }

  pub fn forget(&self) -> Result<(), SyncError> {
    self.tier.remove(SESSION_KEY)
  }
}
