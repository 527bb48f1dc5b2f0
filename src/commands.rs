//! Command-line subcommands.

use clap::Subcommand;
use std::path::PathBuf;

use crate::sync::QueueKind;

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
  /// Start a session for a team
  Login {
    /// Team code (e.g. 700TA)
    #[arg(short, long)]
    team: String,
    /// Project the team works on
    #[arg(short, long, default_value = "")]
    project: String,
    /// Your name
    #[arg(short, long, default_value = "")]
    name: String,
    /// Log in as team leader
    #[arg(long)]
    leader: bool,
  },

  /// End the session and drop session data
  Logout,

  /// Show the current session
  Whoami,

  /// Queue a write from a JSON file ("-" reads stdin)
  Enqueue {
    #[arg(value_enum)]
    kind: QueueKind,
    file: PathBuf,
  },

  /// List pending writes
  Pending,

  /// Drop every pending write of one kind
  Clear {
    #[arg(value_enum)]
    kind: QueueKind,
  },

  /// Deliver pending writes now and wait for the result
  Sync,

  /// Keep syncing in the background until interrupted
  Run,

  /// List suppliers for the session's project
  Suppliers {
    /// Ignore the cache and fetch from the backend
    #[arg(long)]
    refresh: bool,
  },

  /// List the team's staff
  Staff {
    /// Ignore the cache and fetch from the backend
    #[arg(long)]
    refresh: bool,
  },

  /// Resolve a supplier choice for a meal type
  Supplier {
    /// Meal type (e.g. almoco, janta)
    meal: String,
    /// Supplier picked from the list
    #[arg(long, conflicts_with = "custom", required_unless_present = "custom")]
    option: Option<String>,
    /// Supplier name typed in by hand
    #[arg(long)]
    custom: Option<String>,
    /// Unit price override
    #[arg(long)]
    price: Option<String>,
  },

  /// Cache maintenance
  Cache {
    #[command(subcommand)]
    action: CacheAction,
  },
}

#[derive(Subcommand, Debug, Clone)]
pub enum CacheAction {
  /// Remove one key, or everything under the cache namespace
  Clear { key: Option<String> },
}

#[cfg(test)]
mod tests {
  use super::*;
  use clap::Parser;

  #[derive(Parser, Debug)]
  struct Cli {
    #[command(subcommand)]
    command: Command,
  }

  fn parse(args: &[&str]) -> Result<Command, clap::Error> {
    let mut argv = vec!["rancho"];
    argv.extend_from_slice(args);
    Cli::try_parse_from(argv).map(|cli| cli.command)
  }

  #[test]
  fn test_enqueue_kinds() {
    match parse(&["enqueue", "temperature", "reading.json"]).unwrap() {
      Command::Enqueue { kind, file } => {
        assert_eq!(kind, QueueKind::Temperature);
        assert_eq!(file, PathBuf::from("reading.json"));
      }
      other => panic!("unexpected command {:?}", other),
    }
    assert!(parse(&["enqueue", "invoice", "x.json"]).is_err());
  }

  #[test]
  fn test_supplier_requires_one_source() {
    assert!(parse(&["supplier", "almoco"]).is_err());
    assert!(parse(&["supplier", "almoco", "--option", "A", "--custom", "B"]).is_err());

    match parse(&["supplier", "almoco", "--custom", "Dona Maria", "--price", "12,50"]).unwrap() {
      Command::Supplier {
        meal,
        option,
        custom,
        price,
      } => {
        assert_eq!(meal, "almoco");
        assert!(option.is_none());
        assert_eq!(custom.as_deref(), Some("Dona Maria"));
        assert_eq!(price.as_deref(), Some("12,50"));
      }
      other => panic!("unexpected command {:?}", other),
    }
  }

  #[test]
  fn test_cache_clear_key_optional() {
    assert!(matches!(
      parse(&["cache", "clear"]).unwrap(),
      Command::Cache {
        action: CacheAction::Clear { key: None }
      }
    ));
  }
}
