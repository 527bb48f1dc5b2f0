mod api;
mod app;
mod cache;
mod commands;
mod config;
mod db;
mod error;
mod event;
mod logging;
mod notify;
mod session;
mod supplier;
mod sync;

use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;
use tracing::debug;

#[derive(Parser, Debug)]
#[command(name = "rancho")]
#[command(about = "Offline-first meal orders and temperature checks for field teams")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/rancho/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Directory for the local database and logs
  #[arg(long, global = true)]
  data_dir: Option<PathBuf>,

  #[command(subcommand)]
  command: commands::Command,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  let data_dir = match args.data_dir {
    Some(dir) => dir,
    None => config::Config::default_data_dir()?,
  };
  let _log_guard = logging::init(&data_dir)?;

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;
  debug!("Using data directory {}", data_dir.display());

  let app = app::App::new(config, &data_dir).await?;
  app.run(args.command).await?;

  Ok(())
}
