//! Parley Telegram bot entry point.
//!
//! Binary name: `parley`
//!
//! Parses CLI arguments, initializes the database and services, then runs
//! the long-poll update loop until interrupted.

mod commands;
mod router;
mod state;

use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use state::AppState;

#[derive(Parser)]
#[command(name = "parley", about = "Telegram LLM chatbot", version)]
struct Cli {
    /// Data directory for the database and config.toml
    #[arg(long, env = "PARLEY_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long)]
    quiet: bool,
}

fn default_data_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".parley")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up tracing based on verbosity
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "info,parley=debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();

    let data_dir = cli.data_dir.unwrap_or_else(default_data_dir);
    let state = AppState::init(data_dir).await?;
    info!(provider = %state.config.model.provider, "parley started");

    run_update_loop(state).await
}

/// Long-poll loop. Each update is handled to completion before the next;
/// model turns are spawned so a slow generation never blocks polling.
async fn run_update_loop(state: AppState) -> anyhow::Result<()> {
    let mut offset = 0i64;
    loop {
        match state.api.get_updates(offset).await {
            Ok(updates) => {
                for update in updates {
                    offset = offset.max(update.update_id + 1);
                    if let Err(err) = router::handle_update(&state, update).await {
                        error!(%err, "update handling failed");
                    }
                }
            }
            Err(err) => {
                error!(%err, "polling failed, backing off");
                tokio::time::sleep(std::time::Duration::from_secs(5)).await;
            }
        }
    }
}
