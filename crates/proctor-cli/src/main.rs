mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use proctor_core::{config::default_config_path, ProctorConfig};
use std::path::PathBuf;

use commands::config::ConfigAction;

#[derive(Parser)]
#[command(name = "proctor")]
#[command(about = "Assessment session integrity supervisor", long_about = None)]
struct Cli {
    /// Config file (defaults to the proctor data directory)
    #[arg(long = "config", global = true)]
    config_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run an interactive proctored session fed from stdin
    Run {
        /// Session length in seconds (overrides the config)
        #[arg(short, long)]
        duration: Option<u32>,
        /// Start with the network marked offline
        #[arg(long)]
        offline: bool,
    },
    /// Show the last recorded session state
    Status,
    /// Show logged security events, newest first
    Logs {
        /// Show events still awaiting delivery instead of the full history
        #[arg(long)]
        pending: bool,
        /// Maximum number of rows
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let config_path = match cli.config_path {
        Some(path) => path,
        None => default_config_path()?,
    };

    match cli.command {
        Commands::Run { duration, offline } => {
            let config = ProctorConfig::load(&config_path)?;
            commands::run::run_command(config, duration, offline).await
        }
        Commands::Status => commands::status::status_command(&ProctorConfig::load(&config_path)?),
        Commands::Logs { pending, limit } => {
            commands::logs::logs_command(&ProctorConfig::load(&config_path)?, pending, limit)
        }
        Commands::Config { action } => {
            commands::config::handle_config_command(action, &config_path)
        }
    }
}
