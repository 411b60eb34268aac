//! Configuration management command handlers

use anyhow::{Context, Result};
use clap::Subcommand;
use proctor_core::ProctorConfig;
use std::path::Path;

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the config file location
    Path,
}

/// Handle config commands
///
/// # Errors
///
/// Returns an error if the config cannot be loaded, serialized or written
pub fn handle_config_command(action: ConfigAction, path: &Path) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = ProctorConfig::load(path)?;
            let rendered = toml::to_string_pretty(&config).context("Failed to serialize config")?;
            println!("# {}", path.display());
            print!("{rendered}");
        }
        ConfigAction::Init { force } => {
            if path.exists() && !force {
                println!("Config already exists at {}", path.display());
                println!("Use --force to overwrite it.");
                return Ok(());
            }
            ProctorConfig::default().save(path)?;
            println!("Wrote default config to {}", path.display());
        }
        ConfigAction::Path => println!("{}", path.display()),
    }
    Ok(())
}
