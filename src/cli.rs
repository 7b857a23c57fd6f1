// CLI module - command-line argument parsing and handlers
//
// With no subcommand the server starts. Subcommands:
// - config --show: Display effective configuration
// - config --path: Show config file path
// - config --reset: Regenerate config file with defaults
// - prune [--days N]: Delete events older than N days

use anyhow::Context;
use clap::{Parser, Subcommand};
use skilltrace::config::{Config, VERSION};
use skilltrace::store::EventStore;
use std::io::Write;

/// skilltrace - usage telemetry for skills
#[derive(Parser)]
#[command(name = "skilltrace")]
#[command(version = VERSION)]
#[command(about = "Skill usage telemetry: ingestion and analytics server", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage configuration
    Config {
        /// Show effective configuration
        #[arg(long)]
        show: bool,

        /// Reset config file to defaults
        #[arg(long)]
        reset: bool,

        /// Show config file path
        #[arg(long)]
        path: bool,
    },

    /// Delete stored events older than a cutoff
    Prune {
        /// Age cutoff in days (default: store.retention_days)
        #[arg(long)]
        days: Option<u32>,
    },
}

/// Handle CLI commands. Returns true if a command was handled (exit after).
pub fn handle_cli() -> anyhow::Result<bool> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Config { show, reset, path }) => {
            if path {
                handle_config_path()?;
            } else if show {
                handle_config_show()?;
            } else if reset {
                handle_config_reset()?;
            } else {
                // No flag provided, show help
                println!("Usage: skilltrace config [--show|--reset|--path]");
                println!();
                println!("Options:");
                println!("  --show    Display effective configuration");
                println!("  --reset   Reset config file to defaults");
                println!("  --path    Show config file path");
            }
            Ok(true)
        }
        Some(Commands::Prune { days }) => {
            handle_prune(days)?;
            Ok(true)
        }
        None => Ok(false), // No subcommand, run the server
    }
}

fn handle_config_path() -> anyhow::Result<()> {
    let path = Config::config_path().context("Could not determine config path")?;
    println!("{}", path.display());
    Ok(())
}

fn handle_config_show() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    println!("# Effective configuration (env > file > defaults)");
    println!();
    print!("{}", config.to_toml());

    println!();
    if let Some(path) = Config::config_path() {
        if path.exists() {
            println!("# Source: {}", path.display());
        } else {
            println!("# Source: defaults (no config file)");
        }
    }
    Ok(())
}

fn handle_config_reset() -> anyhow::Result<()> {
    let path = Config::config_path().context("Could not determine config path")?;

    // Confirm if file exists
    if path.exists() {
        eprint!(
            "Config file exists at {}. Overwrite? [y/N] ",
            path.display()
        );
        std::io::stderr().flush()?;

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Aborted.");
            return Ok(());
        }
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Error creating directory {}", parent.display()))?;
    }

    // Write the default config (using Config's single source of truth)
    std::fs::write(&path, Config::default().to_toml())
        .with_context(|| format!("Error writing config {}", path.display()))?;

    println!("Config reset to defaults: {}", path.display());
    Ok(())
}

fn handle_prune(days: Option<u32>) -> anyhow::Result<()> {
    let config = Config::from_env()?;
    let days = days.unwrap_or(config.store.retention_days);

    if days == 0 {
        println!("Retention disabled (0 days); nothing pruned.");
        return Ok(());
    }

    let store = EventStore::open(&config.store.db_path, 1)?;
    let deleted = store.prune_older_than(days)?;
    println!(
        "Pruned {} event(s) older than {} day(s) from {}",
        deleted,
        days,
        store.path().display()
    );
    Ok(())
}
