//! niri-bar daemon
//!
//! Follows niri's workspaces and prints one JSON update per line for each
//! display, for bars that read workspace state from a pipe.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use niri_bar_config::Config;
use niri_bar_daemon::{ManagerSettings, ResolutionCache, WorkspaceManager, WorkspaceUpdate};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "niri-bard")]
#[command(about = "Workspace sync daemon for niri status bars")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "~/.config/niri-bar/config.kdl")]
    config: String,

    /// Display to follow (repeatable); defaults to the configured displays
    #[arg(short, long = "display")]
    displays: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Expand tilde in config path
    let config_path: PathBuf = shellexpand::tilde(&args.config).into_owned().into();
    let config = load_config(&config_path)?;

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.global.log_level.as_filter())),
        )
        .init();

    tracing::info!(
        "Loaded configuration with {} display hint(s)",
        config.displays.len()
    );

    let displays = if args.displays.is_empty() {
        config
            .displays
            .iter()
            .map(|hint| hint.display.clone())
            .collect()
    } else {
        args.displays
    };

    if displays.is_empty() {
        anyhow::bail!(
            "No displays to follow: pass --display or add display nodes to {}",
            config_path.display()
        );
    }

    let cache = ResolutionCache::from_hints(&config.displays);
    let manager = WorkspaceManager::spawn(ManagerSettings::from_config(&config.niri), cache);

    let (tx, mut updates) = mpsc::unbounded_channel::<WorkspaceUpdate>();
    for display in &displays {
        manager.register_display(display.clone(), tx.clone());
    }
    drop(tx);

    tracing::info!("niri-bar daemon running for {} display(s)", displays.len());

    loop {
        tokio::select! {
            update = updates.recv() => {
                let Some(update) = update else { break };
                println!("{}", serde_json::to_string(&update)?);
            }
            result = tokio::signal::ctrl_c() => {
                result.context("Failed to listen for ctrl-c")?;
                break;
            }
        }
    }

    tracing::info!("Shutting down...");
    let cache = manager.shutdown().await;
    for (display_id, output) in cache.iter() {
        tracing::debug!(display = %display_id, output, "Resolved display");
    }

    Ok(())
}

/// Read the config file, or fall back to defaults when there is none
fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }

    niri_bar_config::parse_config(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))
}
