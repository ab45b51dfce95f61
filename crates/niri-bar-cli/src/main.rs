//! niri-bar CLI
//!
//! Inspection and control tool for niri-bar.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use miette::IntoDiagnostic;
use niri_bar_config::Config;
use niri_bar_daemon::niri_ipc::{get_socket_path, Message, NiriClient};
use niri_bar_daemon::{ResolutionCache, WorkspaceStore, WorkspaceSync, WorkspaceUpdate};
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(name = "niri-bar")]
#[command(about = "Workspace tool for niri status bars")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "~/.config/niri-bar/config.kdl")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate the configuration file
    Validate,

    /// List niri workspaces grouped by output
    Workspaces {
        /// Print the raw workspace list as JSON
        #[arg(long)]
        json: bool,
    },

    /// Focus a workspace by its niri id
    Switch {
        /// Workspace id
        id: u64,
    },

    /// Show which niri output each display resolves to
    Resolve {
        /// Display identifier (repeatable); defaults to the configured displays
        #[arg(short, long = "display")]
        displays: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    // Expand tilde in config path
    let config_path: PathBuf = shellexpand::tilde(&cli.config).into_owned().into();

    match cli.command {
        Commands::Validate => cmd_validate(&config_path),
        Commands::Workspaces { json } => cmd_workspaces(&config_path, json).await,
        Commands::Switch { id } => cmd_switch(&config_path, id).await,
        Commands::Resolve { displays } => cmd_resolve(&config_path, displays).await,
    }
}

fn load_config(config_path: &Path) -> miette::Result<Config> {
    if !config_path.exists() {
        return Ok(Config::default());
    }
    Ok(niri_bar_config::parse_config(config_path)?)
}

async fn connect(config: &Config) -> miette::Result<NiriClient> {
    let socket_path = get_socket_path(config.niri.socket_path.as_deref()).into_diagnostic()?;
    NiriClient::connect(&socket_path).await.into_diagnostic()
}

fn cmd_validate(config_path: &Path) -> miette::Result<()> {
    println!("Validating configuration: {}", config_path.display());

    let config = niri_bar_config::parse_config(config_path)?;

    println!("Configuration is valid!");
    println!("  Log level: {}", config.global.log_level.as_filter());
    match &config.niri.socket_path {
        Some(path) => println!("  Socket: {}", path.display()),
        None => println!("  Socket: from environment"),
    }
    println!(
        "  Reconnect delay: {}ms",
        config.niri.reconnect_delay.as_millis()
    );
    println!("  Displays: {}", config.displays.len());
    for hint in &config.displays {
        println!("    - {} -> {}", hint.display, hint.output);
    }

    Ok(())
}

async fn cmd_workspaces(config_path: &Path, json: bool) -> miette::Result<()> {
    let config = load_config(config_path)?;
    let mut client = connect(&config).await?;
    let workspaces = client.get_workspaces().await.into_diagnostic()?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&workspaces).into_diagnostic()?
        );
        return Ok(());
    }

    let mut store = WorkspaceStore::new();
    store.replace(workspaces);

    for output in store.outputs() {
        println!("{}:", output);
        for ws in store.query(&output) {
            let marker = if ws.is_focused {
                '*'
            } else if ws.is_active {
                '+'
            } else {
                ' '
            };
            println!(
                "  {} {} (id {}){}",
                marker,
                ws.idx,
                ws.id,
                ws.name
                    .as_deref()
                    .map(|name| format!(" {}", name))
                    .unwrap_or_default()
            );
        }
    }

    Ok(())
}

async fn cmd_switch(config_path: &Path, id: u64) -> miette::Result<()> {
    let config = load_config(config_path)?;
    let mut client = connect(&config).await?;

    let workspaces = client.get_workspaces().await.into_diagnostic()?;
    if !workspaces.iter().any(|ws| ws.id == id) {
        return Err(miette::miette!("No workspace with id {}", id));
    }

    client.focus_workspace(id).await.into_diagnostic()?;
    println!("Focused workspace {}", id);

    Ok(())
}

async fn cmd_resolve(config_path: &Path, displays: Vec<String>) -> miette::Result<()> {
    let config = load_config(config_path)?;
    let displays: Vec<String> = if displays.is_empty() {
        config
            .displays
            .iter()
            .map(|hint| hint.display.clone())
            .collect()
    } else {
        displays
    };

    if displays.is_empty() {
        return Err(miette::miette!(
            "No displays given: pass --display or add display nodes to the config"
        ));
    }

    let mut client = connect(&config).await?;
    let workspaces = client.get_workspaces().await.into_diagnostic()?;

    // Resolve the same way the daemon does, registering displays in order
    let mut sync = WorkspaceSync::new(ResolutionCache::from_hints(&config.displays));
    sync.handle_message(Message::Snapshot(workspaces));

    let (tx, _updates) = mpsc::unbounded_channel::<WorkspaceUpdate>();
    for display in &displays {
        sync.register_display(display.clone(), Box::new(tx.clone()));
    }

    for display in &displays {
        match sync.dispatcher().resolved_output(display) {
            Some(output) => println!("{} -> {}", display, output),
            None => println!("{} -> (unresolved)", display),
        }
    }

    Ok(())
}
