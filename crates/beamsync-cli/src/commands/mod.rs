//! CLI command definitions and handlers.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

use beamsync_core::config::Config;
use beamsync_core::events::{EventEmitter, SessionEvent};
use beamsync_core::session::SessionManager;

use crate::ui;

pub mod config;
pub mod receive;
pub mod send;

/// Load configuration with graceful fallback to defaults.
///
/// A missing file yields defaults. A file that cannot be parsed is reported
/// and defaults are used.
pub fn load_config() -> Config {
    Config::load().unwrap_or_else(|e| {
        tracing::warn!("{}; using defaults", e);
        Config::default()
    })
}

/// BeamSync - Same-network file exchange through your browser
#[derive(Parser)]
#[command(name = "beamsync")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Options shared by every command
    #[command(flatten)]
    pub global: GlobalArgs,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Options accepted before or after any subcommand
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Show debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Do not run the firewall helper when a port is refused
    #[arg(long, global = true)]
    pub no_firewall_fix: bool,
}

/// Available commands
#[derive(Subcommand)]
pub enum Command {
    /// Let a phone upload files to this computer
    Receive(ReceiveArgs),

    /// Offer files for a phone to download
    Send(SendArgs),

    /// Manage configuration
    Config(ConfigArgs),
}

/// Arguments for the receive command
#[derive(Parser)]
pub struct ReceiveArgs {
    /// Directory to save received files into
    #[arg(short, long)]
    pub dir: Option<PathBuf>,

    /// Print events as JSON lines
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the send command
#[derive(Parser)]
pub struct SendArgs {
    /// Files to offer, in download order
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Print events as JSON lines
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the config command
#[derive(Parser)]
pub struct ConfigArgs {
    /// Config subcommand
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Config subcommands
#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show all configuration
    Show,

    /// Show the configuration file path
    Path,

    /// Reset configuration to defaults
    Reset,
}

/// Build a session manager whose events are printed to stdout.
pub fn start_manager(global: &GlobalArgs, json: bool) -> Result<SessionManager> {
    let mut config = load_config();
    if global.no_firewall_fix {
        config.firewall.auto_remediate = false;
    }

    let emitter = EventEmitter::new()?;
    emitter.set_listener(move |event: &SessionEvent| {
        if json {
            println!("{}", ui::event_json(event));
        } else {
            println!("{}", ui::format_event(event));
        }
    });

    Ok(SessionManager::new(config, emitter)?)
}

/// Turn a session start failure into an error carrying its hint.
pub fn start_error(err: beamsync_core::Error) -> anyhow::Error {
    match err.suggestion() {
        Some(hint) => anyhow::anyhow!("{err}\n\n{hint}"),
        None => err.into(),
    }
}

/// Wait for Ctrl-C, then stop every session.
pub async fn run_until_interrupted(manager: &mut SessionManager, json: bool) -> Result<()> {
    tokio::signal::ctrl_c().await?;

    if !json {
        println!();
        println!("  Stopping...");
    }
    manager.shutdown().await;
    Ok(())
}
