//! BeamSync CLI - Same-network file exchange from the terminal
//!
//! BeamSync opens a short-lived web page on your computer. A phone on the
//! same Wi-Fi opens the printed URL (or scans the QR code) to upload files
//! to the computer or download files from it.
//!
//! ## Quick Start
//!
//! ```bash
//! # Let a phone upload into ~/Downloads/BeamSync
//! beamsync receive
//!
//! # Offer files for download
//! beamsync send ./slides.pdf ./photo.jpg
//! ```

#![allow(clippy::doc_markdown)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

use anyhow::Result;
use clap::Parser;

mod commands;
pub mod ui;

use commands::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.global.verbose);

    match cli.command {
        Command::Receive(args) => commands::receive::run(args, &cli.global).await,
        Command::Send(args) => commands::send::run(args, &cli.global).await,
        Command::Config(args) => commands::config::run(args),
    }
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let default_filter = if verbose {
        "debug"
    } else {
        "warn,beamsync=info,beamsync_core=info"
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).without_time())
        .with(filter)
        .init();
}
