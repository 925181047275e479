//! Config command implementation.

use anyhow::{Context, Result};

use beamsync_core::config::Config;

use super::{ConfigAction, ConfigArgs};

/// Run the config command.
pub fn run(args: ConfigArgs) -> Result<()> {
    match args.action {
        ConfigAction::Show => show(),
        ConfigAction::Path => {
            println!("{}", Config::config_path().display());
            Ok(())
        }
        ConfigAction::Reset => reset(),
    }
}

fn show() -> Result<()> {
    let config = Config::load()?;
    let rendered = toml::to_string_pretty(&config).context("Failed to render configuration")?;

    println!("# {}", Config::config_path().display());
    println!();
    print!("{rendered}");

    if let Err(e) = config.validate() {
        eprintln!();
        eprintln!("  Warning: {e}");
    }
    Ok(())
}

fn reset() -> Result<()> {
    Config::default().save()?;
    println!(
        "  Configuration reset to defaults at {}",
        Config::config_path().display()
    );
    Ok(())
}
