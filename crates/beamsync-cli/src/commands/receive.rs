//! Receive command implementation.

use anyhow::Result;

use beamsync_core::session::Role;

use super::ReceiveArgs;
use crate::ui::{self, UrlBox};

/// Run the receive command.
pub async fn run(args: ReceiveArgs, global: &super::GlobalArgs) -> Result<()> {
    let mut manager = super::start_manager(global, args.json)?;

    let save_dir = args
        .dir
        .unwrap_or_else(|| manager.config().receiver.resolved_save_dir());

    let info = manager
        .start_receiver(save_dir.clone())
        .await
        .map_err(super::start_error)?;

    if args.json {
        let output = serde_json::json!({
            "status": "receiving",
            "role": Role::Receiver.as_str(),
            "port": info.port,
            "url": info.url,
            "save_dir": save_dir.display().to_string(),
        });
        println!("{}", serde_json::to_string(&output)?);
    } else {
        println!();
        println!("BeamSync v{}", beamsync_core::VERSION);
        println!("{}", "-".repeat(37));
        println!();
        println!("  Open this address on your phone to send files here:");
        println!();
        UrlBox::new(&info.url).display();
        println!();
        ui::print_qr(&info.url);
        println!("  Saving to {}", save_dir.display());
        println!("  Press Ctrl-C to stop.");
        println!();
    }

    super::run_until_interrupted(&mut manager, args.json).await
}
