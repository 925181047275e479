//! Send command implementation.

use anyhow::Result;

use beamsync_core::session::Role;

use super::SendArgs;
use crate::ui::{self, UrlBox};

/// Run the send command.
pub async fn run(args: SendArgs, global: &super::GlobalArgs) -> Result<()> {
    let mut manager = super::start_manager(global, args.json)?;

    let info = manager
        .start_sender(&args.files)
        .await
        .map_err(super::start_error)?;

    if args.json {
        let output = serde_json::json!({
            "status": "sending",
            "role": Role::Sender.as_str(),
            "port": info.port,
            "url": info.url,
            "files": args.files.iter().map(|f| f.display().to_string()).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string(&output)?);
    } else {
        println!();
        println!("BeamSync v{}", beamsync_core::VERSION);
        println!("{}", "-".repeat(37));
        println!();
        println!("  Open this address on your phone to download:");
        println!();
        UrlBox::new(&info.url).display();
        println!();
        ui::print_qr(&info.url);
        for (index, file) in args.files.iter().enumerate() {
            let name = file
                .file_name()
                .map_or_else(|| file.display().to_string(), |n| n.to_string_lossy().into_owned());
            println!("  [{}] {}", index, name);
        }
        println!();
        println!("  Press Ctrl-C to stop.");
        println!();
    }

    super::run_until_interrupted(&mut manager, args.json).await
}
