//! UI utilities for BeamSync CLI.

use qrcode::render::unicode;
use qrcode::{EcLevel, QrCode};

use beamsync_core::events::SessionEvent;

const BOX_WIDTH: usize = 33;

/// A formatted box for displaying the connection URL.
pub struct UrlBox<'a> {
    url: &'a str,
}

impl<'a> UrlBox<'a> {
    /// Create a new URL box.
    #[must_use]
    pub const fn new(url: &'a str) -> Self {
        Self { url }
    }

    /// Display the URL box to stdout.
    pub fn display(&self) {
        let width = BOX_WIDTH.max(self.url.chars().count() + 4);

        println!("  ┌{}┐", "─".repeat(width));
        println!("  │{}│", " ".repeat(width));
        println!("  │{}│", center_in_box(self.url, width));
        println!("  │{}│", " ".repeat(width));
        println!("  └{}┘", "─".repeat(width));
    }
}

fn center_in_box(content: &str, width: usize) -> String {
    let content_len = content.chars().count();
    let padding = width.saturating_sub(content_len);
    let left = padding / 2;
    let right = padding - left;
    format!("{}{}{}", " ".repeat(left), content, " ".repeat(right))
}

/// Render `url` as a terminal QR code.
///
/// Uses Unicode half blocks so two modules fit in one character cell.
pub fn render_qr(url: &str) -> Result<String, qrcode::types::QrError> {
    let code = QrCode::with_error_correction_level(url, EcLevel::M)?;

    Ok(code
        .render::<unicode::Dense1x2>()
        .dark_color(unicode::Dense1x2::Light)
        .light_color(unicode::Dense1x2::Dark)
        .build())
}

/// Print the QR code for `url`, or nothing if it cannot be rendered.
pub fn print_qr(url: &str) {
    match render_qr(url) {
        Ok(qr) => {
            for line in qr.lines() {
                println!("  {}", line);
            }
            println!();
        }
        Err(e) => tracing::debug!("QR code unavailable: {}", e),
    }
}

/// One-line description of an event.
pub fn format_event(event: &SessionEvent) -> String {
    match event {
        SessionEvent::DeviceConnected(label) => format!("  + Connected: {}", label),
        SessionEvent::DeviceDisconnected => "  - Device disconnected".to_string(),
        SessionEvent::FileReceived(name) => format!("  * Received {}", name),
        SessionEvent::SenderStarted(url) => format!("  > Sharing at {}", url),
        SessionEvent::UrlChanged(url) => format!("  ! Network changed, new address: {}", url),
    }
}

/// Event as a JSON object with `event` and `payload` fields.
pub fn event_json(event: &SessionEvent) -> serde_json::Value {
    serde_json::json!({
        "event": event.name(),
        "payload": event.payload(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_center_in_box() {
        let centered = center_in_box("hello", 11);
        assert_eq!(centered, "   hello   ");

        let centered = center_in_box("hi", 6);
        assert_eq!(centered, "  hi  ");
    }

    #[test]
    fn test_render_qr() {
        let qr = render_qr("http://192.168.1.20:3000").unwrap();
        assert!(qr.lines().count() > 10);
    }

    #[test]
    fn test_format_event() {
        assert_eq!(
            format_event(&SessionEvent::FileReceived("report.pdf".into())),
            "  * Received report.pdf"
        );
        assert_eq!(
            format_event(&SessionEvent::DeviceDisconnected),
            "  - Device disconnected"
        );
    }

    #[test]
    fn test_event_json() {
        let value = event_json(&SessionEvent::UrlChanged("http://10.0.0.2:3000".into()));
        assert_eq!(value["event"], "url_changed");
        assert_eq!(value["payload"], "http://10.0.0.2:3000");

        let value = event_json(&SessionEvent::DeviceDisconnected);
        assert_eq!(value["payload"], "");
    }
}
