//! Landing pages for the transfer services.
//!
//! Pages are looked up through an [`AssetProvider`] so the services do not
//! depend on where HTML comes from. [`EmbeddedAssets`] serves the pages
//! compiled into the binary with rust-embed.

use std::borrow::Cow;

use axum::{
    body::Body,
    http::{header, StatusCode},
    response::Response,
};
use rust_embed::RustEmbed;

/// Page served at `/` by the receiver.
pub const UPLOAD_PAGE: &str = "upload.html";

/// Page served at `/` by the sender.
pub const DOWNLOAD_PAGE: &str = "download.html";

/// Placeholder in the download page replaced by the file list.
pub const FILES_PLACEHOLDER: &str = "{{FILES}}";

/// Cache policy for pages and downloads.
pub const NO_STORE: &str = "no-store, no-cache, must-revalidate";

/// Source of static page content.
pub trait AssetProvider: Send + Sync + 'static {
    /// Bytes of the named asset, if present.
    fn get_asset(&self, name: &str) -> Option<Cow<'static, [u8]>>;
}

/// Embedded static assets for the landing pages.
#[derive(RustEmbed)]
#[folder = "src/web/assets/"]
#[include = "*.html"]
struct Assets;

/// Pages compiled into the binary.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbeddedAssets;

impl AssetProvider for EmbeddedAssets {
    fn get_asset(&self, name: &str) -> Option<Cow<'static, [u8]>> {
        Assets::get(name).map(|file| file.data)
    }
}

/// Build an HTML response that is never cached.
pub(crate) fn html_response(body: impl Into<Body>) -> Response {
    let mut response = Response::new(body.into());
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("text/html; charset=utf-8"),
    );
    headers.insert(header::CACHE_CONTROL, header::HeaderValue::from_static(NO_STORE));
    response
}

/// Response used when a page is missing from the provider.
pub(crate) fn missing_page(name: &str) -> Response {
    tracing::error!("Asset '{}' not available", name);
    let mut response = Response::new(Body::from("UI Load Error"));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
}

/// Escape text for inclusion in HTML content or a quoted attribute.
pub(crate) fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pages_embedded() {
        assert!(EmbeddedAssets.get_asset(UPLOAD_PAGE).is_some());
        assert!(EmbeddedAssets.get_asset(DOWNLOAD_PAGE).is_some());
        assert!(EmbeddedAssets.get_asset("missing.html").is_none());
    }

    #[test]
    fn test_download_page_has_placeholder() {
        let page = EmbeddedAssets.get_asset(DOWNLOAD_PAGE).unwrap();
        let html = String::from_utf8_lossy(&page);
        assert!(html.contains(FILES_PLACEHOLDER));
    }

    #[test]
    fn test_pages_send_heartbeats() {
        for name in [UPLOAD_PAGE, DOWNLOAD_PAGE] {
            let page = EmbeddedAssets.get_asset(name).unwrap();
            assert!(String::from_utf8_lossy(&page).contains("/heartbeat"));
        }
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<a href="x">&'"#),
            "&lt;a href=&quot;x&quot;&gt;&amp;&#39;"
        );
        assert_eq!(escape_html("report.pdf"), "report.pdf");
    }

    #[test]
    fn test_html_response_headers() {
        let response = html_response("<p>hi</p>");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CACHE_CONTROL], NO_STORE);
    }
}
