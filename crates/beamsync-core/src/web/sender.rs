//! Handlers for the sender (download) service.

use std::fmt::Write as _;

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::Response,
};
use tokio::fs::File;
use tokio_util::io::ReaderStream;

use super::assets::{
    escape_html, html_response, missing_page, DOWNLOAD_PAGE, FILES_PLACEHOLDER, NO_STORE,
};
use super::error::{ApiError, ApiResult};
use super::state::{DownloadMode, SenderState, ServedFile};

/// GET / - Download page listing the offered files.
pub async fn index(State(state): State<SenderState>) -> Response {
    let Some(page) = state.assets.get_asset(DOWNLOAD_PAGE) else {
        return missing_page(DOWNLOAD_PAGE);
    };

    let html = String::from_utf8_lossy(&page)
        .replacen(FILES_PLACEHOLDER, &render_file_list(&state.files, state.mode()), 1);
    html_response(html)
}

/// GET /download - The only file of a single-file session.
pub async fn download(State(state): State<SenderState>) -> ApiResult<Response> {
    let file = state
        .files
        .first()
        .ok_or_else(|| ApiError::not_found("No file offered"))?;
    serve_file(file).await
}

/// GET /download/{index} - One file of a multi-file session.
pub async fn download_indexed(
    State(state): State<SenderState>,
    Path(index): Path<String>,
) -> ApiResult<Response> {
    let file = index
        .parse::<usize>()
        .ok()
        .and_then(|i| state.files.get(i))
        .ok_or_else(|| ApiError::not_found(format!("No file at index {index}")))?;
    serve_file(file).await
}

/// Stream a file from its original location as an attachment.
async fn serve_file(served: &ServedFile) -> ApiResult<Response> {
    let file = File::open(&served.path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ApiError::not_found(format!("{} is no longer available", served.name))
        } else {
            ApiError::internal(format!("Failed to open file: {e}"))
        }
    })?;

    let size = file
        .metadata()
        .await
        .map_err(|e| ApiError::internal(format!("Failed to read file metadata: {e}")))?
        .len();

    tracing::info!("Serving {} ({} bytes)", served.name, size);

    let content_type = mime_guess::from_path(&served.path).first_or_octet_stream();
    let body = Body::from_stream(ReaderStream::new(file));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type.as_ref())
        .header(header::CONTENT_DISPOSITION, content_disposition(&served.name))
        .header(header::CONTENT_LENGTH, size)
        .header(header::CACHE_CONTROL, NO_STORE)
        .body(body)
        .map_err(|e| ApiError::internal(format!("Failed to build response: {e}")))
}

/// `attachment` disposition carrying `name` as a quoted string.
fn content_disposition(name: &str) -> Vec<u8> {
    let quoted: String = name
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    format!("attachment; filename=\"{quoted}\"").into_bytes()
}

/// File cards substituted into the download page.
fn render_file_list(files: &[ServedFile], mode: DownloadMode) -> String {
    let mut html = String::new();
    for (index, file) in files.iter().enumerate() {
        let _ = write!(
            html,
            r#"<div class="file-card">
  <div class="file-info">{}</div>
  <a href="{}" class="download-btn" download>SAVE</a>
</div>
"#,
            escape_html(&file.name),
            mode.href(index),
        );
    }
    html
}
