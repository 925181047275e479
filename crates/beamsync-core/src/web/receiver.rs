//! Handlers for the receiver (upload) service.

use std::fmt::Write as _;
use std::path::Path;

use axum::{body::Body, extract::State, response::Response};
use axum_extra::extract::multipart::{Field, MultipartError, MultipartRejection};
use axum_extra::extract::Multipart;
use tokio::io::AsyncWriteExt;

use crate::events::SessionEvent;

use super::assets::{html_response, missing_page, UPLOAD_PAGE};
use super::error::{ApiError, ApiResult};
use super::state::ReceiverState;

/// Multipart field carrying uploaded files.
pub const UPLOAD_FIELD: &str = "documents";

/// GET / - Upload page.
pub async fn index(State(state): State<ReceiverState>) -> Response {
    state.assets.get_asset(UPLOAD_PAGE).map_or_else(
        || missing_page(UPLOAD_PAGE),
        |page| html_response(Body::from(page.into_owned())),
    )
}

/// POST /upload - Save every file part of a multipart form.
///
/// The router counts the request as peer activity before the body is
/// parsed. Each part is written independently; a part that cannot be
/// written is skipped and named in the response, which is still a success.
pub async fn upload(
    State(state): State<ReceiverState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<String> {
    let mut multipart = multipart.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let mut report = UploadReport::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let Some(original) = field.file_name().map(str::to_owned) else {
            continue;
        };

        let file_name = sanitize_file_name(&original).unwrap_or_else(generated_file_name);
        if file_name != original {
            tracing::debug!("Renamed upload '{}' to '{}'", original, file_name);
        }

        match save_part(&state.save_dir, &file_name, field).await {
            Ok(bytes) => {
                tracing::info!("Received file: {} ({} bytes)", file_name, bytes);
                state
                    .emitter
                    .emit(SessionEvent::FileReceived(file_name.clone()));
                report.saved.push(file_name);
            }
            Err(PartError::Body(e)) => return Err(multipart_error(e)),
            Err(PartError::Io(e)) => {
                tracing::warn!("Skipping '{}': {}", file_name, e);
                report.failed.push(file_name);
            }
        }
    }

    if report.total() == 0 {
        return Err(ApiError::bad_request("No files uploaded"));
    }

    Ok(report.summary())
}

fn multipart_error(err: MultipartError) -> ApiError {
    ApiError::new(err.status(), err.body_text())
}

/// Outcome of one upload request.
#[derive(Debug, Default)]
struct UploadReport {
    saved: Vec<String>,
    failed: Vec<String>,
}

impl UploadReport {
    fn total(&self) -> usize {
        self.saved.len() + self.failed.len()
    }

    fn summary(&self) -> String {
        let mut text = format!(
            "Upload Complete: saved {} of {} file(s)",
            self.saved.len(),
            self.total()
        );
        for name in &self.failed {
            let _ = write!(text, "\nfailed: {name}");
        }
        text
    }
}

#[derive(Debug)]
enum PartError {
    /// The request body broke; later parts are unreadable too.
    Body(MultipartError),
    /// Local write failure; only this part is lost.
    Io(std::io::Error),
}

/// Stream one part into `dir/file_name`.
///
/// Bytes go to a hidden part file first and are renamed into place only
/// after the copy completes.
async fn save_part(dir: &Path, file_name: &str, mut field: Field) -> Result<u64, PartError> {
    let temp_path = dir.join(format!(".beamsync-{}.part", uuid::Uuid::new_v4()));

    let result = match write_part(&temp_path, &mut field).await {
        Ok(bytes) => tokio::fs::rename(&temp_path, dir.join(file_name))
            .await
            .map(|()| bytes)
            .map_err(PartError::Io),
        Err(e) => Err(e),
    };

    if result.is_err() {
        let _ = tokio::fs::remove_file(&temp_path).await;
    }
    result
}

async fn write_part(path: &Path, field: &mut Field) -> Result<u64, PartError> {
    let mut file = tokio::fs::File::create(path).await.map_err(PartError::Io)?;
    let mut written = 0u64;

    while let Some(chunk) = field.chunk().await.map_err(PartError::Body)? {
        file.write_all(&chunk).await.map_err(PartError::Io)?;
        written += chunk.len() as u64;
    }

    file.flush().await.map_err(PartError::Io)?;
    Ok(written)
}

/// Reduce a client-supplied name to a bare file name.
///
/// Both `/` and `\` count as separators. Returns `None` when nothing usable
/// remains.
#[must_use]
pub fn sanitize_file_name(raw: &str) -> Option<String> {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or_default().trim();

    if base.is_empty() || base == "." || base == ".." || base.contains('\0') {
        return None;
    }
    Some(base.to_string())
}

/// Fallback name for uploads without a usable name.
#[must_use]
pub fn generated_file_name() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("upload_{}_{}.bin", chrono::Utc::now().timestamp(), &id[..8])
}
