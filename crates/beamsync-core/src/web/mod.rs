//! HTTP services for the receiver and sender roles.
//!
//! Each role runs its own axum router on its own port. A phone on the same
//! network opens the advertised URL in a browser; the page it gets keeps
//! posting heartbeats so the host can tell whether anyone is still there.
//!
//! ## Receiver
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | GET | `/` | Upload page |
//! | POST | `/heartbeat` | Peer liveness |
//! | POST | `/upload` | Multipart form, files in field `documents` |
//!
//! ## Sender
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | GET | `/` | Download page |
//! | POST | `/heartbeat` | Peer liveness |
//! | GET | `/download` | The file (single-file session) |
//! | GET | `/download/{index}` | File at `index` (multi-file session) |

pub mod assets;
pub mod error;
pub mod receiver;
pub mod sender;
pub mod state;

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::{catch_panic::CatchPanicLayer, limit::RequestBodyLimitLayer};

use crate::error::{Error, Result};

pub use assets::{AssetProvider, EmbeddedAssets};
pub use error::{ApiError, ApiResult};
pub use state::{DownloadMode, PeerPresence, ReceiverState, SenderState, ServedFile};

/// POST /heartbeat - Record peer liveness.
pub async fn heartbeat(State(presence): State<Arc<PeerPresence>>) -> StatusCode {
    presence.observe().await;
    StatusCode::OK
}

/// Count a request as peer activity before anything else handles it, so
/// rejected uploads still register the peer.
async fn observe_peer(
    State(presence): State<Arc<PeerPresence>>,
    request: Request,
    next: Next,
) -> Response {
    presence.observe().await;
    next.run(request).await
}

async fn not_found() -> ApiError {
    ApiError::not_found("Not found")
}

/// Build the receiver router.
pub fn receiver_router(state: ReceiverState) -> Router {
    let limit = usize::try_from(state.max_upload_bytes).unwrap_or(usize::MAX);

    Router::new()
        .route("/", get(receiver::index).fallback(not_found))
        .route("/heartbeat", post(heartbeat))
        .route(
            "/upload",
            post(receiver::upload).layer(
                ServiceBuilder::new()
                    .layer(middleware::from_fn_with_state(
                        Arc::clone(&state.presence),
                        observe_peer,
                    ))
                    .layer(RequestBodyLimitLayer::new(limit))
                    .layer(DefaultBodyLimit::disable()),
            ),
        )
        .fallback(not_found)
        .layer(CatchPanicLayer::new())
        .with_state(state)
}

/// Build the sender router. Download routes follow the session's
/// [`DownloadMode`].
pub fn sender_router(state: SenderState) -> Router {
    let router = Router::new()
        .route("/", get(sender::index).fallback(not_found))
        .route("/heartbeat", post(heartbeat));

    let router = match state.mode() {
        DownloadMode::Single => router.route("/download", get(sender::download)),
        DownloadMode::Multi => router.route("/download/{index}", get(sender::download_indexed)),
    };

    router
        .fallback(not_found)
        .layer(CatchPanicLayer::new())
        .with_state(state)
}

/// Serve `router` on an already bound listener until `cancel` fires.
///
/// In-flight requests are allowed to finish after cancellation; new
/// connections are refused.
///
/// # Errors
///
/// Returns an error if the listener cannot be registered with the runtime.
pub fn spawn_server(
    listener: std::net::TcpListener,
    router: Router,
    cancel: CancellationToken,
) -> Result<JoinHandle<()>> {
    let listener = tokio::net::TcpListener::from_std(listener)
        .map_err(|e| Error::Server(format!("Failed to register listener: {e}")))?;
    let addr = listener.local_addr()?;

    Ok(tokio::spawn(async move {
        tracing::debug!("HTTP server listening on {}", addr);

        let server = axum::serve(listener, router).with_graceful_shutdown(cancel.cancelled_owned());
        if let Err(e) = server.await {
            tracing::error!("HTTP server on {} failed: {}", addr, e);
        }

        tracing::debug!("HTTP server on {} stopped", addr);
    }))
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::PathBuf;
    use std::sync::mpsc as std_mpsc;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{header, Method, Request};
    use axum::response::Response;
    use http_body_util::BodyExt;
    use tempfile::TempDir;

    use super::*;
    use crate::events::{EventEmitter, SessionEvent};
    use crate::presence::PresenceTracker;
    use crate::session::Role;

    const BOUNDARY: &str = "beamsync-test-boundary";

    /// Routers wired to a temp directory and an event collector.
    pub(crate) struct TestHarness {
        dir: TempDir,
        emitter: EventEmitter,
        events: std_mpsc::Receiver<SessionEvent>,
        upload_limit: u64,
    }

    impl TestHarness {
        pub(crate) fn new() -> Self {
            Self::with_upload_limit(crate::DEFAULT_MAX_UPLOAD_BYTES)
        }

        pub(crate) fn with_upload_limit(upload_limit: u64) -> Self {
            let dir = TempDir::new().unwrap();
            std::fs::create_dir_all(dir.path().join("recv")).unwrap();
            std::fs::create_dir_all(dir.path().join("files")).unwrap();

            let emitter = EventEmitter::new().unwrap();
            let (tx, events) = std_mpsc::channel();
            emitter.set_listener(move |event: &SessionEvent| {
                let _ = tx.send(event.clone());
            });

            Self {
                dir,
                emitter,
                events,
                upload_limit,
            }
        }

        pub(crate) fn save_dir(&self) -> PathBuf {
            self.dir.path().join("recv")
        }

        pub(crate) fn files_dir(&self) -> PathBuf {
            self.dir.path().join("files")
        }

        fn presence(&self, role: Role) -> Arc<PeerPresence> {
            Arc::new(PeerPresence::new(
                Arc::new(PresenceTracker::new(Duration::from_secs(15))),
                self.emitter.clone(),
                None,
                role,
            ))
        }

        pub(crate) fn receiver_router(&self) -> Router {
            receiver_router(ReceiverState {
                save_dir: Arc::new(self.save_dir()),
                max_upload_bytes: self.upload_limit,
                presence: self.presence(Role::Receiver),
                emitter: self.emitter.clone(),
                assets: Arc::new(EmbeddedAssets),
            })
        }

        /// Sender router over freshly written `(name, contents)` files.
        pub(crate) fn sender_router(&self, files: &[(&str, &str)]) -> Router {
            let served: Vec<ServedFile> = files
                .iter()
                .map(|(name, contents)| {
                    let path = self.files_dir().join(name);
                    std::fs::write(&path, contents).unwrap();
                    ServedFile::new(path).unwrap()
                })
                .collect();

            sender_router(SenderState {
                files: served.into(),
                presence: self.presence(Role::Sender),
                assets: Arc::new(EmbeddedAssets),
            })
        }

        pub(crate) fn next_event(&self) -> Option<SessionEvent> {
            self.events.recv_timeout(Duration::from_millis(500)).ok()
        }
    }

    /// Multipart POST with one file part per `(field, file name, bytes)`.
    pub(crate) fn multipart_request(uri: &str, parts: &[(&str, &str, &[u8])]) -> Request<Body> {
        let mut body = Vec::new();
        for (field, file_name, data) in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .header(header::CONTENT_LENGTH, body.len())
            .body(Body::from(body))
            .unwrap()
    }

    pub(crate) async fn body_text(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }
}
