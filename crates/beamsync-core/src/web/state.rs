//! Shared state for the transfer services.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::FromRef;

use crate::error::{Error, Result};
use crate::events::{EventEmitter, SessionEvent};
use crate::network::NetworkMonitor;
use crate::presence::{Observation, PresenceTracker};
use crate::session::Role;

use super::assets::AssetProvider;

/// Presence bookkeeping for one service.
///
/// Wraps the session's tracker with what is needed to act on the connect
/// edge: the emitter for `device_connected` and the monitor to re-check the
/// advertised address first.
pub struct PeerPresence {
    tracker: Arc<PresenceTracker>,
    emitter: EventEmitter,
    monitor: Option<Arc<NetworkMonitor>>,
    role: Role,
}

impl PeerPresence {
    /// Create presence handling for `role`.
    #[must_use]
    pub fn new(
        tracker: Arc<PresenceTracker>,
        emitter: EventEmitter,
        monitor: Option<Arc<NetworkMonitor>>,
        role: Role,
    ) -> Self {
        Self {
            tracker,
            emitter,
            monitor,
            role,
        }
    }

    /// Record peer activity.
    ///
    /// On the `Disconnected -> Connected` edge the local address is
    /// re-sampled (raising `url_changed` if it moved) before
    /// `device_connected` is emitted.
    pub async fn observe(&self) -> Observation {
        let observation = self.tracker.observe();

        if observation == Observation::Connected {
            let label = self.role.peer_label();
            tracing::info!("Device connected: {}", label);

            if let Some(monitor) = &self.monitor {
                monitor.sample().await;
            }
            self.emitter
                .emit(SessionEvent::DeviceConnected(label.to_string()));
        } else {
            tracing::debug!("Heartbeat from {}", self.role.peer_label());
        }

        observation
    }

    /// The underlying tracker.
    #[must_use]
    pub const fn tracker(&self) -> &Arc<PresenceTracker> {
        &self.tracker
    }

    /// Role this presence belongs to.
    #[must_use]
    pub const fn role(&self) -> Role {
        self.role
    }
}

impl std::fmt::Debug for PeerPresence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerPresence")
            .field("role", &self.role)
            .field("tracker", &self.tracker)
            .finish_non_exhaustive()
    }
}

/// State for the receiver (upload) service.
#[derive(Clone)]
pub struct ReceiverState {
    /// Directory uploads are written into
    pub save_dir: Arc<PathBuf>,
    /// Upper bound on one upload request body
    pub max_upload_bytes: u64,
    /// Presence handling
    pub presence: Arc<PeerPresence>,
    /// Emitter for `file_received`
    pub emitter: EventEmitter,
    /// Landing page source
    pub assets: Arc<dyn AssetProvider>,
}

impl FromRef<ReceiverState> for Arc<PeerPresence> {
    fn from_ref(state: &ReceiverState) -> Self {
        Arc::clone(&state.presence)
    }
}

/// A file offered by the sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServedFile {
    /// Location on disk
    pub path: PathBuf,
    /// Base name presented to the peer
    pub name: String,
}

impl ServedFile {
    /// Describe the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileNotFound`] if `path` is not a regular file.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.is_file() {
            return Err(Error::FileNotFound(path.display().to_string()));
        }

        let name = display_name(&path);
        Ok(Self { path, name })
    }
}

fn display_name(path: &Path) -> String {
    path.file_name().map_or_else(
        || path.display().to_string(),
        |n| n.to_string_lossy().into_owned(),
    )
}

/// How downloads are addressed, fixed when the sender starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadMode {
    /// One file at `/download`
    Single,
    /// Files at `/download/{index}`
    Multi,
}

impl DownloadMode {
    /// Mode for a selection of `count` files.
    #[must_use]
    pub const fn for_count(count: usize) -> Self {
        if count == 1 {
            Self::Single
        } else {
            Self::Multi
        }
    }

    /// Link to the file at `index`.
    #[must_use]
    pub fn href(self, index: usize) -> String {
        match self {
            Self::Single => "/download".to_string(),
            Self::Multi => format!("/download/{index}"),
        }
    }
}

/// State for the sender (download) service.
#[derive(Clone)]
pub struct SenderState {
    /// Files in selection order
    pub files: Arc<[ServedFile]>,
    /// Presence handling
    pub presence: Arc<PeerPresence>,
    /// Landing page source
    pub assets: Arc<dyn AssetProvider>,
}

impl SenderState {
    /// Download addressing for this selection.
    #[must_use]
    pub fn mode(&self) -> DownloadMode {
        DownloadMode::for_count(self.files.len())
    }
}

impl FromRef<SenderState> for Arc<PeerPresence> {
    fn from_ref(state: &SenderState) -> Self {
        Arc::clone(&state.presence)
    }
}
