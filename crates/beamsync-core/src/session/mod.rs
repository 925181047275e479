//! Session lifecycle for the receiver and sender roles.
//!
//! A session is one running service: a bound port, its HTTP server, a
//! presence tracker and the watchdog for it. [`start_receiver`] and
//! [`start_sender`] create one and hand back a [`ServerHandle`];
//! [`ServerHandle::shutdown`] stops the watchdog and the server before
//! returning.
//!
//! [`SessionManager`] is the bridge used by front ends. It owns the event
//! emitter and the network monitor for the life of the application and keeps
//! at most one session per role, tearing the old one down before a new one
//! starts.
//!
//! ## Example
//!
//! ```rust,ignore
//! use beamsync_core::{config::Config, events::EventEmitter, session::SessionManager};
//!
//! let emitter = EventEmitter::new()?;
//! emitter.set_listener(|event: &_| println!("{event}"));
//!
//! let mut manager = SessionManager::new(Config::load()?, emitter)?;
//! let info = manager.start_receiver_default().await?;
//! println!("Open {} on your phone", info.url);
//! ```

use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::config::{Config, FirewallConfig};
use crate::error::{Error, Result};
use crate::events::{EventEmitter, SessionEvent};
use crate::firewall::FirewallHelper;
use crate::network::{AddressProbe, NetworkMonitor, RouteProbe};
use crate::port::{self, PortRange};
use crate::presence::{self, PresenceTracker};
use crate::web::receiver::sanitize_file_name;
use crate::web::{
    self, AssetProvider, EmbeddedAssets, PeerPresence, ReceiverState, SenderState, ServedFile,
};

/// The two service roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Role {
    /// Accepts uploads into a directory
    Receiver,
    /// Serves selected files for download
    Sender,
}

impl Role {
    /// Label carried by `device_connected` for this role's peer.
    #[must_use]
    pub const fn peer_label(self) -> &'static str {
        match self {
            Self::Receiver => "Mobile (Uploader)",
            Self::Sender => "Mobile (Downloader)",
        }
    }

    /// Lowercase role name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Receiver => "receiver",
            Self::Sender => "sender",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Collaborators shared by every session.
#[derive(Clone)]
pub struct SessionContext {
    /// Settings for ports, presence and shutdown
    pub config: Config,
    /// Destination for session events
    pub emitter: EventEmitter,
    /// Re-checked on every connect edge, if present
    pub monitor: Option<Arc<NetworkMonitor>>,
    /// Landing page source
    pub assets: Arc<dyn AssetProvider>,
}

impl SessionContext {
    /// Context with embedded pages and no network monitor.
    #[must_use]
    pub fn new(config: Config, emitter: EventEmitter) -> Self {
        Self {
            config,
            emitter,
            monitor: None,
            assets: Arc::new(EmbeddedAssets),
        }
    }

    /// Use `monitor` for connect-edge address checks.
    #[must_use]
    pub fn with_monitor(mut self, monitor: Arc<NetworkMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Serve landing pages from `assets`.
    #[must_use]
    pub fn with_assets(mut self, assets: Arc<dyn AssetProvider>) -> Self {
        self.assets = assets;
        self
    }

    fn presence(&self, tracker: &Arc<PresenceTracker>, role: Role) -> Arc<PeerPresence> {
        Arc::new(PeerPresence::new(
            Arc::clone(tracker),
            self.emitter.clone(),
            self.monitor.clone(),
            role,
        ))
    }
}

impl fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionContext")
            .field("config", &self.config)
            .field("monitor", &self.monitor)
            .finish_non_exhaustive()
    }
}

/// A running service.
///
/// Dropping the handle cancels the session without waiting for it; call
/// [`ServerHandle::shutdown`] to wait until it has stopped.
#[derive(Debug)]
pub struct ServerHandle {
    role: Role,
    port: u16,
    presence: Arc<PresenceTracker>,
    grace: Duration,
    cancel: CancellationToken,
    server: JoinHandle<()>,
    watchdog: JoinHandle<()>,
    _guard: DropGuard,
}

impl ServerHandle {
    fn spawn(
        role: Role,
        port: u16,
        listener: std::net::TcpListener,
        router: axum::Router,
        presence: Arc<PresenceTracker>,
        ctx: &SessionContext,
    ) -> Result<Self> {
        let cancel = CancellationToken::new();
        let server = web::spawn_server(listener, router, cancel.clone())?;
        let watchdog = presence::spawn_watchdog(
            Arc::clone(&presence),
            ctx.emitter.clone(),
            ctx.config.presence.watchdog_interval,
            cancel.clone(),
        );

        Ok(Self {
            role,
            port,
            presence,
            grace: ctx.config.server.shutdown_grace,
            _guard: cancel.clone().drop_guard(),
            cancel,
            server,
            watchdog,
        })
    }

    /// Role of this session.
    #[must_use]
    pub const fn role(&self) -> Role {
        self.role
    }

    /// Bound port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Bound port in decimal, for embedding in a URL.
    #[must_use]
    pub fn port_string(&self) -> String {
        self.port.to_string()
    }

    /// Presence state of this session's peer.
    #[must_use]
    pub const fn presence(&self) -> &Arc<PresenceTracker> {
        &self.presence
    }

    /// Stop the session.
    ///
    /// The watchdog is stopped first, then the server stops accepting and
    /// in-flight requests get up to the configured grace period before the
    /// server task is aborted. When this returns neither task is running.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] if a session task panicked.
    pub async fn shutdown(self) -> Result<()> {
        let Self {
            role,
            port,
            grace,
            cancel,
            mut server,
            watchdog,
            ..
        } = self;

        tracing::info!("Stopping {} on port {}", role, port);
        cancel.cancel();

        let watchdog_result = watchdog.await;

        let server_result = match tokio::time::timeout(grace, &mut server).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    "{} on port {} did not drain within {:?}, aborting",
                    role,
                    port,
                    grace
                );
                server.abort();
                match server.await {
                    Err(e) if e.is_cancelled() => Ok(()),
                    other => other,
                }
            }
        };

        watchdog_result
            .map_err(|e| Error::Internal(format!("{role} watchdog failed: {e}")))?;
        server_result.map_err(|e| Error::Internal(format!("{role} server failed: {e}")))
    }
}

/// Bind a port from `range` with `allocate`, running the firewall helper
/// once if the OS refuses on policy grounds.
async fn bind_with_remediation<L>(
    range: PortRange,
    firewall: &FirewallConfig,
    mut allocate: impl FnMut(PortRange) -> Result<(u16, L)>,
) -> Result<(u16, L)> {
    match allocate(range) {
        Err(err) if err.is_permission_denied() && firewall.auto_remediate => {
            tracing::warn!("{}; attempting firewall remediation", err);
            let output = FirewallHelper::from_config(firewall).remediate().await?;
            if !output.trim().is_empty() {
                tracing::info!("Firewall helper output:\n{}", output.trim_end());
            }
            allocate(range)
        }
        other => other,
    }
}

/// Start the receiver service saving into `save_dir`.
///
/// The directory (and its parents) is created if missing. Returns the handle
/// and the bound port in decimal.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or no port can be
/// bound.
pub async fn start_receiver(ctx: &SessionContext, save_dir: &Path) -> Result<(ServerHandle, String)> {
    tokio::fs::create_dir_all(save_dir).await?;

    let (port, listener) =
        bind_with_remediation(ctx.config.receiver.port_range(), &ctx.config.firewall, port::allocate)
            .await?;

    let tracker = Arc::new(PresenceTracker::new(ctx.config.presence.heartbeat_timeout));
    let router = web::receiver_router(ReceiverState {
        save_dir: Arc::new(save_dir.to_path_buf()),
        max_upload_bytes: ctx.config.receiver.max_upload_bytes,
        presence: ctx.presence(&tracker, Role::Receiver),
        emitter: ctx.emitter.clone(),
        assets: Arc::clone(&ctx.assets),
    });

    let handle = ServerHandle::spawn(Role::Receiver, port, listener, router, tracker, ctx)?;
    tracing::info!(
        "Receiver started on port {}, saving to {}",
        port,
        save_dir.display()
    );

    Ok((handle, port.to_string()))
}

/// Start the sender service offering `paths` in the given order.
///
/// # Errors
///
/// Returns [`Error::NoFilesSelected`] for an empty selection,
/// [`Error::FileNotFound`] if a path is not a regular file, or a port
/// allocation error.
pub async fn start_sender(ctx: &SessionContext, paths: &[PathBuf]) -> Result<(ServerHandle, String)> {
    if paths.is_empty() {
        return Err(Error::NoFilesSelected);
    }

    let files = paths
        .iter()
        .map(ServedFile::new)
        .collect::<Result<Vec<_>>>()?;

    let (port, listener) =
        bind_with_remediation(ctx.config.sender.port_range(), &ctx.config.firewall, port::allocate)
            .await?;

    let tracker = Arc::new(PresenceTracker::new(ctx.config.presence.heartbeat_timeout));
    let file_count = files.len();
    let router = web::sender_router(SenderState {
        files: files.into(),
        presence: ctx.presence(&tracker, Role::Sender),
        assets: Arc::clone(&ctx.assets),
    });

    let handle = ServerHandle::spawn(Role::Sender, port, listener, router, tracker, ctx)?;
    tracing::info!("Sender started on port {} with {} file(s)", port, file_count);

    Ok((handle, port.to_string()))
}

/// Result of starting a session through the [`SessionManager`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    /// Bound port in decimal
    pub port: String,
    /// URL for the peer to open
    pub url: String,
}

/// Owns the sessions of both roles and the application-wide collaborators.
pub struct SessionManager {
    ctx: SessionContext,
    monitor: Arc<NetworkMonitor>,
    monitor_cancel: CancellationToken,
    monitor_task: Option<JoinHandle<()>>,
    receiver: Option<ServerHandle>,
    sender: Option<ServerHandle>,
    last_save_dir: Option<PathBuf>,
}

impl SessionManager {
    /// Create a manager and start the network monitor.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `config` fails validation.
    pub fn new(config: Config, emitter: EventEmitter) -> Result<Self> {
        let target: SocketAddr = config.network.probe_target.parse().map_err(|_| {
            Error::InvalidConfig {
                key: "network.probe_target".to_string(),
                reason: "expected ip:port".to_string(),
            }
        })?;
        Self::with_probe(config, emitter, Arc::new(RouteProbe::new(target)))
    }

    /// Create a manager using `probe` for local address lookups.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `config` fails validation.
    pub fn with_probe(
        config: Config,
        emitter: EventEmitter,
        probe: Arc<dyn AddressProbe>,
    ) -> Result<Self> {
        config.validate()?;

        let monitor = Arc::new(NetworkMonitor::new(probe, emitter.clone()));
        let monitor_cancel = CancellationToken::new();
        let monitor_task = monitor.spawn(config.network.monitor_interval, monitor_cancel.clone());

        Ok(Self {
            ctx: SessionContext::new(config, emitter).with_monitor(Arc::clone(&monitor)),
            monitor,
            monitor_cancel,
            monitor_task: Some(monitor_task),
            receiver: None,
            sender: None,
            last_save_dir: None,
        })
    }

    /// Serve landing pages from `assets` in sessions started from now on.
    #[must_use]
    pub fn with_assets(mut self, assets: Arc<dyn AssetProvider>) -> Self {
        self.ctx.assets = assets;
        self
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.ctx.config
    }

    /// The application's network monitor.
    #[must_use]
    pub const fn monitor(&self) -> &Arc<NetworkMonitor> {
        &self.monitor
    }

    /// Start receiving into `save_dir`, replacing any running receiver.
    ///
    /// # Errors
    ///
    /// See [`start_receiver`].
    pub async fn start_receiver(&mut self, save_dir: impl Into<PathBuf>) -> Result<SessionInfo> {
        self.stop_receiver().await;

        let save_dir = save_dir.into();
        let (handle, port) = start_receiver(&self.ctx, &save_dir).await?;
        let url = self.monitor.activate(Role::Receiver, handle.port()).await;

        tracing::info!("Receiver available at {}", url);
        self.receiver = Some(handle);
        self.last_save_dir = Some(save_dir);

        Ok(SessionInfo { port, url })
    }

    /// Start receiving into the configured save directory.
    ///
    /// # Errors
    ///
    /// See [`start_receiver`].
    pub async fn start_receiver_default(&mut self) -> Result<SessionInfo> {
        let save_dir = self.ctx.config.receiver.resolved_save_dir();
        self.start_receiver(save_dir).await
    }

    /// Start offering `paths`, replacing any running sender.
    ///
    /// Emits `sender_started` with the URL.
    ///
    /// # Errors
    ///
    /// See [`start_sender`].
    pub async fn start_sender(&mut self, paths: &[PathBuf]) -> Result<SessionInfo> {
        self.stop_sender().await;

        let (handle, port) = start_sender(&self.ctx, paths).await?;
        let url = self.monitor.activate(Role::Sender, handle.port()).await;

        tracing::info!("Sender available at {}", url);
        self.ctx
            .emitter
            .emit(SessionEvent::SenderStarted(url.clone()));
        self.sender = Some(handle);

        Ok(SessionInfo { port, url })
    }

    /// Stop the receiver, if running.
    pub async fn stop_receiver(&mut self) {
        if let Some(handle) = self.receiver.take() {
            self.monitor.deactivate(Role::Receiver);
            if let Err(e) = handle.shutdown().await {
                tracing::warn!("Receiver did not stop cleanly: {}", e);
            }
        }
    }

    /// Stop the sender, if running.
    pub async fn stop_sender(&mut self) {
        if let Some(handle) = self.sender.take() {
            self.monitor.deactivate(Role::Sender);
            if let Err(e) = handle.shutdown().await {
                tracing::warn!("Sender did not stop cleanly: {}", e);
            }
        }
    }

    /// Stop both roles and forget the advertised ports.
    pub async fn reset(&mut self) {
        self.stop_receiver().await;
        self.stop_sender().await;
        self.monitor.deactivate_all();
    }

    /// Stop everything, including the network monitor.
    pub async fn shutdown(&mut self) {
        self.reset().await;
        self.monitor_cancel.cancel();
        if let Some(task) = self.monitor_task.take() {
            if let Err(e) = task.await {
                tracing::warn!("Network monitor did not stop cleanly: {}", e);
            }
        }
    }

    /// Whether a session of `role` is running.
    #[must_use]
    pub const fn is_active(&self, role: Role) -> bool {
        match role {
            Role::Receiver => self.receiver.is_some(),
            Role::Sender => self.sender.is_some(),
        }
    }

    /// Handle of the running session of `role`.
    #[must_use]
    pub const fn handle(&self, role: Role) -> Option<&ServerHandle> {
        match role {
            Role::Receiver => self.receiver.as_ref(),
            Role::Sender => self.sender.as_ref(),
        }
    }

    /// Current URL of `role`, if running.
    #[must_use]
    pub fn url(&self, role: Role) -> Option<String> {
        self.monitor.url(role)
    }

    /// Directory of the most recent receiver session.
    #[must_use]
    pub fn receiver_save_dir(&self) -> Option<&Path> {
        self.last_save_dir.as_deref()
    }

    /// Location of a received file by the name carried in `file_received`.
    ///
    /// Only the base name of `name` is used, so the result always lies inside
    /// the last save directory.
    #[must_use]
    pub fn resolve_received(&self, name: &str) -> Option<PathBuf> {
        let dir = self.last_save_dir.as_ref()?;
        sanitize_file_name(name).map(|base| dir.join(base))
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.monitor_cancel.cancel();
    }
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("receiver", &self.receiver)
            .field("sender", &self.sender)
            .field("last_save_dir", &self.last_save_dir)
            .finish_non_exhaustive()
    }
}
