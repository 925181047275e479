//! Local address detection and the advertised connection URL.
//!
//! The "local IP" is the source address the OS would pick to reach
//! [`DEFAULT_PROBE_TARGET`]. A UDP socket is `connect`ed to the target, which
//! only performs route resolution; no packet is sent and the target need not
//! be reachable. This is a heuristic for "the address peers on this subnet
//! should use", not a connectivity check. When resolution fails the
//! loopback address is assumed and the next sample tries again.
//!
//! The [`NetworkMonitor`] re-samples the address on an interval and when a
//! peer connects, and emits `url_changed` for every active role whose URL
//! actually changed.

use std::collections::BTreeMap;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::events::{EventEmitter, SessionEvent};
use crate::session::Role;

/// Address used for route resolution.
pub const DEFAULT_PROBE_TARGET: &str = "8.8.8.8:80";

/// Source of the host's current local address.
pub trait AddressProbe: Send + Sync + 'static {
    /// Current local address; never fails.
    fn local_ip(&self) -> IpAddr;
}

/// Route-resolution probe against a fixed target.
#[derive(Debug, Clone)]
pub struct RouteProbe {
    target: SocketAddr,
}

impl RouteProbe {
    /// Create a probe that resolves the route to `target`.
    #[must_use]
    pub const fn new(target: SocketAddr) -> Self {
        Self { target }
    }
}

impl Default for RouteProbe {
    fn default() -> Self {
        Self::new(SocketAddr::from(([8, 8, 8, 8], 80)))
    }
}

impl AddressProbe for RouteProbe {
    fn local_ip(&self) -> IpAddr {
        resolve_local_ip(self.target).unwrap_or_else(|e| {
            tracing::warn!("Local address lookup failed, assuming loopback: {}", e);
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        })
    }
}

/// Resolve the local source address for traffic to `target`.
///
/// # Errors
///
/// Returns the OS error if no route is available.
pub fn resolve_local_ip(target: SocketAddr) -> std::io::Result<IpAddr> {
    let bind_addr: SocketAddr = if target.is_ipv4() {
        SocketAddr::from(([0, 0, 0, 0], 0))
    } else {
        SocketAddr::from(([0u16; 8], 0))
    };

    let socket = UdpSocket::bind(bind_addr)?;
    socket.connect(target)?;
    Ok(socket.local_addr()?.ip())
}

/// Format the URL peers use to reach a service.
#[must_use]
pub fn format_url(ip: IpAddr, port: u16) -> String {
    format!("http://{}", SocketAddr::new(ip, port))
}

/// The IP and per-role ports shown to the operator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdvertisedEndpoint {
    /// Last observed local address
    pub ip: Option<IpAddr>,
    /// Bound port of each active role
    pub ports: BTreeMap<Role, u16>,
}

impl AdvertisedEndpoint {
    /// URL for `role`, if that role has a bound port.
    #[must_use]
    pub fn url(&self, role: Role) -> Option<String> {
        let port = *self.ports.get(&role)?;
        let ip = self.ip.unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));
        Some(format_url(ip, port))
    }
}

/// Tracks the advertised endpoint and reports address changes.
pub struct NetworkMonitor {
    probe: Arc<dyn AddressProbe>,
    endpoint: Mutex<AdvertisedEndpoint>,
    /// Held for a whole lookup-compare-update so samples commit in order.
    sampling: Mutex<()>,
    emitter: EventEmitter,
}

impl NetworkMonitor {
    /// Create a monitor using `probe` for address lookups.
    #[must_use]
    pub fn new(probe: Arc<dyn AddressProbe>, emitter: EventEmitter) -> Self {
        Self {
            probe,
            endpoint: Mutex::new(AdvertisedEndpoint::default()),
            sampling: Mutex::new(()),
            emitter,
        }
    }

    /// Record a newly bound port for `role` and return its URL.
    ///
    /// The address is sampled afresh so the returned URL is current. If it
    /// moved, roles that were already active get `url_changed` first.
    pub async fn activate(self: &Arc<Self>, role: Role, port: u16) -> String {
        self.sample().await;
        self.register(role, port)
    }

    fn register(&self, role: Role, port: u16) -> String {
        let mut endpoint = self.lock();
        endpoint.ports.insert(role, port);
        endpoint
            .url(role)
            .unwrap_or_else(|| format_url(IpAddr::V4(Ipv4Addr::LOCALHOST), port))
    }

    /// Forget the port of `role`; no further URL events are raised for it.
    pub fn deactivate(&self, role: Role) {
        self.lock().ports.remove(&role);
    }

    /// Forget every active port.
    pub fn deactivate_all(&self) {
        self.lock().ports.clear();
    }

    /// Current URL for `role`.
    #[must_use]
    pub fn url(&self, role: Role) -> Option<String> {
        self.lock().url(role)
    }

    /// Copy of the advertised endpoint.
    #[must_use]
    pub fn endpoint(&self) -> AdvertisedEndpoint {
        self.lock().clone()
    }

    /// Re-sample the local address.
    ///
    /// If it differs from the last observed one, the endpoint is updated and
    /// `url_changed` is emitted once per active role. Returns the new URLs.
    ///
    /// Blocks on the route lookup; async callers use [`sample`](Self::sample).
    pub fn refresh(&self) -> Vec<String> {
        let _sampling = self.sampling.lock().unwrap_or_else(PoisonError::into_inner);
        let ip = self.probe.local_ip();

        let changed_urls = {
            let mut endpoint = self.lock();
            match endpoint.ip {
                Some(previous) if previous == ip => return Vec::new(),
                // Nothing has been advertised yet, so nothing is stale.
                None => {
                    endpoint.ip = Some(ip);
                    return Vec::new();
                }
                Some(previous) => {
                    tracing::info!("Network change detected: {} -> {}", previous, ip);
                    endpoint.ip = Some(ip);
                }
            }
            endpoint
                .ports
                .values()
                .map(|port| format_url(ip, *port))
                .collect::<Vec<_>>()
        };

        for url in &changed_urls {
            tracing::info!("Updating URL to: {}", url);
            self.emitter.emit(SessionEvent::UrlChanged(url.clone()));
        }

        changed_urls
    }

    /// [`refresh`](Self::refresh) on the blocking pool.
    pub async fn sample(self: &Arc<Self>) -> Vec<String> {
        let monitor = Arc::clone(self);
        match tokio::task::spawn_blocking(move || monitor.refresh()).await {
            Ok(urls) => urls,
            Err(e) => {
                tracing::warn!("Network monitor sample failed: {}", e);
                Vec::new()
            }
        }
    }

    /// Spawn the periodic sampler. It stops when `cancel` fires.
    pub fn spawn(self: &Arc<Self>, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let monitor = Arc::clone(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        monitor.sample().await;
                    }
                }
            }

            tracing::debug!("Network monitor stopped");
        })
    }

    fn lock(&self) -> MutexGuard<'_, AdvertisedEndpoint> {
        self.endpoint.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for NetworkMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkMonitor")
            .field("endpoint", &*self.lock())
            .finish_non_exhaustive()
    }
}
