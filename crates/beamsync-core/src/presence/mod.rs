//! Peer presence tracking.
//!
//! A [`PresenceTracker`] holds the two-state machine for one session:
//!
//! ```text
//!               heartbeat / upload
//!  Disconnected ───────────────────▶ Connected ─┐ heartbeat / upload
//!       ▲                               │  ◀────┘ (timestamp only)
//!       └────── watchdog: silence > timeout
//! ```
//!
//! Both fields live behind one lock. Every observation and every watchdog
//! check is a single read-modify-write under that lock, so exactly one
//! caller wins each edge and the watchdog never acts on a torn snapshot.
//! The lock is never held across an `.await` or any I/O.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::events::{EventEmitter, SessionEvent};

/// Connection state of the remote peer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PresenceState {
    /// No peer activity within the timeout window
    #[default]
    Disconnected,
    /// A peer has been seen recently
    Connected,
}

/// Result of recording peer activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// This observation moved the state from `Disconnected` to `Connected`
    Connected,
    /// The peer was already connected; only the timestamp moved
    Refreshed,
}

/// Consistent view of the tracker's fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresenceSnapshot {
    /// Current state
    pub state: PresenceState,
    /// Time of the most recent heartbeat or upload, if any
    pub last_heartbeat: Option<Instant>,
}

#[derive(Debug, Default)]
struct Inner {
    connected: bool,
    last_heartbeat: Option<Instant>,
}

/// Presence state for one session.
#[derive(Debug)]
pub struct PresenceTracker {
    inner: Mutex<Inner>,
    timeout: Duration,
}

impl PresenceTracker {
    /// Create a tracker in the `Disconnected` state.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            timeout,
        }
    }

    /// Silence threshold after which the watchdog demotes the peer.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Record peer activity now.
    pub fn observe(&self) -> Observation {
        self.observe_at(Instant::now())
    }

    /// Record peer activity at `now`.
    pub fn observe_at(&self, now: Instant) -> Observation {
        let mut inner = self.lock();
        inner.last_heartbeat = Some(now);
        if inner.connected {
            Observation::Refreshed
        } else {
            inner.connected = true;
            Observation::Connected
        }
    }

    /// Demote a silent peer. Returns `true` only for the call that performs
    /// the `Connected -> Disconnected` edge.
    pub fn expire_at(&self, now: Instant) -> bool {
        let mut inner = self.lock();
        let silent = inner
            .last_heartbeat
            .is_none_or(|last| now.saturating_duration_since(last) > self.timeout);

        if inner.connected && silent {
            inner.connected = false;
            true
        } else {
            false
        }
    }

    /// Current state and last heartbeat, read together.
    #[must_use]
    pub fn snapshot(&self) -> PresenceSnapshot {
        let inner = self.lock();
        PresenceSnapshot {
            state: if inner.connected {
                PresenceState::Connected
            } else {
                PresenceState::Disconnected
            },
            last_heartbeat: inner.last_heartbeat,
        }
    }

    /// Whether a peer is currently considered connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.lock().connected
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Spawn the watchdog for a session.
///
/// Every `interval` the watchdog checks the tracker and emits
/// `device_disconnected` once per demotion. The task ends when `cancel`
/// fires; await the returned handle to be sure it no longer touches the
/// tracker.
pub fn spawn_watchdog(
    tracker: Arc<PresenceTracker>,
    emitter: EventEmitter,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::debug!("Watchdog started");

        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if tracker.expire_at(Instant::now()) {
                        tracing::info!("Device disconnected (no heartbeat for {:?})", tracker.timeout());
                        emitter.emit(SessionEvent::DeviceDisconnected);
                    }
                }
            }
        }

        tracing::debug!("Watchdog stopped");
    })
}
