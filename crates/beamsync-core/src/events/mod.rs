//! Event delivery from the transfer services to an external listener.
//!
//! Producers (HTTP handlers, the watchdog, the network monitor) call
//! [`EventEmitter::emit`], which only enqueues. A single dispatch thread
//! drains the queue in submission order and hands each event to the
//! registered [`EventListener`]. A panicking listener is caught at the
//! dispatch boundary and logged; it never reaches the producer.
//!
//! Events emitted while no listener is registered are dropped. If the queue
//! is full the event is dropped with a warning rather than blocking the
//! producer.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::mpsc;

/// Default capacity of the dispatch queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// A one-shot notification from the core to the external listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A peer became active; carries a role-specific label
    DeviceConnected(String),
    /// The connected peer went silent past the timeout
    DeviceDisconnected,
    /// An uploaded file was saved; carries the saved filename
    FileReceived(String),
    /// A sender session is ready; carries its URL
    SenderStarted(String),
    /// The advertised URL changed; carries the new URL
    UrlChanged(String),
}

impl SessionEvent {
    /// Wire name of the event.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::DeviceConnected(_) => "device_connected",
            Self::DeviceDisconnected => "device_disconnected",
            Self::FileReceived(_) => "file_received",
            Self::SenderStarted(_) => "sender_started",
            Self::UrlChanged(_) => "url_changed",
        }
    }

    /// String payload of the event (empty for `device_disconnected`).
    #[must_use]
    pub fn payload(&self) -> &str {
        match self {
            Self::DeviceConnected(s)
            | Self::FileReceived(s)
            | Self::SenderStarted(s)
            | Self::UrlChanged(s) => s,
            Self::DeviceDisconnected => "",
        }
    }
}

impl fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.payload().is_empty() {
            f.write_str(self.name())
        } else {
            write!(f, "{}: {}", self.name(), self.payload())
        }
    }
}

/// Receiver of session events.
///
/// Called from the dispatch thread, one event at a time.
pub trait EventListener: Send + Sync + 'static {
    /// Handle one event.
    fn on_event(&self, event: &SessionEvent);
}

impl<F> EventListener for F
where
    F: Fn(&SessionEvent) + Send + Sync + 'static,
{
    fn on_event(&self, event: &SessionEvent) {
        self(event);
    }
}

type ListenerSlot = Arc<RwLock<Option<Arc<dyn EventListener>>>>;

/// Non-blocking handle for emitting [`SessionEvent`]s.
///
/// Cloning is cheap; all clones feed the same queue. The dispatch thread
/// exits once every clone has been dropped and the queue is drained.
#[derive(Clone)]
pub struct EventEmitter {
    tx: mpsc::Sender<SessionEvent>,
    listener: ListenerSlot,
}

impl EventEmitter {
    /// Create an emitter with the default queue capacity.
    ///
    /// # Errors
    ///
    /// Returns an error if the dispatch thread cannot be spawned.
    pub fn new() -> std::io::Result<Self> {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    /// Create an emitter with a bounded queue of `capacity` events.
    ///
    /// # Errors
    ///
    /// Returns an error if the dispatch thread cannot be spawned.
    pub fn with_capacity(capacity: usize) -> std::io::Result<Self> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let listener: ListenerSlot = Arc::new(RwLock::new(None));

        let slot = Arc::clone(&listener);
        std::thread::Builder::new()
            .name("beamsync-events".to_string())
            .spawn(move || dispatch_loop(rx, &slot))?;

        Ok(Self { tx, listener })
    }

    /// Register the listener, replacing any previous one.
    pub fn set_listener(&self, listener: impl EventListener) {
        *self.listener.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(listener));
        tracing::debug!("Event listener registered");
    }

    /// Whether a listener is currently registered.
    #[must_use]
    pub fn has_listener(&self) -> bool {
        self.listener
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Queue an event for the listener without waiting.
    pub fn emit(&self, event: SessionEvent) {
        if !self.has_listener() {
            tracing::debug!("No listener registered, dropping {}", event.name());
            return;
        }

        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                tracing::warn!("Event queue full, dropping {}", event.name());
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                tracing::warn!("Event dispatcher stopped, dropping {}", event.name());
            }
        }
    }
}

impl fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventEmitter")
            .field("has_listener", &self.has_listener())
            .field("queue_capacity", &self.tx.max_capacity())
            .finish()
    }
}

fn dispatch_loop(mut rx: mpsc::Receiver<SessionEvent>, slot: &ListenerSlot) {
    while let Some(event) = rx.blocking_recv() {
        let listener = slot.read().unwrap_or_else(PoisonError::into_inner).clone();

        let Some(listener) = listener else {
            tracing::debug!("Listener removed, dropping {}", event.name());
            continue;
        };

        tracing::debug!("Emitting event: {}", event);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| listener.on_event(&event)));
        if let Err(panic) = outcome {
            let reason = panic
                .downcast_ref::<&str>()
                .map(ToString::to_string)
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::warn!("Event listener panicked on {}: {}", event.name(), reason);
        }
    }

    tracing::debug!("Event dispatcher stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc as std_mpsc;
    use std::time::Duration;

    fn collecting_emitter() -> (EventEmitter, std_mpsc::Receiver<SessionEvent>) {
        let emitter = EventEmitter::new().unwrap();
        let (tx, rx) = std_mpsc::channel();
        emitter.set_listener(move |event: &SessionEvent| {
            let _ = tx.send(event.clone());
        });
        (emitter, rx)
    }

    #[test]
    fn test_event_names_and_payloads() {
        let event = SessionEvent::FileReceived("report.pdf".into());
        assert_eq!(event.name(), "file_received");
        assert_eq!(event.payload(), "report.pdf");
        assert_eq!(event.to_string(), "file_received: report.pdf");

        assert_eq!(SessionEvent::DeviceDisconnected.name(), "device_disconnected");
        assert_eq!(SessionEvent::DeviceDisconnected.payload(), "");
        assert_eq!(SessionEvent::DeviceDisconnected.to_string(), "device_disconnected");
    }

    #[test]
    fn test_emit_without_listener_is_noop() {
        let emitter = EventEmitter::new().unwrap();
        assert!(!emitter.has_listener());
        emitter.emit(SessionEvent::DeviceDisconnected);
    }

    #[test]
    fn test_events_arrive_in_submission_order() {
        let (emitter, rx) = collecting_emitter();

        for i in 0..20 {
            emitter.emit(SessionEvent::FileReceived(format!("file-{i}")));
        }

        for i in 0..20 {
            let event = rx.recv_timeout(Duration::from_secs(2)).unwrap();
            assert_eq!(event, SessionEvent::FileReceived(format!("file-{i}")));
        }
    }

    #[test]
    fn test_panicking_listener_does_not_stop_dispatch() {
        let emitter = EventEmitter::new().unwrap();
        let (tx, rx) = std_mpsc::channel();

        emitter.set_listener(move |event: &SessionEvent| {
            assert_ne!(event.payload(), "boom", "listener failure");
            let _ = tx.send(event.clone());
        });

        emitter.emit(SessionEvent::FileReceived("boom".into()));
        emitter.emit(SessionEvent::FileReceived("ok".into()));

        let event = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(event.payload(), "ok");
    }

    #[test]
    fn test_slow_listener_does_not_block_producer() {
        let emitter = EventEmitter::with_capacity(4).unwrap();
        let (tx, rx) = std_mpsc::channel();

        emitter.set_listener(move |event: &SessionEvent| {
            std::thread::sleep(Duration::from_millis(200));
            let _ = tx.send(event.clone());
        });

        let started = std::time::Instant::now();
        for _ in 0..50 {
            emitter.emit(SessionEvent::DeviceDisconnected);
        }
        assert!(started.elapsed() < Duration::from_millis(150));

        assert!(rx.recv_timeout(Duration::from_secs(2)).is_ok());
    }

    #[test]
    fn test_replacing_listener() {
        let (emitter, first_rx) = collecting_emitter();
        let (tx, second_rx) = std_mpsc::channel();

        emitter.set_listener(move |event: &SessionEvent| {
            let _ = tx.send(event.clone());
        });
        emitter.emit(SessionEvent::UrlChanged("http://10.0.0.2:3000".into()));

        let event = second_rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(event.name(), "url_changed");
        assert!(first_rx.try_recv().is_err());
    }
}
