//! Common test utilities for `BeamSync` integration tests.
//!
//! This module provides shared functionality for integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::mpsc;
use std::time::Duration;

use beamsync_core::config::Config;
use beamsync_core::events::{EventEmitter, SessionEvent};

/// Base port for tests, advanced for each test to avoid conflicts.
static TEST_PORT_COUNTER: AtomicU16 = AtomicU16::new(46000);

/// Ports per test: each role scans a handful of candidates.
const PORTS_PER_TEST: u16 = 20;

/// Create a temporary directory for test files.
pub fn create_temp_dir() -> tempfile::TempDir {
    tempfile::tempdir().expect("Failed to create temp directory")
}

/// Create a test file with the given content.
pub fn create_test_file(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).expect("Failed to write test file");
    path
}

/// Config with port ranges no other test uses and fast timers.
pub fn test_config() -> Config {
    let base = TEST_PORT_COUNTER.fetch_add(PORTS_PER_TEST, Ordering::SeqCst);

    let mut config = Config::default();
    config.receiver.port_start = base;
    config.receiver.max_attempts = 5;
    config.sender.port_start = base + 1;
    config.sender.max_attempts = 5;
    config.presence.heartbeat_timeout = Duration::from_millis(600);
    config.presence.watchdog_interval = Duration::from_millis(100);
    config.network.monitor_interval = Duration::from_millis(200);
    config.server.shutdown_grace = Duration::from_secs(2);
    config.firewall.auto_remediate = false;
    config
}

/// Emitter whose events are collected for inspection.
pub struct EventLog {
    pub emitter: EventEmitter,
    rx: mpsc::Receiver<SessionEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        let emitter = EventEmitter::new().expect("Failed to start emitter");
        let (tx, rx) = mpsc::channel();
        emitter.set_listener(move |event: &SessionEvent| {
            let _ = tx.send(event.clone());
        });
        Self { emitter, rx }
    }

    /// Next event, waiting up to two seconds.
    pub fn next(&self) -> Option<SessionEvent> {
        self.rx.recv_timeout(Duration::from_secs(2)).ok()
    }

    /// Wait for the first event matching `pred`, skipping others.
    pub fn wait_for(&self, pred: impl Fn(&SessionEvent) -> bool) -> Option<SessionEvent> {
        while let Some(event) = self.next() {
            if pred(&event) {
                return Some(event);
            }
        }
        None
    }

    /// Assert that nothing arrives within `window`.
    pub fn assert_quiet(&self, window: Duration) {
        if let Ok(event) = self.rx.recv_timeout(window) {
            panic!("unexpected event: {event}");
        }
    }
}

/// Loopback URL for a bound port.
pub fn local_url(port: &str, path: &str) -> String {
    format!("http://127.0.0.1:{port}{path}")
}

/// HTTP client for talking to a session.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .timeout(Duration::from_secs(10))
        .build()
        .expect("Failed to build client")
}
