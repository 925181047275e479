//! # BeamSync Core Library
//!
//! `beamsync-core` lets a phone and a computer on the same network exchange
//! files through a short-lived HTTP endpoint opened in the phone's browser.
//!
//! ## Features
//!
//! - **Receiver**: accepts multipart uploads into a directory
//! - **Sender**: serves selected files as attachments
//! - **Presence**: heartbeat tracking with a watchdog for silent peers
//! - **Network awareness**: the advertised URL follows local address changes
//!
//! ## Modules
//!
//! - [`config`] - Configuration management
//! - [`error`] - Error types
//! - [`events`] - Event delivery to an external listener
//! - [`firewall`] - Privileged firewall remediation helper
//! - [`network`] - Local address detection and the advertised URL
//! - [`port`] - Port allocation
//! - [`presence`] - Peer presence tracking and the watchdog
//! - [`session`] - Session lifecycle and the session manager
//! - [`web`] - HTTP services for both roles
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
//! let info = manager.start_sender(&["report.pdf".into()]).await?;
//! println!("Download from {}", info.url);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::unused_async)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::must_use_candidate)]

pub mod config;
pub mod error;
pub mod events;
pub mod firewall;
pub mod network;
pub mod port;
pub mod presence;
pub mod session;
pub mod web;

pub use error::{Error, Result};
pub use events::{EventEmitter, EventListener, SessionEvent};
pub use session::{Role, SessionInfo, SessionManager};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default first receiver port
pub const DEFAULT_RECEIVER_PORT: u16 = 3000;

/// Default first sender port
pub const DEFAULT_SENDER_PORT: u16 = 3005;

/// Default distance between candidate ports
pub const DEFAULT_PORT_STEP: u16 = 2;

/// Default number of candidate ports per role
pub const DEFAULT_PORT_ATTEMPTS: u32 = 50;

/// Default upper bound on one upload request (20 GiB)
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 20 * 1024 * 1024 * 1024;
