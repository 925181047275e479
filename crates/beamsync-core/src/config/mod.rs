//! Configuration management for BeamSync.
//!
//! This module handles loading, saving, and validating BeamSync configuration.
//!
//! ## Configuration File Locations
//!
//! | Platform | Path |
//! |----------|------|
//! | Linux | `~/.config/beamsync/config.toml` |
//! | macOS | `~/Library/Application Support/com.beamsync.BeamSync/config.toml` |
//! | Windows | `%APPDATA%\beamsync\BeamSync\config\config.toml` |
//!
//! ## Example
//!
//! ```rust,ignore
//! use beamsync_core::config::Config;
//!
//! let config = Config::load()?;
//! println!("Receiver starts scanning at {}", config.receiver.port_start);
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::port::PortRange;

/// Main configuration struct for BeamSync.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Receiver (upload) service settings
    pub receiver: ReceiverConfig,
    /// Sender (download) service settings
    pub sender: SenderConfig,
    /// Peer presence settings
    pub presence: PresenceConfig,
    /// Network monitor settings
    pub network: NetworkConfig,
    /// HTTP server settings
    pub server: ServerConfig,
    /// Firewall remediation settings
    pub firewall: FirewallConfig,
}

/// Receiver service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    /// First candidate port
    pub port_start: u16,
    /// Distance between candidate ports
    pub port_step: u16,
    /// Number of candidates to try
    pub max_attempts: u32,
    /// Directory for received files (None = default downloads location)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub save_dir: Option<PathBuf>,
    /// Upper bound on a single upload request body
    pub max_upload_bytes: u64,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            port_start: crate::DEFAULT_RECEIVER_PORT,
            port_step: crate::DEFAULT_PORT_STEP,
            max_attempts: crate::DEFAULT_PORT_ATTEMPTS,
            save_dir: None,
            max_upload_bytes: crate::DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl ReceiverConfig {
    /// Port candidates for the receiver.
    #[must_use]
    pub const fn port_range(&self) -> PortRange {
        PortRange::new(self.port_start, self.port_step, self.max_attempts)
    }

    /// Resolve the save directory, falling back to the platform downloads folder.
    #[must_use]
    pub fn resolved_save_dir(&self) -> PathBuf {
        self.save_dir.clone().unwrap_or_else(default_save_dir)
    }
}

/// Sender service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SenderConfig {
    /// First candidate port
    pub port_start: u16,
    /// Distance between candidate ports
    pub port_step: u16,
    /// Number of candidates to try
    pub max_attempts: u32,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            port_start: crate::DEFAULT_SENDER_PORT,
            port_step: crate::DEFAULT_PORT_STEP,
            max_attempts: crate::DEFAULT_PORT_ATTEMPTS,
        }
    }
}

impl SenderConfig {
    /// Port candidates for the sender.
    #[must_use]
    pub const fn port_range(&self) -> PortRange {
        PortRange::new(self.port_start, self.port_step, self.max_attempts)
    }
}

/// Peer presence configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceConfig {
    /// Silence after which a connected peer is considered gone
    #[serde(with = "humantime_serde")]
    pub heartbeat_timeout: Duration,
    /// How often the watchdog checks for silence
    #[serde(with = "humantime_serde")]
    pub watchdog_interval: Duration,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            heartbeat_timeout: Duration::from_secs(15),
            watchdog_interval: Duration::from_secs(1),
        }
    }
}

/// Network monitor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// How often the local address is re-sampled
    #[serde(with = "humantime_serde")]
    pub monitor_interval: Duration,
    /// Address used for route resolution (never contacted)
    pub probe_target: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            monitor_interval: Duration::from_secs(3),
            probe_target: crate::network::DEFAULT_PROBE_TARGET.to_string(),
        }
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// How long shutdown waits for in-flight requests
    #[serde(with = "humantime_serde")]
    pub shutdown_grace: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

/// Firewall remediation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FirewallConfig {
    /// Run the helper automatically when a bind is refused
    pub auto_remediate: bool,
    /// Program used to elevate the helper
    pub elevate_command: String,
    /// Locations searched for the helper script, in order
    pub script_candidates: Vec<PathBuf>,
}

impl Default for FirewallConfig {
    fn default() -> Self {
        Self {
            auto_remediate: true,
            elevate_command: "pkexec".to_string(),
            script_candidates: vec![
                PathBuf::from("firewall_setup.sh"),
                PathBuf::from("build/linux/firewall_setup.sh"),
                PathBuf::from("../build/linux/firewall_setup.sh"),
            ],
        }
    }
}

/// Default directory for received files.
#[must_use]
pub fn default_save_dir() -> PathBuf {
    directories::UserDirs::new()
        .and_then(|dirs| dirs.download_dir().map(|d| d.join("BeamSync")))
        .unwrap_or_else(|| PathBuf::from("received_files"))
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// If the configuration file doesn't exist, returns the default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigError(format!("Failed to read config: {e}")))?;

        toml::from_str(&content).map_err(|e| Error::ConfigError(format!("Failed to parse config: {e}")))
    }

    /// Save configuration to the default location.
    ///
    /// Creates the configuration directory if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be written.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::ConfigError(format!("Failed to create config directory: {e}"))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(&path, content)
            .map_err(|e| Error::ConfigError(format!("Failed to write config: {e}")))
    }

    /// Check values that would make a session unusable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] naming the first offending key.
    pub fn validate(&self) -> Result<()> {
        let ranges = [
            ("receiver", self.receiver.port_step, self.receiver.max_attempts),
            ("sender", self.sender.port_step, self.sender.max_attempts),
        ];
        for (section, step, attempts) in ranges {
            if step == 0 {
                return Err(invalid(format!("{section}.port_step"), "must be at least 1"));
            }
            if attempts == 0 {
                return Err(invalid(format!("{section}.max_attempts"), "must be at least 1"));
            }
        }

        if self.receiver.max_upload_bytes == 0 {
            return Err(invalid("receiver.max_upload_bytes", "must be positive"));
        }
        if self.presence.watchdog_interval.is_zero() {
            return Err(invalid("presence.watchdog_interval", "must be positive"));
        }
        if self.presence.watchdog_interval >= self.presence.heartbeat_timeout {
            return Err(invalid(
                "presence.watchdog_interval",
                "must be shorter than presence.heartbeat_timeout",
            ));
        }
        if self.network.monitor_interval.is_zero() {
            return Err(invalid("network.monitor_interval", "must be positive"));
        }
        if self.network.probe_target.parse::<std::net::SocketAddr>().is_err() {
            return Err(invalid("network.probe_target", "expected ip:port"));
        }

        Ok(())
    }

    /// Get the default configuration directory path.
    #[must_use]
    pub fn config_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "beamsync", "BeamSync")
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the full path to the configuration file.
    #[must_use]
    pub fn config_path() -> PathBuf {
        Self::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("config.toml")
    }
}

fn invalid(key: impl Into<String>, reason: &str) -> Error {
    Error::InvalidConfig {
        key: key.into(),
        reason: reason.to_string(),
    }
}

mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse(&s).map_err(serde::de::Error::custom)
    }

    pub(super) fn parse(s: &str) -> Result<Duration, String> {
        let s = s.trim();
        let (digits, unit_ms) = if let Some(ms) = s.strip_suffix("ms") {
            (ms, 1)
        } else if let Some(secs) = s.strip_suffix('s') {
            (secs, 1_000)
        } else if let Some(mins) = s.strip_suffix('m') {
            (mins, 60_000)
        } else {
            return Err(format!("invalid duration format: {s}"));
        };

        digits
            .trim()
            .parse::<u64>()
            .map(|n| Duration::from_millis(n.saturating_mul(unit_ms)))
            .map_err(|e| format!("invalid duration '{s}': {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_default() {
        let config = Config::default();

        assert_eq!(config.receiver.port_start, 3000);
        assert_eq!(config.sender.port_start, 3005);
        assert_eq!(config.receiver.port_step, 2);
        assert_eq!(config.receiver.max_attempts, 50);
        assert_eq!(config.receiver.max_upload_bytes, 20 * 1024 * 1024 * 1024);
        assert_eq!(config.presence.heartbeat_timeout, Duration::from_secs(15));
        assert_eq!(config.presence.watchdog_interval, Duration::from_secs(1));
        assert_eq!(config.network.monitor_interval, Duration::from_secs(3));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        let mut original = Config::default();
        original.receiver.save_dir = Some(PathBuf::from("/tmp/recv"));
        original.sender.port_start = 4001;
        original.presence.watchdog_interval = Duration::from_millis(250);

        let content = toml::to_string_pretty(&original).expect("serialize");
        std::fs::write(&config_path, &content).expect("write");

        let loaded = Config::load_from(&config_path).expect("load");

        assert_eq!(loaded.receiver.save_dir, Some(PathBuf::from("/tmp/recv")));
        assert_eq!(loaded.sender.port_start, 4001);
        assert_eq!(loaded.presence.watchdog_interval, Duration::from_millis(250));
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::load_from(&temp_dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.receiver.port_start, 3000);
    }

    #[test]
    fn test_unparseable_file_is_config_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[receiver\nport_start = ").unwrap();

        assert!(matches!(
            Config::load_from(&path),
            Err(Error::ConfigError(_))
        ));
    }

    #[test]
    fn test_config_deserialization_partial() {
        let partial_toml = r#"
[sender]
port_start = 4005

[presence]
heartbeat_timeout = "1m"
"#;

        let config: Config = toml::from_str(partial_toml).expect("parse partial config");

        assert_eq!(config.sender.port_start, 4005);
        assert_eq!(config.sender.port_step, 2);
        assert_eq!(config.presence.heartbeat_timeout, Duration::from_secs(60));
        assert_eq!(config.receiver.port_start, 3000);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.sender.port_step = 0;
        assert!(matches!(
            config.validate(),
            Err(Error::InvalidConfig { ref key, .. }) if key == "sender.port_step"
        ));

        let mut config = Config::default();
        config.presence.watchdog_interval = Duration::from_secs(30);
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.network.probe_target = "not-an-address".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duration_parsing() {
        assert_eq!(humantime_serde::parse("15s"), Ok(Duration::from_secs(15)));
        assert_eq!(humantime_serde::parse("2m"), Ok(Duration::from_secs(120)));
        assert_eq!(humantime_serde::parse("500ms"), Ok(Duration::from_millis(500)));
        assert!(humantime_serde::parse("soon").is_err());
    }

    #[test]
    fn test_config_path() {
        let path = Config::config_path();
        assert!(path.ends_with("config.toml"));
    }

    #[test]
    fn test_port_ranges_follow_config() {
        let config = Config::default();
        let range = config.sender.port_range();
        assert_eq!(range.start, 3005);
        assert_eq!(range.step, 2);
        assert_eq!(range.max_attempts, 50);
    }
}
