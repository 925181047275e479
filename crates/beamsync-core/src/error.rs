//! Error types for BeamSync.
//!
//! This module provides a unified error type for all BeamSync operations,
//! with specific error variants for different failure modes.

use std::io;

use thiserror::Error;

/// A specialized `Result` type for BeamSync operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for BeamSync.
#[derive(Error, Debug)]
pub enum Error {
    /// No free port in the scanned range (E001)
    #[error("no available port found after {attempts} attempts starting at {start} (step {step})")]
    PortsExhausted {
        /// First candidate port
        start: u16,
        /// Distance between candidates
        step: u16,
        /// Number of candidates tried
        attempts: u32,
    },

    /// Binding was refused by OS policy (E002)
    #[error("permission denied binding port {port}: {source}")]
    BindPermissionDenied {
        /// The candidate port that was refused
        port: u16,
        /// The underlying OS error
        #[source]
        source: io::Error,
    },

    /// The firewall helper could not be located or started (E003)
    #[error("firewall helper unavailable: {0}")]
    RemediationUnavailable(String),

    /// The firewall helper ran but reported failure (E004)
    #[error("firewall helper failed ({status}): {output}")]
    RemediationFailed {
        /// Exit status description
        status: String,
        /// Combined stdout and stderr
        output: String,
    },

    /// A sender session was started without files
    #[error("no files selected")]
    NoFilesSelected,

    /// File not found
    #[error("file not found: {0}")]
    FileNotFound(String),

    /// Configuration file error
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Invalid configuration value
    #[error("invalid configuration value for '{key}': {reason}")]
    InvalidConfig {
        /// Configuration key
        key: String,
        /// Reason for invalidity
        reason: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// HTTP server failure
    #[error("server error: {0}")]
    Server(String),

    /// Internal error (should not happen)
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns the error code associated with this error, if any.
    ///
    /// Error codes follow the pattern EXXX where XXX is a 3-digit number.
    #[must_use]
    pub const fn code(&self) -> Option<&'static str> {
        match self {
            Self::PortsExhausted { .. } => Some("E001"),
            Self::BindPermissionDenied { .. } => Some("E002"),
            Self::RemediationUnavailable(_) => Some("E003"),
            Self::RemediationFailed { .. } => Some("E004"),
            _ => None,
        }
    }

    /// Returns whether the OS refused a bind on policy grounds.
    ///
    /// Callers use this to decide whether privileged remediation is worth
    /// attempting before giving up on a session.
    #[must_use]
    pub const fn is_permission_denied(&self) -> bool {
        matches!(self, Self::BindPermissionDenied { .. })
    }

    /// Returns a helpful suggestion for resolving the error, if applicable.
    #[must_use]
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::PortsExhausted { .. } => Some(
                "Close other applications listening on ports 3000-3105,\n\
                 or change [receiver]/[sender] port_start in the config file.",
            ),
            Self::BindPermissionDenied { .. } | Self::RemediationFailed { .. } => Some(
                "Allow the ports through your firewall, for example:\n\
                   pkexec ./build/linux/firewall_setup.sh",
            ),
            Self::RemediationUnavailable(_) => Some(
                "Place firewall_setup.sh next to the binary or list it under\n\
                 [firewall] script_candidates in the config file.",
            ),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let exhausted = Error::PortsExhausted {
            start: 3000,
            step: 2,
            attempts: 50,
        };
        assert_eq!(exhausted.code(), Some("E001"));

        let denied = Error::BindPermissionDenied {
            port: 80,
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        };
        assert_eq!(denied.code(), Some("E002"));
        assert!(denied.is_permission_denied());
        assert!(!exhausted.is_permission_denied());

        assert!(Error::NoFilesSelected.code().is_none());
    }

    #[test]
    fn test_display_mentions_range() {
        let err = Error::PortsExhausted {
            start: 3005,
            step: 2,
            attempts: 50,
        };
        let msg = err.to_string();
        assert!(msg.contains("50 attempts"));
        assert!(msg.contains("3005"));
    }

    #[test]
    fn test_suggestions() {
        let denied = Error::BindPermissionDenied {
            port: 3000,
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        };
        assert!(denied.suggestion().is_some());
        assert!(Error::Internal("x".into()).suggestion().is_none());
    }
}
