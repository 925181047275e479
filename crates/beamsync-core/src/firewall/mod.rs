//! Privileged firewall remediation.
//!
//! When the OS refuses to bind the service ports, BeamSync can run an
//! external helper script (shipped as `firewall_setup.sh`) through an
//! elevation program such as `pkexec`. The helper's combined output is
//! captured and returned to the caller for display.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use crate::config::FirewallConfig;
use crate::error::{Error, Result};

/// Outcome of a helper run that started successfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemediationOutcome {
    /// Whether the helper exited successfully
    pub success: bool,
    /// Combined stdout and stderr
    pub output: String,
}

/// Locates and runs the firewall helper.
#[derive(Debug, Clone)]
pub struct FirewallHelper {
    elevate_command: String,
    script_candidates: Vec<PathBuf>,
}

impl FirewallHelper {
    /// Create a helper from explicit settings.
    #[must_use]
    pub const fn new(elevate_command: String, script_candidates: Vec<PathBuf>) -> Self {
        Self {
            elevate_command,
            script_candidates,
        }
    }

    /// Create a helper from the `[firewall]` config section.
    #[must_use]
    pub fn from_config(config: &FirewallConfig) -> Self {
        Self::new(
            config.elevate_command.clone(),
            config.script_candidates.clone(),
        )
    }

    /// First existing candidate script, made absolute.
    #[must_use]
    pub fn locate_script(&self) -> Option<PathBuf> {
        self.script_candidates
            .iter()
            .filter(|p| p.is_file())
            .find_map(|p| std::path::absolute(p).ok())
    }

    /// Run the helper and capture its output.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RemediationUnavailable`] if no script is found or the
    /// elevation program cannot be started. A helper that runs but exits
    /// unsuccessfully is reported through [`RemediationOutcome::success`].
    pub async fn run(&self) -> Result<RemediationOutcome> {
        let script = self.locate_script().ok_or_else(|| {
            Error::RemediationUnavailable("firewall_setup.sh not found".to_string())
        })?;

        tracing::info!("Running firewall helper: {} {}", self.elevate_command, script.display());

        mark_executable(&script);

        let output = tokio::process::Command::new(&self.elevate_command)
            .arg(&script)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                Error::RemediationUnavailable(format!(
                    "failed to start '{}': {e}",
                    self.elevate_command
                ))
            })?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        let outcome = RemediationOutcome {
            success: output.status.success(),
            output: combined,
        };

        if outcome.success {
            tracing::info!("Firewall helper completed");
        } else {
            tracing::warn!("Firewall helper exited with {}", output.status);
        }

        Ok(outcome)
    }

    /// Run the helper, treating an unsuccessful exit as an error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RemediationUnavailable`] or [`Error::RemediationFailed`].
    pub async fn remediate(&self) -> Result<String> {
        let outcome = self.run().await?;
        if outcome.success {
            Ok(outcome.output)
        } else {
            Err(Error::RemediationFailed {
                status: "non-zero exit".to_string(),
                output: outcome.output,
            })
        }
    }
}

#[cfg(unix)]
fn mark_executable(script: &Path) {
    use std::os::unix::fs::PermissionsExt;

    if let Err(e) = std::fs::set_permissions(script, std::fs::Permissions::from_mode(0o755)) {
        tracing::warn!("Could not mark {} executable: {}", script.display(), e);
    }
}

#[cfg(not(unix))]
fn mark_executable(_script: &Path) {}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_locate_script_picks_first_existing() {
        let dir = TempDir::new().unwrap();
        let second = dir.path().join("second.sh");
        std::fs::write(&second, "#!/bin/sh\n").unwrap();

        let helper = FirewallHelper::new(
            "pkexec".to_string(),
            vec![dir.path().join("missing.sh"), second.clone()],
        );

        assert_eq!(helper.locate_script(), Some(second));
    }

    #[tokio::test]
    async fn test_missing_script_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let helper = FirewallHelper::new("pkexec".to_string(), vec![dir.path().join("nope.sh")]);

        assert!(matches!(
            helper.run().await,
            Err(Error::RemediationUnavailable(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_captures_output() {
        let dir = TempDir::new().unwrap();
        let script = dir.path().join("firewall_setup.sh");
        std::fs::write(&script, "echo opened 3000-3105\necho warn >&2\n").unwrap();

        let helper = FirewallHelper::new("sh".to_string(), vec![script]);
        let outcome = helper.run().await.unwrap();

        assert!(outcome.success);
        assert!(outcome.output.contains("opened 3000-3105"));
        assert!(outcome.output.contains("warn"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_helper_reported() {
        let dir = TempDir::new().unwrap();
        let script = dir.path().join("firewall_setup.sh");
        std::fs::write(&script, "echo denied\nexit 3\n").unwrap();

        let helper = FirewallHelper::new("sh".to_string(), vec![script]);

        let outcome = helper.run().await.unwrap();
        assert!(!outcome.success);

        match helper.remediate().await {
            Err(Error::RemediationFailed { output, .. }) => assert!(output.contains("denied")),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unstartable_elevation_program() {
        let dir = TempDir::new().unwrap();
        let script = dir.path().join("firewall_setup.sh");
        std::fs::write(&script, "exit 0\n").unwrap();

        let helper = FirewallHelper::new("beamsync-no-such-program".to_string(), vec![script]);

        assert!(matches!(
            helper.run().await,
            Err(Error::RemediationUnavailable(_))
        ));
    }
}
