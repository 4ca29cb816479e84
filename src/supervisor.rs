//! Worker process lifecycle
//!
//! Starts the fetched binary as a detached background process and owns the
//! on-disk artifact hygiene around it: stale files from a previous run are
//! removed before re-fetching, and a one-shot task removes the binary and
//! its configuration a fixed grace period after launch. The running process
//! keeps its already-open files; only the directory entries go away.

use crate::config::Config;
use crate::error::LaunchError;
use crate::timer::OneShot;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Grace period for the worker to bind its listen port after spawn
const BIND_GRACE: Duration = Duration::from_secs(1);

/// Delay before the launch artifacts are removed from disk
pub const CLEANUP_DELAY: Duration = Duration::from_secs(90);

/// Launches the worker and retires its on-disk artifacts
#[derive(Debug, Clone)]
pub struct Supervisor {
    binary_path: PathBuf,
    config_path: PathBuf,
    sub_file_path: PathBuf,
}

impl Supervisor {
    pub fn new(config: &Config) -> Self {
        Self {
            binary_path: config.binary_path(),
            config_path: config.worker_config_path(),
            sub_file_path: config.sub_file_path(),
        }
    }

    /// Delete leftovers from a previous invocation (the old binary and the
    /// old subscription file). Errors are logged, never fatal.
    pub fn remove_stale(&self) {
        for path in [&self.binary_path, &self.sub_file_path] {
            match remove_if_present(path) {
                Ok(true) => debug!(path = %path.display(), "Removed stale file"),
                Ok(false) => {}
                Err(e) => warn!(error = %e, "Stale file removal failed"),
            }
        }
    }

    /// Spawn the worker as a detached background process.
    ///
    /// stdio is fully discarded and the child handle is dropped, so nothing
    /// retains a way to terminate the worker; it outlives this function.
    /// Returns the OS pid.
    pub async fn spawn_worker(&self) -> Result<u32, LaunchError> {
        let child = Command::new(&self.binary_path)
            .arg("-c")
            .arg(&self.config_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| LaunchError::Spawn {
                reason: e.to_string(),
            })?;

        let pid = child.id().unwrap_or(0);
        info!(pid, binary = %self.binary_path.display(), "Worker process spawned");

        // Child handle dropped here; the process keeps running. Give it a
        // moment to bind its port before the pipeline moves on.
        drop(child);
        tokio::time::sleep(BIND_GRACE).await;

        Ok(pid)
    }

    /// Remove the configuration file and the binary from disk.
    ///
    /// The subscription file stays; so does the running process.
    pub fn remove_artifacts(&self) {
        for path in [&self.config_path, &self.binary_path] {
            match remove_if_present(path) {
                Ok(true) => info!(path = %path.display(), "Removed launch artifact"),
                Ok(false) => debug!(path = %path.display(), "Launch artifact already gone"),
                Err(e) => warn!(error = %e, "Launch artifact removal failed"),
            }
        }
    }

    /// Schedule [`remove_artifacts`](Supervisor::remove_artifacts) to fire
    /// once after `delay`; `after` runs when removal has completed.
    pub fn schedule_cleanup<F>(&self, delay: Duration, after: F) -> OneShot
    where
        F: FnOnce() + Send + 'static,
    {
        let supervisor = self.clone();
        OneShot::schedule(delay, async move {
            supervisor.remove_artifacts();
            after();
        })
    }
}

fn remove_if_present(path: &Path) -> Result<bool, LaunchError> {
    if !path.exists() {
        return Ok(false);
    }
    std::fs::remove_file(path).map_err(|e| LaunchError::Cleanup {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    Ok(true)
}
