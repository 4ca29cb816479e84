//! Failure taxonomy for the launch pipeline
//!
//! Every external interaction maps to one `LaunchError` variant, and the
//! classification into fatal/degraded/cleanup is a pure function so the
//! handling policy can be tested without a logger or a live pipeline.

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by the launch pipeline
#[derive(Debug, Error)]
pub enum LaunchError {
    /// The host processor is not one the worker ships binaries for
    #[error("unsupported processor architecture '{0}'")]
    UnsupportedArch(String),

    /// Downloading the worker binary failed
    #[error("download from {url} failed: {reason}")]
    Download { url: String, reason: String },

    /// Writing the worker configuration file failed
    #[error("failed to write worker configuration at {path}: {reason}")]
    ConfigWrite { path: PathBuf, reason: String },

    /// Spawning the worker process failed
    #[error("failed to spawn worker process: {reason}")]
    Spawn { reason: String },

    /// A public IP or ISP lookup failed
    #[error("identity lookup against {url} failed: {reason}")]
    IdentityLookup { url: String, reason: String },

    /// An aggregator upload failed
    #[error("upload to {url} failed: {reason}")]
    Relay { url: String, reason: String },

    /// The keepalive registration failed
    #[error("keepalive registration with {url} failed: {reason}")]
    Keepalive { url: String, reason: String },

    /// Removing an on-disk artifact failed
    #[error("failed to remove {path}: {reason}")]
    Cleanup { path: PathBuf, reason: String },
}

/// How a failure affects the run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Aborts the startup pipeline; the subscription route is never registered
    FatalToStartup,
    /// A fallback value is substituted and the pipeline continues
    Degraded,
    /// Logged and forgotten
    BestEffortCleanup,
}

impl LaunchError {
    /// Classify this failure for the pipeline's handling policy
    pub fn class(&self) -> FailureClass {
        match self {
            LaunchError::UnsupportedArch(_)
            | LaunchError::Download { .. }
            | LaunchError::ConfigWrite { .. }
            | LaunchError::Spawn { .. } => FailureClass::FatalToStartup,
            LaunchError::IdentityLookup { .. }
            | LaunchError::Relay { .. }
            | LaunchError::Keepalive { .. } => FailureClass::Degraded,
            LaunchError::Cleanup { .. } => FailureClass::BestEffortCleanup,
        }
    }

    /// True when the startup pipeline must abort on this failure
    pub fn is_fatal(&self) -> bool {
        self.class() == FailureClass::FatalToStartup
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cleanup_error() -> LaunchError {
        LaunchError::Cleanup {
            path: PathBuf::from("/tmp/web"),
            reason: "permission denied".to_string(),
        }
    }

    #[test]
    fn test_startup_stage_failures_are_fatal() {
        let fatal = [
            LaunchError::UnsupportedArch("mips".to_string()),
            LaunchError::Download {
                url: "https://amd64.example.com/web".to_string(),
                reason: "HTTP status 503".to_string(),
            },
            LaunchError::ConfigWrite {
                path: PathBuf::from("/tmp/config.json"),
                reason: "read-only file system".to_string(),
            },
            LaunchError::Spawn {
                reason: "No such file or directory".to_string(),
            },
        ];
        for err in fatal {
            assert_eq!(err.class(), FailureClass::FatalToStartup, "{err}");
            assert!(err.is_fatal());
        }
    }

    #[test]
    fn test_post_launch_failures_degrade() {
        let degraded = [
            LaunchError::IdentityLookup {
                url: "http://icanhazip.com".to_string(),
                reason: "timed out".to_string(),
            },
            LaunchError::Relay {
                url: "https://agg.example.com/api/add-nodes".to_string(),
                reason: "HTTP status 500".to_string(),
            },
            LaunchError::Keepalive {
                url: "https://keepalive.example.com/add-url".to_string(),
                reason: "connection refused".to_string(),
            },
        ];
        for err in degraded {
            assert_eq!(err.class(), FailureClass::Degraded, "{err}");
            assert!(!err.is_fatal());
        }
    }

    #[test]
    fn test_cleanup_failures_are_best_effort() {
        assert_eq!(cleanup_error().class(), FailureClass::BestEffortCleanup);
        assert!(!cleanup_error().is_fatal());
    }

    #[test]
    fn test_error_messages_name_the_subject() {
        let err = LaunchError::UnsupportedArch("mips".to_string());
        assert_eq!(err.to_string(), "unsupported processor architecture 'mips'");

        assert!(cleanup_error().to_string().contains("/tmp/web"));
    }
}
