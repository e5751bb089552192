//! Error types for the synchronization engine

use snapsync_checksum::Checksum;
use snapsync_workspace::WorkspaceError;
use std::path::PathBuf;

/// Main engine error type
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Query against a snapshot failed
    #[error("workspace error: {0}")]
    Workspace(#[from] WorkspaceError),

    /// Asset pull for a snapshot the engine no longer pins
    #[error("snapshot {0} is not pinned")]
    UnknownSnapshot(Checksum),

    /// Engine started outside a tokio runtime
    #[error("no tokio runtime available")]
    NoRuntime,
}

/// Failures reported by a remote host
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    /// No remote host is reachable
    #[error("remote host not connected")]
    NotConnected,

    /// The call was cancelled
    #[error("remote call cancelled")]
    Cancelled,

    /// Transport or remote-side failure
    #[error("remote call failed: {0}")]
    Failed(String),
}

impl RemoteError {
    /// Absence and cancellation are ordinary control flow, never reported
    #[inline]
    #[must_use]
    pub fn is_silent(&self) -> bool {
        matches!(self, Self::NotConnected | Self::Cancelled)
    }
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file unreadable
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config text malformed
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}
