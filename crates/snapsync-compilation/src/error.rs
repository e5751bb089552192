//! Error types for compilation tracking

use snapsync_checksum::ProjectId;

/// Errors surfaced to callers of a tracker
///
/// Build failures are never errors: they are recorded on the compiled unit.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompilationError {
    /// The caller's token fired; the shared build keeps running
    #[error("operation cancelled")]
    Cancelled,

    /// No tracker for this project in the compilation state
    #[error("unknown project: {0}")]
    UnknownProject(ProjectId),
}

impl CompilationError {
    /// Whether this is ordinary cancellation rather than a fault
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// A syntax provider could not parse a document
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("parse failed: {0}")]
pub struct ParseFailure(pub String);
