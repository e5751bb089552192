//! Error types for workspace snapshots

use snapsync_checksum::{AssetPathError, DocumentId, ProjectId};
use std::sync::Arc;

/// Errors from forking or querying a snapshot
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkspaceError {
    /// No such project in the snapshot
    #[error("unknown project: {0}")]
    UnknownProject(ProjectId),

    /// No such document in the snapshot
    #[error("unknown document: {0}")]
    UnknownDocument(DocumentId),

    /// Project already present
    #[error("duplicate project: {0}")]
    DuplicateProject(ProjectId),

    /// Document already present
    #[error("duplicate document: {0}")]
    DuplicateDocument(DocumentId),

    /// Adding the reference would make the project graph cyclic
    #[error("reference from {from} to {to} would create a cycle")]
    CyclicReference { from: ProjectId, to: ProjectId },

    /// Malformed scope
    #[error("invalid asset path: {0}")]
    InvalidAssetPath(#[from] AssetPathError),
}

/// A lazily loaded text could not be produced
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("failed to load text of {path}: {message}")]
pub struct TextLoadError {
    /// Document path
    pub path: Arc<str>,
    /// Loader message
    pub message: String,
}

impl TextLoadError {
    /// Create a load error
    #[must_use]
    pub fn new(path: impl Into<Arc<str>>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}
