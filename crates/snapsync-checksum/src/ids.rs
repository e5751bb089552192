//! Project and document identities

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use ulid::Ulid;

/// Identity of a project, stable across snapshots
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProjectId(pub Ulid);

impl ProjectId {
    /// Fresh random identity
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Deterministic identity from a raw value
    #[must_use]
    pub const fn from_raw(value: u128) -> Self {
        Self(Ulid(value))
    }

    /// Bytes fed into checksums
    #[inline]
    #[must_use]
    pub fn to_bytes(self) -> [u8; 16] {
        self.0.to_bytes()
    }
}

impl Default for ProjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for ProjectId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "project:{}", self.0)
    }
}

/// Identity of a document; always names its owning project
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocumentId {
    project: ProjectId,
    id: Ulid,
}

impl DocumentId {
    /// Fresh random identity inside `project`
    #[must_use]
    pub fn new(project: ProjectId) -> Self {
        Self {
            project,
            id: Ulid::new(),
        }
    }

    /// Deterministic identity from a raw value
    #[must_use]
    pub const fn from_raw(project: ProjectId, value: u128) -> Self {
        Self {
            project,
            id: Ulid(value),
        }
    }

    /// Owning project
    #[inline]
    #[must_use]
    pub const fn project(&self) -> ProjectId {
        self.project
    }

    /// Bytes fed into checksums
    #[inline]
    #[must_use]
    pub fn to_bytes(self) -> [u8; 16] {
        self.id.to_bytes()
    }
}

impl Display for DocumentId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "document:{}/{}", self.project.0, self.id)
    }
}
