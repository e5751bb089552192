//! Scoped traversal descriptors
//!
//! An [`AssetPath`] names exactly which part of a snapshot a checksum or asset
//! query may touch: a scope made of [`AssetScope`] flags, optionally narrowed
//! to one project or one document.

use crate::ids::{DocumentId, ProjectId};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

bitflags::bitflags! {
    /// Which kinds of tree data a traversal may visit
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct AssetScope: u32 {
        /// Root checksum and the top-level checksum of each project
        const SNAPSHOT = 1 << 0;
        /// Project attributes (options, references)
        const PROJECT_ATTRIBUTES = 1 << 1;
        /// Document attributes (path, encoding, kind)
        const DOCUMENT_ATTRIBUTES = 1 << 2;
        /// Document text
        const DOCUMENT_TEXT = 1 << 3;

        /// Full document data
        const DOCUMENTS = Self::DOCUMENT_ATTRIBUTES.bits() | Self::DOCUMENT_TEXT.bits();
        /// Everything below the root
        const PROJECTS = Self::PROJECT_ATTRIBUTES.bits() | Self::DOCUMENTS.bits();
        /// The whole tree; verification only
        const FULL_TREE = Self::SNAPSHOT.bits() | Self::PROJECTS.bits();
    }
}

/// Scope of a checksum or asset query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetPath {
    scope: AssetScope,
    project: Option<ProjectId>,
    document: Option<DocumentId>,
}

impl AssetPath {
    /// Validated constructor for arbitrary combinations
    ///
    /// # Errors
    /// - [`AssetPathError::EmptyScope`] when no flag is set
    /// - [`AssetPathError::MissingIdentity`] when document data is requested
    ///   without naming a project or document and without the root scope
    /// - [`AssetPathError::ProjectMismatch`] when the document belongs to a
    ///   different project than the one named
    /// - [`AssetPathError::DocumentScopeTooWide`] when a document is named
    ///   but the scope asks for root or project data
    pub fn new(
        scope: AssetScope,
        project: Option<ProjectId>,
        document: Option<DocumentId>,
    ) -> Result<Self, AssetPathError> {
        if scope.is_empty() {
            return Err(AssetPathError::EmptyScope);
        }
        let project = match (project, document) {
            (Some(project), Some(document)) if document.project() != project => {
                return Err(AssetPathError::ProjectMismatch { project, document });
            }
            (None, Some(document)) => Some(document.project()),
            (project, _) => project,
        };
        if document.is_some()
            && scope.intersects(AssetScope::SNAPSHOT | AssetScope::PROJECT_ATTRIBUTES)
        {
            return Err(AssetPathError::DocumentScopeTooWide { scope });
        }
        if scope.intersects(AssetScope::DOCUMENTS)
            && project.is_none()
            && !scope.contains(AssetScope::SNAPSHOT)
        {
            return Err(AssetPathError::MissingIdentity { scope });
        }
        Ok(Self {
            scope,
            project,
            document,
        })
    }

    /// Root checksum plus per-project top-level checksums
    #[must_use]
    pub const fn snapshot() -> Self {
        Self {
            scope: AssetScope::SNAPSHOT,
            project: None,
            document: None,
        }
    }

    /// Attributes of one project
    #[must_use]
    pub const fn project(project: ProjectId) -> Self {
        Self {
            scope: AssetScope::PROJECT_ATTRIBUTES,
            project: Some(project),
            document: None,
        }
    }

    /// Every document of one project, nothing else
    #[must_use]
    pub const fn documents_in_project(project: ProjectId) -> Self {
        Self {
            scope: AssetScope::DOCUMENTS,
            project: Some(project),
            document: None,
        }
    }

    /// One document's attributes and text
    #[must_use]
    pub const fn document(document: DocumentId) -> Self {
        Self {
            scope: AssetScope::DOCUMENTS,
            project: Some(document.project()),
            document: Some(document),
        }
    }

    /// Only the text of one document
    #[must_use]
    pub const fn document_text(document: DocumentId) -> Self {
        Self {
            scope: AssetScope::DOCUMENT_TEXT,
            project: Some(document.project()),
            document: Some(document),
        }
    }

    /// The entire tree. Walks every node; for verification and tests.
    #[must_use]
    pub const fn full_tree() -> Self {
        Self {
            scope: AssetScope::FULL_TREE,
            project: None,
            document: None,
        }
    }

    /// Scope flags
    #[inline]
    #[must_use]
    pub const fn scope(&self) -> AssetScope {
        self.scope
    }

    /// Narrowing project, if any
    #[inline]
    #[must_use]
    pub const fn project_id(&self) -> Option<ProjectId> {
        self.project
    }

    /// Narrowing document, if any
    #[inline]
    #[must_use]
    pub const fn document_id(&self) -> Option<DocumentId> {
        self.document
    }

    /// Whether the traversal may enter `project`
    #[must_use]
    pub fn includes_project(&self, project: ProjectId) -> bool {
        self.project.map_or(true, |p| p == project)
    }

    /// Whether the traversal may enter `document`
    #[must_use]
    pub fn includes_document(&self, document: DocumentId) -> bool {
        self.includes_project(document.project()) && self.document.map_or(true, |d| d == document)
    }
}

impl Display for AssetPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.scope)?;
        if let Some(document) = self.document {
            write!(f, " @ {document}")
        } else if let Some(project) = self.project {
            write!(f, " @ {project}")
        } else {
            Ok(())
        }
    }
}

/// Contract violations when building an [`AssetPath`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AssetPathError {
    /// No scope flag set
    #[error("asset path has an empty scope")]
    EmptyScope,

    /// Document data requested with no identity to narrow it
    #[error("scope {scope:?} requests document data without a project or document identity")]
    MissingIdentity { scope: AssetScope },

    /// Document does not belong to the named project
    #[error("{document} does not belong to {project}")]
    ProjectMismatch {
        project: ProjectId,
        document: DocumentId,
    },

    /// Root or project data requested for a single document
    #[error("scope {scope:?} is wider than the single document it names")]
    DocumentScopeTooWide { scope: AssetScope },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids() -> (ProjectId, DocumentId) {
        let p = ProjectId::from_raw(7);
        (p, DocumentId::from_raw(p, 1))
    }

    #[test]
    fn document_scope_without_identity_fails_fast() {
        let result = AssetPath::new(AssetScope::DOCUMENT_TEXT, None, None);
        assert_eq!(
            result,
            Err(AssetPathError::MissingIdentity {
                scope: AssetScope::DOCUMENT_TEXT
            })
        );
    }

    #[test]
    fn document_identity_implies_project() {
        let (p, d) = ids();
        let path = AssetPath::new(AssetScope::DOCUMENT_TEXT, None, Some(d)).unwrap();
        assert_eq!(path.project_id(), Some(p));
        assert_eq!(path, AssetPath::document_text(d));
    }

    #[test]
    fn mismatched_project_rejected() {
        let (_, d) = ids();
        let other = ProjectId::from_raw(8);
        assert!(matches!(
            AssetPath::new(AssetScope::DOCUMENTS, Some(other), Some(d)),
            Err(AssetPathError::ProjectMismatch { .. })
        ));
    }

    #[test]
    fn document_cannot_request_root_data() {
        let (_, d) = ids();
        assert!(matches!(
            AssetPath::new(AssetScope::SNAPSHOT | AssetScope::DOCUMENT_TEXT, None, Some(d)),
            Err(AssetPathError::DocumentScopeTooWide { .. })
        ));
    }

    #[test]
    fn full_tree_is_valid_without_identity() {
        let path = AssetPath::new(AssetScope::FULL_TREE, None, None).unwrap();
        assert_eq!(path, AssetPath::full_tree());
        assert!(path.includes_project(ProjectId::from_raw(1)));
    }

    #[test]
    fn narrowing_limits_inclusion() {
        let (p, d) = ids();
        let sibling = DocumentId::from_raw(p, 2);
        let path = AssetPath::document(d);
        assert!(path.includes_document(d));
        assert!(!path.includes_document(sibling));
        assert!(AssetPath::documents_in_project(p).includes_document(sibling));
        assert!(!AssetPath::project(p).includes_project(ProjectId::from_raw(9)));
    }

    #[test]
    fn asset_path_serializes_for_the_wire() {
        let (_, d) = ids();
        let json = serde_json::to_string(&AssetPath::document_text(d)).unwrap();
        let back: AssetPath = serde_json::from_str(&json).unwrap();
        assert_eq!(back, AssetPath::document_text(d));
    }
}
