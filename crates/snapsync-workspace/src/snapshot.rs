//! Snapshot roots
//!
//! A [`Snapshot`] is an immutable, versioned view of the whole workspace.
//! Every edit produces a new snapshot by replacing the path from root to the
//! changed leaf; all other projects and documents are shared by reference.

use crate::document::DocumentState;
use crate::error::WorkspaceError;
use crate::project::{ProjectAttributes, ProjectReference, ProjectState};
use im::OrdMap;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use snapsync_checksum::{Checksum, ChecksumMerkleTree, ChecksumWriter, DocumentId, ProjectId};
use std::collections::{BTreeSet, VecDeque};
use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

/// Monotonic snapshot version; not part of any checksum
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct SnapshotVersion(pub u64);

impl SnapshotVersion {
    /// The version after this one
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl Display for SnapshotVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Immutable workspace root
#[derive(Debug)]
pub struct Snapshot {
    version: SnapshotVersion,
    projects: OrdMap<ProjectId, Arc<ProjectState>>,
    checksum: OnceCell<Checksum>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::empty()
    }
}

impl Snapshot {
    /// Empty snapshot at version 0
    #[must_use]
    pub fn empty() -> Self {
        Self::from_parts(SnapshotVersion::default(), OrdMap::new())
    }

    fn from_parts(version: SnapshotVersion, projects: OrdMap<ProjectId, Arc<ProjectState>>) -> Self {
        Self {
            version,
            projects,
            checksum: OnceCell::new(),
        }
    }

    fn fork(&self, projects: OrdMap<ProjectId, Arc<ProjectState>>) -> Self {
        Self::from_parts(self.version.next(), projects)
    }

    pub(crate) fn rebased_after(self, version: SnapshotVersion) -> Self {
        if self.version > version {
            self
        } else {
            Self::from_parts(version.next(), self.projects)
        }
    }

    /// Version
    #[inline]
    #[must_use]
    pub fn version(&self) -> SnapshotVersion {
        self.version
    }

    /// Projects in identity order
    pub fn projects(&self) -> impl Iterator<Item = &Arc<ProjectState>> + '_ {
        self.projects.values()
    }

    /// Project identities in order
    pub fn project_ids(&self) -> impl Iterator<Item = ProjectId> + '_ {
        self.projects.keys().copied()
    }

    /// Number of projects
    #[must_use]
    pub fn project_count(&self) -> usize {
        self.projects.len()
    }

    /// Project by identity
    #[must_use]
    pub fn project(&self, id: ProjectId) -> Option<&Arc<ProjectState>> {
        self.projects.get(&id)
    }

    /// Document by identity
    #[must_use]
    pub fn document(&self, id: DocumentId) -> Option<&Arc<DocumentState>> {
        self.project(id.project())?.document(id)
    }

    fn require_project(&self, id: ProjectId) -> Result<&Arc<ProjectState>, WorkspaceError> {
        self.project(id).ok_or(WorkspaceError::UnknownProject(id))
    }

    fn require_document(&self, id: DocumentId) -> Result<&Arc<DocumentState>, WorkspaceError> {
        self.document(id).ok_or(WorkspaceError::UnknownDocument(id))
    }

    /// Memoized root checksum: Merkle root over project checksums in identity order
    #[must_use]
    pub fn checksum(&self) -> Checksum {
        *self.checksum.get_or_init(|| {
            let mut writer = ChecksumWriter::new("snapshot");
            writer
                .write_u64(self.projects.len() as u64)
                .write_checksum(&self.projects_root());
            writer.finish()
        })
    }

    pub(crate) fn projects_root(&self) -> Checksum {
        ChecksumMerkleTree::root_of(self.projects.values().map(|p| p.checksum()))
    }

    /// Whether the root checksum has been computed on this instance
    #[must_use]
    pub fn is_checksum_computed(&self) -> bool {
        self.checksum.get().is_some()
    }

    /// Fork with a new project
    ///
    /// # Errors
    /// [`WorkspaceError::DuplicateProject`] if the identity is taken, or
    /// [`WorkspaceError::CyclicReference`] if its references close a cycle
    pub fn add_project(&self, project: ProjectState) -> Result<Self, WorkspaceError> {
        let id = project.id();
        if self.projects.contains_key(&id) {
            return Err(WorkspaceError::DuplicateProject(id));
        }
        self.check_references(id, &project.attributes().project_references)?;
        Ok(self.fork(self.projects.update(id, Arc::new(project))))
    }

    /// Fork without a project; references to it from other projects dangle
    ///
    /// # Errors
    /// [`WorkspaceError::UnknownProject`]
    pub fn remove_project(&self, id: ProjectId) -> Result<Self, WorkspaceError> {
        self.require_project(id)?;
        Ok(self.fork(self.projects.without(&id)))
    }

    /// Fork with replaced project attributes
    ///
    /// # Errors
    /// [`WorkspaceError::UnknownProject`] or [`WorkspaceError::CyclicReference`]
    pub fn with_project_attributes(&self, attributes: ProjectAttributes) -> Result<Self, WorkspaceError> {
        let id = attributes.id;
        let project = self.require_project(id)?;
        self.check_references(id, &attributes.project_references)?;
        let next = project.with_attributes(attributes);
        Ok(self.fork(self.projects.update(id, Arc::new(next))))
    }

    /// Fork with replaced project references
    ///
    /// # Errors
    /// [`WorkspaceError::UnknownProject`] or [`WorkspaceError::CyclicReference`]
    pub fn with_project_references(
        &self,
        id: ProjectId,
        references: Vec<ProjectReference>,
    ) -> Result<Self, WorkspaceError> {
        let mut attributes = self.require_project(id)?.attributes().clone();
        attributes.project_references = references;
        self.with_project_attributes(attributes)
    }

    /// Fork with a new document
    ///
    /// # Errors
    /// [`WorkspaceError::UnknownProject`] or [`WorkspaceError::DuplicateDocument`]
    pub fn add_document(&self, document: DocumentState) -> Result<Self, WorkspaceError> {
        let id = document.id();
        let project = self.require_project(id.project())?;
        if project.document(id).is_some() {
            return Err(WorkspaceError::DuplicateDocument(id));
        }
        let next = project.with_document(Arc::new(document));
        Ok(self.fork(self.projects.update(id.project(), Arc::new(next))))
    }

    /// Fork without a document
    ///
    /// # Errors
    /// [`WorkspaceError::UnknownDocument`]
    pub fn remove_document(&self, id: DocumentId) -> Result<Self, WorkspaceError> {
        self.require_document(id)?;
        let next = self.require_project(id.project())?.without_document(id);
        Ok(self.fork(self.projects.update(id.project(), Arc::new(next))))
    }

    /// Fork with one document's text replaced
    ///
    /// # Errors
    /// [`WorkspaceError::UnknownDocument`]
    pub fn with_document_text(
        &self,
        id: DocumentId,
        text: impl Into<Arc<str>>,
    ) -> Result<Self, WorkspaceError> {
        let document = self.require_document(id)?.with_text(text);
        let next = self.require_project(id.project())?.with_document(Arc::new(document));
        Ok(self.fork(self.projects.update(id.project(), Arc::new(next))))
    }

    fn check_references(
        &self,
        from: ProjectId,
        references: &[ProjectReference],
    ) -> Result<(), WorkspaceError> {
        for reference in references {
            let to = reference.project;
            if to == from || self.transitive_dependencies(to).contains(&from) {
                return Err(WorkspaceError::CyclicReference { from, to });
            }
        }
        Ok(())
    }

    /// Every project reachable through references from `id`, excluding `id`
    ///
    /// Dangling references are included; callers decide how to treat them.
    #[must_use]
    pub fn transitive_dependencies(&self, id: ProjectId) -> BTreeSet<ProjectId> {
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<ProjectId> = VecDeque::from([id]);
        while let Some(next) = queue.pop_front() {
            let Some(project) = self.project(next) else {
                continue;
            };
            for reference in &project.attributes().project_references {
                if reference.project != id && seen.insert(reference.project) {
                    queue.push_back(reference.project);
                }
            }
        }
        seen
    }

    /// Every project that reaches `id` through references, excluding `id`
    #[must_use]
    pub fn transitive_dependents(&self, id: ProjectId) -> BTreeSet<ProjectId> {
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<ProjectId> = VecDeque::from([id]);
        while let Some(target) = queue.pop_front() {
            for project in self.projects.values() {
                let refers = project
                    .attributes()
                    .project_references
                    .iter()
                    .any(|r| r.project == target);
                if refers && project.id() != id && seen.insert(project.id()) {
                    queue.push_back(project.id());
                }
            }
        }
        seen
    }

    /// Projects ordered so every project follows its dependencies
    #[must_use]
    pub fn topological_order(&self) -> Vec<ProjectId> {
        let mut ordered = Vec::with_capacity(self.projects.len());
        let mut placed = BTreeSet::new();
        for id in self.projects.keys() {
            self.visit_dependencies_first(*id, &mut placed, &mut ordered);
        }
        ordered
    }

    fn visit_dependencies_first(
        &self,
        id: ProjectId,
        placed: &mut BTreeSet<ProjectId>,
        ordered: &mut Vec<ProjectId>,
    ) {
        let Some(project) = self.project(id) else {
            return;
        };
        if !placed.insert(id) {
            return;
        }
        for reference in &project.attributes().project_references {
            self.visit_dependencies_first(reference.project, placed, ordered);
        }
        ordered.push(id);
    }
}
