//! Scoped checksum and asset queries
//!
//! Every query takes an [`AssetPath`] and touches only the nodes inside it.
//! A query for "documents in project P" never hashes another project, and a
//! text-only query never hashes document attributes.

use crate::document::DocumentAttributes;
use crate::error::WorkspaceError;
use crate::project::{ProjectAttributes, ProjectState};
use crate::snapshot::Snapshot;
use serde::Serialize;
use snapsync_checksum::{
    AssetPath, AssetScope, Checksum, ChecksumMerkleTree, DocumentId, InclusionProof, ProjectId,
};
use std::collections::HashSet;
use std::sync::Arc;

/// Which node and field a checksum describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum AssetKey {
    Snapshot,
    Project(ProjectId),
    ProjectAttributes(ProjectId),
    Document(DocumentId),
    DocumentAttributes(DocumentId),
    DocumentText(DocumentId),
}

/// Checksums produced by a scoped query, in traversal order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChecksumSet {
    entries: Vec<(AssetKey, Checksum)>,
}

impl ChecksumSet {
    fn push(&mut self, key: AssetKey, checksum: Checksum) {
        self.entries.push((key, checksum));
    }

    /// Checksum recorded for `key`
    #[must_use]
    pub fn get(&self, key: AssetKey) -> Option<Checksum> {
        self.entries
            .iter()
            .find_map(|(k, c)| (*k == key).then_some(*c))
    }

    /// The only entry, when the query selected exactly one node field
    #[must_use]
    pub fn single(&self) -> Option<Checksum> {
        match self.entries.as_slice() {
            [(_, checksum)] => Some(*checksum),
            _ => None,
        }
    }

    /// Whether any entry has this checksum
    #[must_use]
    pub fn contains_checksum(&self, checksum: Checksum) -> bool {
        self.entries.iter().any(|(_, c)| *c == checksum)
    }

    /// Entries in traversal order
    pub fn iter(&self) -> impl Iterator<Item = &(AssetKey, Checksum)> + '_ {
        self.entries.iter()
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// No entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Concrete content behind a checksum, as pulled by a remote host
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Asset {
    /// Project checksums under the root
    SnapshotSummary { projects: Vec<(ProjectId, Checksum)> },
    /// Attribute checksum and document checksums of a project
    ProjectSummary {
        attributes: Checksum,
        documents: Vec<(DocumentId, Checksum)>,
    },
    ProjectAttributes(ProjectAttributes),
    /// Attribute and text checksums of a document
    DocumentSummary { attributes: Checksum, text: Checksum },
    DocumentAttributes(DocumentAttributes),
    DocumentText(Arc<str>),
}

impl Snapshot {
    fn validate(&self, path: &AssetPath) -> Result<(), WorkspaceError> {
        if let Some(document) = path.document_id() {
            if self.document(document).is_none() {
                return Err(WorkspaceError::UnknownDocument(document));
            }
        } else if let Some(project) = path.project_id() {
            if self.project(project).is_none() {
                return Err(WorkspaceError::UnknownProject(project));
            }
        }
        Ok(())
    }

    fn projects_in<'a>(&'a self, path: &'a AssetPath) -> impl Iterator<Item = &'a Arc<ProjectState>> + 'a {
        let narrowed = path.project_id().and_then(|id| self.project(id));
        let all = path.project_id().is_none();
        narrowed
            .into_iter()
            .chain(self.projects().filter(move |_| all))
    }

    /// Checksums of exactly the nodes selected by `path`
    ///
    /// # Errors
    /// [`WorkspaceError::UnknownProject`] / [`WorkspaceError::UnknownDocument`]
    /// when the path names an identity this snapshot lacks
    pub fn find_checksums(&self, path: &AssetPath) -> Result<ChecksumSet, WorkspaceError> {
        self.validate(path)?;
        let scope = path.scope();
        let mut set = ChecksumSet::default();

        if scope.contains(AssetScope::SNAPSHOT) && path.project_id().is_none() {
            set.push(AssetKey::Snapshot, self.checksum());
        }
        for project in self.projects_in(path) {
            if scope.contains(AssetScope::SNAPSHOT) {
                set.push(AssetKey::Project(project.id()), project.checksum());
            }
            if scope.contains(AssetScope::PROJECT_ATTRIBUTES) {
                set.push(
                    AssetKey::ProjectAttributes(project.id()),
                    project.attributes_checksum(),
                );
            }
            if !scope.intersects(AssetScope::DOCUMENTS) {
                continue;
            }
            for document in project.documents().filter(|d| path.includes_document(d.id())) {
                let id = document.id();
                if scope.contains(AssetScope::DOCUMENTS) {
                    set.push(AssetKey::Document(id), document.checksum());
                }
                if scope.contains(AssetScope::DOCUMENT_ATTRIBUTES) {
                    set.push(AssetKey::DocumentAttributes(id), document.attributes_checksum());
                }
                if scope.contains(AssetScope::DOCUMENT_TEXT) {
                    set.push(AssetKey::DocumentText(id), document.text_checksum());
                }
            }
        }
        tracing::trace!(%path, entries = set.len(), "scoped checksums");
        Ok(set)
    }

    /// Assets inside `path` whose checksum is in `wanted`
    ///
    /// Checksums not found in scope are simply absent from the result.
    ///
    /// # Errors
    /// Same as [`find_checksums`](Self::find_checksums)
    pub fn find_assets(
        &self,
        path: &AssetPath,
        wanted: &[Checksum],
    ) -> Result<Vec<(Checksum, Asset)>, WorkspaceError> {
        let wanted: HashSet<Checksum> = wanted.iter().copied().collect();
        let found = self
            .find_checksums(path)?
            .iter()
            .filter(|(_, checksum)| wanted.contains(checksum))
            .filter_map(|(key, checksum)| self.materialize(*key).map(|asset| (*checksum, asset)))
            .collect();
        Ok(found)
    }

    fn materialize(&self, key: AssetKey) -> Option<Asset> {
        let asset = match key {
            AssetKey::Snapshot => Asset::SnapshotSummary {
                projects: self.projects().map(|p| (p.id(), p.checksum())).collect(),
            },
            AssetKey::Project(id) => {
                let project = self.project(id)?;
                Asset::ProjectSummary {
                    attributes: project.attributes_checksum(),
                    documents: project.documents().map(|d| (d.id(), d.checksum())).collect(),
                }
            }
            AssetKey::ProjectAttributes(id) => {
                Asset::ProjectAttributes(self.project(id)?.attributes().clone())
            }
            AssetKey::Document(id) => {
                let document = self.document(id)?;
                Asset::DocumentSummary {
                    attributes: document.attributes_checksum(),
                    text: document.text_checksum(),
                }
            }
            AssetKey::DocumentAttributes(id) => {
                Asset::DocumentAttributes(self.document(id)?.attributes().clone())
            }
            AssetKey::DocumentText(id) => Asset::DocumentText(self.document(id)?.text().ok()?),
        };
        Some(asset)
    }

    /// Proof that a document's checksum is included in its project's documents root
    ///
    /// # Errors
    /// [`WorkspaceError::UnknownDocument`]
    pub fn document_proof(&self, id: DocumentId) -> Result<(Checksum, InclusionProof), WorkspaceError> {
        let project = self
            .project(id.project())
            .ok_or(WorkspaceError::UnknownDocument(id))?;
        let leaves: Vec<Checksum> = project.documents().map(|d| d.checksum()).collect();
        let index = project
            .documents()
            .position(|d| d.id() == id)
            .ok_or(WorkspaceError::UnknownDocument(id))?;
        let tree = ChecksumMerkleTree::from_leaves(&leaves);
        let proof = tree.proof(index).ok_or(WorkspaceError::UnknownDocument(id))?;
        Ok((tree.root(), proof))
    }

    /// Proof that a project's checksum is included in the root's project combination
    ///
    /// # Errors
    /// [`WorkspaceError::UnknownProject`]
    pub fn project_proof(&self, id: ProjectId) -> Result<(Checksum, InclusionProof), WorkspaceError> {
        let leaves: Vec<Checksum> = self.projects().map(|p| p.checksum()).collect();
        let index = self
            .project_ids()
            .position(|p| p == id)
            .ok_or(WorkspaceError::UnknownProject(id))?;
        let tree = ChecksumMerkleTree::from_leaves(&leaves);
        let proof = tree.proof(index).ok_or(WorkspaceError::UnknownProject(id))?;
        debug_assert_eq!(tree.root(), self.projects_root());
        Ok((tree.root(), proof))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{DocumentAttributes, DocumentState};
    use crate::project::ProjectAttributes;

    fn pid(n: u128) -> ProjectId {
        ProjectId::from_raw(n)
    }

    fn did(p: u128, n: u128) -> DocumentId {
        DocumentId::from_raw(pid(p), n)
    }

    fn snapshot() -> Snapshot {
        let mut snapshot = Snapshot::empty();
        for p in 1..=3 {
            snapshot = snapshot
                .add_project(ProjectState::new(ProjectAttributes::new(pid(p), format!("p{p}"), "rust")))
                .unwrap();
            for d in 1..=2 {
                snapshot = snapshot
                    .add_document(DocumentState::new(
                        DocumentAttributes::new(did(p, d), format!("p{p}/{d}.rs")),
                        format!("text {p} {d}"),
                    ))
                    .unwrap();
            }
        }
        snapshot
    }

    #[test]
    fn documents_in_project_never_touches_siblings() {
        let snapshot = snapshot();
        let set = snapshot
            .find_checksums(&AssetPath::documents_in_project(pid(2)))
            .unwrap();

        assert_eq!(set.len(), 6);
        assert!(set.get(AssetKey::Document(did(2, 1))).is_some());
        for other in [pid(1), pid(3)] {
            let project = snapshot.project(other).unwrap();
            assert!(!project.is_any_checksum_computed());
            assert!(project.documents().all(|d| !d.is_checksum_computed()));
        }
        assert!(!snapshot.is_checksum_computed());
    }

    #[test]
    fn text_scope_only_hashes_text() {
        let snapshot = snapshot();
        let set = snapshot
            .find_checksums(&AssetPath::document_text(did(1, 2)))
            .unwrap();
        let document = snapshot.document(did(1, 2)).unwrap();
        assert_eq!(set.single(), Some(Checksum::of_text("text 1 2")));
        assert!(!document.is_checksum_computed());
        assert!(!snapshot.document(did(1, 1)).unwrap().is_text_checksum_computed());
    }

    #[test]
    fn full_tree_matches_node_checksums() {
        let snapshot = snapshot();
        let set = snapshot.find_checksums(&AssetPath::full_tree()).unwrap();
        assert_eq!(set.get(AssetKey::Snapshot), Some(snapshot.checksum()));
        assert_eq!(
            set.get(AssetKey::Project(pid(3))),
            Some(snapshot.project(pid(3)).unwrap().checksum())
        );
        assert_eq!(set.len(), 1 + 3 * 2 + 3 * 2 * 3);
    }

    #[test]
    fn unknown_identity_in_path_is_an_error() {
        let snapshot = snapshot();
        assert_eq!(
            snapshot
                .find_checksums(&AssetPath::documents_in_project(pid(9)))
                .unwrap_err(),
            WorkspaceError::UnknownProject(pid(9))
        );
    }

    #[test]
    fn find_assets_returns_requested_text() {
        let snapshot = snapshot();
        let wanted = Checksum::of_text("text 3 1");
        let assets = snapshot
            .find_assets(&AssetPath::documents_in_project(pid(3)), &[wanted, Checksum::compute(b"nope")])
            .unwrap();
        assert_eq!(assets, vec![(wanted, Asset::DocumentText(Arc::from("text 3 1")))]);
    }

    #[test]
    fn find_assets_respects_scope() {
        let snapshot = snapshot();
        let outside = Checksum::of_text("text 3 1");
        let assets = snapshot
            .find_assets(&AssetPath::documents_in_project(pid(1)), &[outside])
            .unwrap();
        assert!(assets.is_empty());
    }

    #[test]
    fn pulled_children_verify_against_parents() {
        let snapshot = snapshot();
        let document = snapshot.document(did(2, 2)).unwrap();
        let (root, proof) = snapshot.document_proof(did(2, 2)).unwrap();
        assert_eq!(root, snapshot.project(pid(2)).unwrap().documents_checksum());
        assert!(proof.verify(document.checksum(), root));

        let (root, proof) = snapshot.project_proof(pid(1)).unwrap();
        assert!(proof.verify(snapshot.project(pid(1)).unwrap().checksum(), root));
    }
}
