//! The live workspace
//!
//! [`Workspace`] owns the current [`Snapshot`], serializes writers, and
//! publishes a [`WorkspaceChange`] for every accepted fork.

use crate::document::DocumentState;
use crate::error::WorkspaceError;
use crate::project::ProjectState;
use crate::snapshot::Snapshot;
use crate::subscription::{EventSource, Subscription};
use parking_lot::{ReentrantMutex, RwLock};
use snapsync_checksum::{DocumentId, ProjectId};
use std::sync::Arc;

/// What a fork changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkspaceChangeKind {
    DocumentTextChanged(DocumentId),
    DocumentAdded(DocumentId),
    DocumentRemoved(DocumentId),
    ProjectAdded(ProjectId),
    ProjectChanged(ProjectId),
    ProjectRemoved(ProjectId),
    /// Arbitrary replacement; consumers compare snapshots themselves
    SnapshotReplaced,
}

impl WorkspaceChangeKind {
    /// Project touched by the change, if exactly one
    #[must_use]
    pub fn project(&self) -> Option<ProjectId> {
        match self {
            Self::DocumentTextChanged(d) | Self::DocumentAdded(d) | Self::DocumentRemoved(d) => {
                Some(d.project())
            }
            Self::ProjectAdded(p) | Self::ProjectChanged(p) | Self::ProjectRemoved(p) => Some(*p),
            Self::SnapshotReplaced => None,
        }
    }
}

/// Published after every accepted fork
#[derive(Debug, Clone)]
pub struct WorkspaceChange {
    pub kind: WorkspaceChangeKind,
    pub old: Arc<Snapshot>,
    pub new: Arc<Snapshot>,
}

/// Mutable holder of the current snapshot
///
/// Subscribers see changes in commit order. A subscriber may itself write to
/// the workspace; its change is delivered before the outer one reaches the
/// remaining subscribers.
#[derive(Debug)]
pub struct Workspace {
    current: RwLock<Arc<Snapshot>>,
    writer: ReentrantMutex<()>,
    changes: EventSource<WorkspaceChange>,
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new(Snapshot::empty())
    }
}

impl Workspace {
    /// Workspace starting at `initial`
    #[must_use]
    pub fn new(initial: Snapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(initial)),
            writer: ReentrantMutex::new(()),
            changes: EventSource::new(),
        }
    }

    /// The current snapshot
    #[must_use]
    pub fn current(&self) -> Arc<Snapshot> {
        Arc::clone(&self.current.read())
    }

    /// Observe accepted forks
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&WorkspaceChange) + Send + Sync + 'static,
    {
        self.changes.subscribe(handler)
    }

    /// Fork the current snapshot with `edit` and publish the result
    ///
    /// Writers are serialized. Subscribers run after the new snapshot is
    /// visible and before the next writer proceeds.
    ///
    /// # Errors
    /// Whatever `edit` returns; nothing is published on error
    pub fn apply<F>(&self, kind: WorkspaceChangeKind, edit: F) -> Result<WorkspaceChange, WorkspaceError>
    where
        F: FnOnce(&Snapshot) -> Result<Snapshot, WorkspaceError>,
    {
        let _writer = self.writer.lock();
        let old = self.current();
        let new = Arc::new(edit(&old)?);
        *self.current.write() = Arc::clone(&new);
        let change = WorkspaceChange { kind, old, new };
        tracing::trace!(kind = ?change.kind, version = %change.new.version(), "workspace changed");
        self.changes.emit(&change);
        Ok(change)
    }

    /// Replace one document's text
    ///
    /// # Errors
    /// [`WorkspaceError::UnknownDocument`]
    pub fn set_document_text(
        &self,
        id: DocumentId,
        text: impl Into<Arc<str>>,
    ) -> Result<WorkspaceChange, WorkspaceError> {
        let text = text.into();
        self.apply(WorkspaceChangeKind::DocumentTextChanged(id), |s| {
            s.with_document_text(id, text)
        })
    }

    /// Add a project
    ///
    /// # Errors
    /// See [`Snapshot::add_project`]
    pub fn add_project(&self, project: ProjectState) -> Result<WorkspaceChange, WorkspaceError> {
        self.apply(WorkspaceChangeKind::ProjectAdded(project.id()), |s| {
            s.add_project(project)
        })
    }

    /// Remove a project
    ///
    /// # Errors
    /// See [`Snapshot::remove_project`]
    pub fn remove_project(&self, id: ProjectId) -> Result<WorkspaceChange, WorkspaceError> {
        self.apply(WorkspaceChangeKind::ProjectRemoved(id), |s| s.remove_project(id))
    }

    /// Add a document
    ///
    /// # Errors
    /// See [`Snapshot::add_document`]
    pub fn add_document(&self, document: DocumentState) -> Result<WorkspaceChange, WorkspaceError> {
        self.apply(WorkspaceChangeKind::DocumentAdded(document.id()), |s| {
            s.add_document(document)
        })
    }

    /// Remove a document
    ///
    /// # Errors
    /// See [`Snapshot::remove_document`]
    pub fn remove_document(&self, id: DocumentId) -> Result<WorkspaceChange, WorkspaceError> {
        self.apply(WorkspaceChangeKind::DocumentRemoved(id), |s| s.remove_document(id))
    }

    /// Replace the whole snapshot
    ///
    /// The new snapshot's version is bumped past the current one if needed,
    /// so versions observed by subscribers never go backwards.
    pub fn replace(&self, snapshot: Snapshot) -> WorkspaceChange {
        let _writer = self.writer.lock();
        let old = self.current();
        let new = Arc::new(snapshot.rebased_after(old.version()));
        *self.current.write() = Arc::clone(&new);
        let change = WorkspaceChange {
            kind: WorkspaceChangeKind::SnapshotReplaced,
            old,
            new,
        };
        self.changes.emit(&change);
        change
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentAttributes;
    use crate::project::ProjectAttributes;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn pid() -> ProjectId {
        ProjectId::from_raw(1)
    }

    fn did() -> DocumentId {
        DocumentId::from_raw(pid(), 1)
    }

    fn workspace() -> Workspace {
        let workspace = Workspace::default();
        workspace
            .add_project(ProjectState::new(ProjectAttributes::new(pid(), "p", "rust")))
            .unwrap();
        workspace
            .add_document(DocumentState::new(DocumentAttributes::new(did(), "a.rs"), ""))
            .unwrap();
        workspace
    }

    #[test]
    fn edits_publish_old_and_new() {
        let workspace = workspace();
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _subscription = workspace.subscribe(move |change| {
            sink.lock().push((change.kind, change.old.version(), change.new.version()));
        });

        let change = workspace.set_document_text(did(), "hello").unwrap();
        assert_eq!(&*change.new.document(did()).unwrap().text().unwrap(), "hello");
        assert_eq!(&*change.old.document(did()).unwrap().text().unwrap(), "");
        assert_eq!(workspace.current().version(), change.new.version());

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, WorkspaceChangeKind::DocumentTextChanged(did()));
        assert!(seen[0].1 < seen[0].2);
    }

    #[test]
    fn failed_edit_publishes_nothing() {
        let workspace = workspace();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let _subscription = workspace.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let before = workspace.current();

        let missing = DocumentId::from_raw(pid(), 42);
        assert!(workspace.set_document_text(missing, "x").is_err());
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(Arc::ptr_eq(&before, &workspace.current()));
    }

    #[test]
    fn concurrent_writers_publish_in_commit_order() {
        let workspace = workspace();
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _subscription = workspace.subscribe(move |change| {
            sink.lock().push((change.old.version(), change.new.version()));
        });

        std::thread::scope(|scope| {
            for writer in 0..4 {
                let workspace = &workspace;
                scope.spawn(move || {
                    for i in 0..50 {
                        workspace.set_document_text(did(), format!("{writer}:{i}")).unwrap();
                    }
                });
            }
        });

        let seen = seen.lock();
        assert_eq!(seen.len(), 200);
        for pair in seen.windows(2) {
            assert_eq!(pair[0].1, pair[1].0);
            assert!(pair[0].1 < pair[1].1);
        }
        assert_eq!(seen.last().map(|v| v.1), Some(workspace.current().version()));
    }

    #[test]
    fn subscriber_may_write_back() {
        let workspace = Arc::new(workspace());
        let weak = Arc::downgrade(&workspace);
        let _subscription = workspace.subscribe(move |change| {
            if change.kind == WorkspaceChangeKind::DocumentTextChanged(did()) {
                if let Some(workspace) = weak.upgrade() {
                    workspace.remove_document(did()).unwrap();
                }
            }
        });

        workspace.set_document_text(did(), "gone soon").unwrap();
        assert!(workspace.current().document(did()).is_none());
    }

    #[test]
    fn replace_never_moves_version_backwards() {
        let workspace = workspace();
        let before = workspace.current().version();
        let change = workspace.replace(Snapshot::empty());
        assert!(change.new.version() > before);
        assert_eq!(change.kind.project(), None);
    }
}
