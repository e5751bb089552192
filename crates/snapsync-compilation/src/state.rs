//! Snapshot-wide compilation state
//!
//! [`CompilationState`] pairs one [`Snapshot`] with a tracker per project.
//! Forking it alongside the workspace forks only the trackers whose project
//! changed, plus every project that transitively references one of those;
//! all other trackers (and their built units) are shared as-is.

use crate::cache::CompiledUnitCache;
use crate::error::CompilationError;
use crate::provider::SyntaxProvider;
use crate::tracker::{CompilationTracker, EditKind};
use crate::unit::CompiledUnit;
use im::OrdMap;
use snapsync_checksum::ProjectId;
use snapsync_workspace::{Snapshot, WorkspaceChange, WorkspaceChangeKind};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Immutable pairing of a snapshot and its trackers
#[derive(Clone)]
pub struct CompilationState {
    snapshot: Arc<Snapshot>,
    trackers: OrdMap<ProjectId, Arc<CompilationTracker>>,
    provider: Arc<dyn SyntaxProvider>,
    cache: CompiledUnitCache,
}

impl fmt::Debug for CompilationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompilationState")
            .field("version", &self.snapshot.version())
            .field("trackers", &self.trackers.len())
            .finish_non_exhaustive()
    }
}

impl CompilationState {
    /// Fresh trackers for every project of `snapshot`
    #[must_use]
    pub fn new(
        snapshot: Arc<Snapshot>,
        provider: Arc<dyn SyntaxProvider>,
        cache: CompiledUnitCache,
    ) -> Self {
        let trackers = snapshot
            .projects()
            .map(|project| {
                let tracker =
                    CompilationTracker::new(Arc::clone(project), Arc::clone(&provider), cache.clone());
                (project.id(), Arc::new(tracker))
            })
            .collect();
        Self {
            snapshot,
            trackers,
            provider,
            cache,
        }
    }

    /// Snapshot the trackers belong to
    #[must_use]
    pub fn snapshot(&self) -> &Arc<Snapshot> {
        &self.snapshot
    }

    /// Tracker of one project
    #[must_use]
    pub fn tracker(&self, project: ProjectId) -> Option<Arc<CompilationTracker>> {
        self.trackers.get(&project).cloned()
    }

    /// Trackers in project order
    pub fn trackers(&self) -> impl Iterator<Item = &Arc<CompilationTracker>> + '_ {
        self.trackers.values()
    }

    /// Shared unit cache
    #[must_use]
    pub fn cache(&self) -> &CompiledUnitCache {
        &self.cache
    }

    /// Compiled unit of one project
    ///
    /// # Errors
    /// [`CompilationError::UnknownProject`] or [`CompilationError::Cancelled`]
    pub async fn compiled_unit(
        &self,
        project: ProjectId,
        cancel: &CancellationToken,
    ) -> Result<Arc<CompiledUnit>, CompilationError> {
        let tracker = self
            .tracker(project)
            .ok_or(CompilationError::UnknownProject(project))?;
        tracker.get_compiled_unit(self, cancel).await
    }

    /// State for the snapshot a workspace change produced
    #[must_use]
    pub fn fork(&self, change: &WorkspaceChange) -> Self {
        self.fork_to(Arc::clone(&change.new), Some(change.kind))
    }

    /// State for an arbitrary later snapshot
    #[must_use]
    pub fn with_snapshot(&self, snapshot: Arc<Snapshot>) -> Self {
        self.fork_to(snapshot, None)
    }

    fn fork_to(&self, snapshot: Arc<Snapshot>, kind: Option<WorkspaceChangeKind>) -> Self {
        let mut changed = BTreeSet::new();
        for project in snapshot.projects() {
            let unchanged = self
                .snapshot
                .project(project.id())
                .is_some_and(|old| Arc::ptr_eq(old, project));
            if !unchanged {
                changed.insert(project.id());
            }
        }
        changed.extend(self.snapshot.project_ids().filter(|id| snapshot.project(*id).is_none()));

        let mut affected = changed.clone();
        for id in &changed {
            affected.extend(snapshot.transitive_dependents(*id));
        }

        let mut trackers = OrdMap::new();
        for project in snapshot.projects() {
            let id = project.id();
            let tracker = match self.trackers.get(&id) {
                Some(existing) if !affected.contains(&id) => Arc::clone(existing),
                Some(existing) => {
                    let edit = self.edit_kind(id, changed.contains(&id), kind, &snapshot);
                    Arc::new(existing.fork(Arc::clone(project), edit))
                }
                None => Arc::new(CompilationTracker::new(
                    Arc::clone(project),
                    Arc::clone(&self.provider),
                    self.cache.clone(),
                )),
            };
            trackers.insert(id, tracker);
        }
        tracing::debug!(
            version = %snapshot.version(),
            changed = changed.len(),
            forked = affected.len(),
            "compilation state forked"
        );

        Self {
            snapshot,
            trackers,
            provider: Arc::clone(&self.provider),
            cache: self.cache.clone(),
        }
    }

    fn edit_kind(
        &self,
        id: ProjectId,
        changed: bool,
        kind: Option<WorkspaceChangeKind>,
        next: &Snapshot,
    ) -> EditKind {
        if !changed {
            return EditKind::DependencyChanged;
        }
        if let Some(WorkspaceChangeKind::DocumentTextChanged(document)) = kind {
            if document.project() == id {
                return EditKind::TextEdit(document);
            }
        }
        let same_attributes = match (self.snapshot.project(id), next.project(id)) {
            (Some(old), Some(new)) => old.attributes() == new.attributes(),
            _ => false,
        };
        if same_attributes {
            EditKind::DocumentSetChanged
        } else {
            EditKind::AttributesChanged
        }
    }

    /// Every tracker frozen without waiting, dependencies first
    #[must_use]
    pub fn freeze_partial(&self) -> Self {
        let mut frozen: OrdMap<ProjectId, Arc<CompilationTracker>> = OrdMap::new();
        for id in self.snapshot.topological_order() {
            let Some(tracker) = self.trackers.get(&id) else {
                continue;
            };
            let next = tracker.freeze_partial_state(|dependency| {
                frozen
                    .get(&dependency)
                    .and_then(|t| t.latest_unit())
                    .or_else(|| self.trackers.get(&dependency).and_then(|t| t.latest_unit()))
            });
            frozen.insert(id, Arc::new(next));
        }
        Self {
            snapshot: Arc::clone(&self.snapshot),
            trackers: frozen,
            provider: Arc::clone(&self.provider),
            cache: self.cache.clone(),
        }
    }
}
