//! Per-project compilation tracking
//!
//! A [`CompilationTracker`] owns the compiled unit of one [`ProjectState`]
//! version. It moves through
//!
//! ```text
//! Empty -> InProgress -> Built -> (PartiallyFrozen)
//! ```
//!
//! and reports `Superseded` once it has been forked. Builds run as spawned
//! tasks behind a shared future: every caller awaits the same build, and a
//! caller giving up never cancels it.

use crate::cache::CompiledUnitCache;
use crate::error::CompilationError;
use crate::provider::SyntaxProvider;
use crate::state::CompilationState;
use crate::unit::{CompiledUnit, Containment, LoadFailure, SymbolHandle, SymbolOrigin, SyntaxTree, UnitParts};
use futures::future::{BoxFuture, FutureExt, Shared};
use im::OrdMap;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use snapsync_checksum::{Checksum, ChecksumWriter, DocumentId, ProjectId};
use snapsync_workspace::{DocumentState, ProjectState, Snapshot};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

type SharedBuild = Shared<BoxFuture<'static, Arc<CompiledUnit>>>;

/// How a project changed between two tracker versions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditKind {
    /// Only the text of this document changed
    TextEdit(DocumentId),
    /// Documents were added or removed
    DocumentSetChanged,
    /// Options or references changed
    AttributesChanged,
    /// The project is unchanged but something it references changed
    DependencyChanged,
}

/// Observable tracker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerStatus {
    Empty,
    InProgress,
    Built,
    PartiallyFrozen,
    Superseded,
}

enum TrackerState {
    Empty,
    InProgress(SharedBuild),
    Built(Arc<CompiledUnit>),
    Frozen(Arc<CompiledUnit>),
}

enum BuildHandle {
    Ready(Arc<CompiledUnit>),
    Pending(SharedBuild),
}

/// Lazily built compiled unit of one project version
pub struct CompilationTracker {
    project: Arc<ProjectState>,
    provider: Arc<dyn SyntaxProvider>,
    cache: CompiledUnitCache,
    state: Mutex<TrackerState>,
    superseded: AtomicBool,
    /// Unit of an earlier version, for tree reuse and freezing
    stale: Option<Arc<CompiledUnit>>,
    /// Stale trees were parsed with the current parse options
    trees_reusable: bool,
    edited: Option<DocumentId>,
    dependent_checksum: OnceCell<Checksum>,
}

impl fmt::Debug for CompilationTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompilationTracker")
            .field("project", &self.project.id())
            .field("status", &self.status())
            .field("has_stale", &self.stale.is_some())
            .finish_non_exhaustive()
    }
}

impl CompilationTracker {
    /// Tracker with nothing built yet
    #[must_use]
    pub fn new(
        project: Arc<ProjectState>,
        provider: Arc<dyn SyntaxProvider>,
        cache: CompiledUnitCache,
    ) -> Self {
        Self {
            project,
            provider,
            cache,
            state: Mutex::new(TrackerState::Empty),
            superseded: AtomicBool::new(false),
            stale: None,
            trees_reusable: false,
            edited: None,
            dependent_checksum: OnceCell::new(),
        }
    }

    /// Project version this tracker compiles
    #[must_use]
    pub fn project(&self) -> &Arc<ProjectState> {
        &self.project
    }

    /// Current state
    #[must_use]
    pub fn status(&self) -> TrackerStatus {
        if self.is_superseded() {
            return TrackerStatus::Superseded;
        }
        match &*self.state.lock() {
            TrackerState::Empty => TrackerStatus::Empty,
            TrackerState::InProgress(_) => TrackerStatus::InProgress,
            TrackerState::Built(_) => TrackerStatus::Built,
            TrackerState::Frozen(_) => TrackerStatus::PartiallyFrozen,
        }
    }

    /// Whether a newer project version has forked from this tracker
    #[must_use]
    pub fn is_superseded(&self) -> bool {
        self.superseded.load(Ordering::Acquire)
    }

    /// Built or frozen unit, without waiting
    #[must_use]
    pub fn latest_unit(&self) -> Option<Arc<CompiledUnit>> {
        match &*self.state.lock() {
            TrackerState::Built(unit) | TrackerState::Frozen(unit) => Some(Arc::clone(unit)),
            TrackerState::Empty | TrackerState::InProgress(_) => None,
        }
    }

    /// Tracker for the next version of this project
    ///
    /// Returns immediately; nothing is built until first access. A text edit
    /// lets the new tracker keep every unchanged document's syntax tree and
    /// reparse only the edited one.
    #[must_use]
    pub fn fork(&self, project: Arc<ProjectState>, edit: EditKind) -> Self {
        self.superseded.store(true, Ordering::Release);

        let (stale, reusable) = match self.latest_unit() {
            Some(unit) => (Some(unit), true),
            None => (self.stale.clone(), self.trees_reusable),
        };
        let same_parse_options =
            self.project.attributes().parse_options == project.attributes().parse_options;
        let edited = match edit {
            EditKind::TextEdit(document) => Some(document),
            _ => None,
        };
        debug!(project = %project.id(), ?edit, has_stale = stale.is_some(), "compilation tracker forked");

        Self {
            project,
            provider: Arc::clone(&self.provider),
            cache: self.cache.clone(),
            state: Mutex::new(TrackerState::Empty),
            superseded: AtomicBool::new(false),
            stale,
            trees_reusable: reusable && same_parse_options,
            edited,
            dependent_checksum: OnceCell::new(),
        }
    }

    /// The compiled unit, building it at most once
    ///
    /// Concurrent callers share one build. Cancelling `cancel` abandons only
    /// this caller's wait.
    ///
    /// # Errors
    /// [`CompilationError::Cancelled`] if `cancel` fires first
    pub async fn get_compiled_unit(
        self: &Arc<Self>,
        state: &CompilationState,
        cancel: &CancellationToken,
    ) -> Result<Arc<CompiledUnit>, CompilationError> {
        if cancel.is_cancelled() {
            return Err(CompilationError::Cancelled);
        }
        let build = match self.shared_build(state) {
            BuildHandle::Ready(unit) => return Ok(unit),
            BuildHandle::Pending(build) => build,
        };
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!(project = %self.project.id(), "stopped waiting for compiled unit");
                Err(CompilationError::Cancelled)
            }
            unit = build => Ok(unit),
        }
    }

    /// Whether this project's own inputs all resolved
    ///
    /// Failures of referenced projects do not count.
    ///
    /// # Errors
    /// [`CompilationError::Cancelled`] if `cancel` fires first
    pub async fn has_successfully_loaded(
        self: &Arc<Self>,
        state: &CompilationState,
        cancel: &CancellationToken,
    ) -> Result<bool, CompilationError> {
        Ok(self
            .get_compiled_unit(state, cancel)
            .await?
            .has_successfully_loaded())
    }

    /// Memoized checksum of this project and everything it transitively references
    #[must_use]
    pub fn dependent_checksum(&self, snapshot: &Snapshot) -> Checksum {
        *self.dependent_checksum.get_or_init(|| {
            let mut writer = ChecksumWriter::new("dependent");
            writer.write_checksum(&self.project.checksum());
            let dependencies = snapshot.transitive_dependencies(self.project.id());
            writer.write_u64(dependencies.len() as u64);
            for id in dependencies {
                writer.write_id(id.to_bytes());
                match snapshot.project(id) {
                    Some(project) => writer.write_bool(true).write_checksum(&project.checksum()),
                    None => writer.write_bool(false),
                };
            }
            writer.finish()
        })
    }

    /// Whether `symbol` came from this tracker's unit or, unless
    /// `primary_only`, from something it references
    ///
    /// Only consults a unit that already exists; never starts a build.
    #[must_use]
    pub fn contains_symbol(&self, symbol: &SymbolHandle, primary_only: bool) -> Containment {
        match self.latest_unit() {
            Some(unit) => unit.contains(symbol, primary_only),
            None => Containment {
                contained: symbol.origin() == SymbolOrigin::Dynamic,
                referenced_through: None,
            },
        }
    }

    /// A tracker usable immediately, without waiting for any build
    ///
    /// Keeps the built unit if there is one. Otherwise assembles a partial
    /// unit from stale trees whose text is unchanged and from whatever
    /// dependency units `dependency_unit` can hand over right now.
    #[must_use]
    pub fn freeze_partial_state<F>(&self, dependency_unit: F) -> Self
    where
        F: Fn(ProjectId) -> Option<Arc<CompiledUnit>>,
    {
        let unit = self
            .latest_unit()
            .unwrap_or_else(|| Arc::new(self.partial_unit(&dependency_unit)));
        let dependent_checksum = OnceCell::new();
        if let Some(checksum) = self.dependent_checksum.get() {
            let _ = dependent_checksum.set(*checksum);
        }
        Self {
            project: Arc::clone(&self.project),
            provider: Arc::clone(&self.provider),
            cache: self.cache.clone(),
            state: Mutex::new(TrackerState::Frozen(unit)),
            superseded: AtomicBool::new(false),
            stale: self.stale.clone(),
            trees_reusable: self.trees_reusable,
            edited: self.edited,
            dependent_checksum,
        }
    }

    fn partial_unit<F>(&self, dependency_unit: &F) -> CompiledUnit
    where
        F: Fn(ProjectId) -> Option<Arc<CompiledUnit>>,
    {
        let mut syntax_trees = OrdMap::new();
        if let Some(stale) = &self.stale {
            for document in self.project.documents().filter(|d| d.is_text_loaded()) {
                if let Some(tree) = stale.syntax_tree(document.id()) {
                    if tree.text_checksum() == document.text_checksum() {
                        syntax_trees.insert(document.id(), Arc::clone(tree));
                    }
                }
            }
        }
        let references = self
            .project
            .attributes()
            .project_references
            .iter()
            .filter_map(|r| dependency_unit(r.project).map(|unit| (r.project, unit)))
            .collect();
        debug!(
            project = %self.project.id(),
            trees = syntax_trees.len(),
            documents = self.project.document_count(),
            "froze partial compiled unit"
        );
        CompiledUnit::assemble(UnitParts {
            project: self.project.id(),
            dependent_checksum: self.dependent_checksum.get().copied().unwrap_or_default(),
            syntax_trees,
            references,
            metadata: self.project.attributes().metadata_references.clone(),
            load_failures: Vec::new(),
            partial: true,
        })
    }

    pub(crate) async fn await_unit(self: &Arc<Self>, state: &CompilationState) -> Arc<CompiledUnit> {
        match self.shared_build(state) {
            BuildHandle::Ready(unit) => unit,
            BuildHandle::Pending(build) => build.await,
        }
    }

    fn shared_build(self: &Arc<Self>, state: &CompilationState) -> BuildHandle {
        let mut guard = self.state.lock();
        match &*guard {
            TrackerState::Built(unit) | TrackerState::Frozen(unit) => {
                return BuildHandle::Ready(Arc::clone(unit));
            }
            TrackerState::InProgress(build) => return BuildHandle::Pending(build.clone()),
            TrackerState::Empty => {}
        }

        let project = self.project.id();
        let tracker = Arc::downgrade(self);
        let task = tokio::spawn(Arc::clone(self).build(state.clone()));
        let build = async move {
            match task.await {
                Ok(unit) => unit,
                Err(error) => {
                    warn!(%project, %error, "compilation build aborted");
                    let tracker = tracker.upgrade();
                    let dependent_checksum = tracker
                        .as_ref()
                        .and_then(|t| t.dependent_checksum.get().copied())
                        .unwrap_or_default();
                    let unit = Arc::new(CompiledUnit::aborted(project, dependent_checksum, error.to_string()));
                    if let Some(tracker) = tracker {
                        tracker.complete(&unit);
                    }
                    unit
                }
            }
        }
        .boxed()
        .shared();
        *guard = TrackerState::InProgress(build.clone());
        BuildHandle::Pending(build)
    }

    fn build(self: Arc<Self>, state: CompilationState) -> BoxFuture<'static, Arc<CompiledUnit>> {
        async move {
            let project = self.project.id();
            let dependent_checksum = self.dependent_checksum(state.snapshot());
            if let Some(cached) = self.cache.get(&dependent_checksum).await {
                debug!(%project, unit = %cached.id(), "reusing cached compiled unit");
                self.complete(&cached);
                return cached;
            }

            debug!(%project, documents = self.project.document_count(), "building compiled unit");
            let mut load_failures = Vec::new();
            let mut syntax_trees = OrdMap::new();
            for document in self.project.documents() {
                match self.syntax_tree_for(document) {
                    Ok(tree) => {
                        syntax_trees.insert(document.id(), tree);
                    }
                    Err(failure) => load_failures.push(failure),
                }
            }

            let mut references = Vec::new();
            for reference in &self.project.attributes().project_references {
                match state.tracker(reference.project) {
                    Some(dependency) => {
                        references.push((reference.project, dependency.await_unit(&state).await));
                    }
                    None => load_failures.push(LoadFailure::UnresolvedProjectReference(reference.project)),
                }
            }

            let unit = Arc::new(CompiledUnit::assemble(UnitParts {
                project,
                dependent_checksum,
                syntax_trees,
                references,
                metadata: self.project.attributes().metadata_references.clone(),
                load_failures,
                partial: false,
            }));
            debug!(
                %project,
                unit = %unit.id(),
                loaded = unit.has_successfully_loaded(),
                "compiled unit built"
            );
            self.cache.insert(Arc::clone(&unit)).await;
            self.complete(&unit);
            unit
        }
        .boxed()
    }

    fn syntax_tree_for(&self, document: &DocumentState) -> Result<Arc<SyntaxTree>, LoadFailure> {
        let id = document.id();
        let text = document.text().map_err(|error| LoadFailure::TextLoad {
            document: id,
            message: error.message,
        })?;
        let previous = self
            .stale
            .as_ref()
            .filter(|_| self.trees_reusable)
            .and_then(|unit| unit.syntax_tree_map().get(&id));
        if let Some(previous) = previous {
            if previous.text_checksum() == document.text_checksum() {
                return Ok(Arc::clone(previous));
            }
        }

        let options = &self.project.attributes().parse_options;
        let parsed = match previous {
            Some(previous) if self.edited == Some(id) => {
                self.provider.reparse(previous, document, &text, options)
            }
            _ => self.provider.parse(document, &text, options),
        };
        parsed.map(Arc::new).map_err(|failure| LoadFailure::Parse {
            document: id,
            message: failure.0,
        })
    }

    fn complete(&self, unit: &Arc<CompiledUnit>) {
        let mut guard = self.state.lock();
        if matches!(*guard, TrackerState::Empty | TrackerState::InProgress(_)) {
            *guard = TrackerState::Built(Arc::clone(unit));
        }
    }
}
