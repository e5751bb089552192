//! Compiled units
//!
//! A [`CompiledUnit`] is the derived semantic artifact of one project. Its
//! internals are intentionally simple: per-document syntax trees, resolved
//! references, and the load failures met while building it. What matters is
//! identity (symbols belong to exactly one unit) and validity (the dependent
//! checksum it was built for).

use im::OrdMap;
use snapsync_checksum::{Checksum, DocumentId, ProjectId};
use snapsync_workspace::MetadataReference;
use std::fmt::{self, Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_UNIT_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one built unit; never reused
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UnitId(u64);

impl UnitId {
    fn next() -> Self {
        Self(NEXT_UNIT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl Display for UnitId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "unit#{}", self.0)
    }
}

/// Parsed form of one document, as produced by a syntax provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxTree {
    document: DocumentId,
    text_checksum: Checksum,
    declarations: Vec<Arc<str>>,
}

impl SyntaxTree {
    /// Tree for the text whose checksum is `text_checksum`
    #[must_use]
    pub fn new(document: DocumentId, text_checksum: Checksum, declarations: Vec<Arc<str>>) -> Self {
        Self {
            document,
            text_checksum,
            declarations,
        }
    }

    /// Source document
    #[must_use]
    pub fn document(&self) -> DocumentId {
        self.document
    }

    /// Checksum of the text this tree was parsed from
    #[must_use]
    pub fn text_checksum(&self) -> Checksum {
        self.text_checksum
    }

    /// Names declared by the document
    #[must_use]
    pub fn declarations(&self) -> &[Arc<str>] {
        &self.declarations
    }
}

/// Where a symbol comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolOrigin {
    /// Declared in source of a built unit
    Unit(UnitId),
    /// Imported from a prebuilt reference with this content checksum
    Metadata(Checksum),
    /// Synthesized by the language; available everywhere
    Dynamic,
}

/// Opaque handle to a symbol
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SymbolHandle {
    origin: SymbolOrigin,
    name: Arc<str>,
}

impl SymbolHandle {
    /// Symbol from a prebuilt reference
    #[must_use]
    pub fn metadata(content: Checksum, name: impl Into<Arc<str>>) -> Self {
        Self {
            origin: SymbolOrigin::Metadata(content),
            name: name.into(),
        }
    }

    /// Language-synthesized symbol
    #[must_use]
    pub fn dynamic(name: impl Into<Arc<str>>) -> Self {
        Self {
            origin: SymbolOrigin::Dynamic,
            name: name.into(),
        }
    }

    /// Origin
    #[must_use]
    pub fn origin(&self) -> SymbolOrigin {
        self.origin
    }

    /// Name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Which direct reference made a symbol reachable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferencedThrough {
    Project(ProjectId),
    Metadata(Checksum),
}

/// Answer to a containment query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Containment {
    pub contained: bool,
    pub referenced_through: Option<ReferencedThrough>,
}

impl Containment {
    const NO: Self = Self {
        contained: false,
        referenced_through: None,
    };

    const PRIMARY: Self = Self {
        contained: true,
        referenced_through: None,
    };

    fn through(reference: ReferencedThrough) -> Self {
        Self {
            contained: true,
            referenced_through: Some(reference),
        }
    }
}

/// Input a project could not resolve while building
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadFailure {
    TextLoad { document: DocumentId, message: String },
    Parse { document: DocumentId, message: String },
    UnresolvedProjectReference(ProjectId),
    /// The build task itself died
    BuildAborted(String),
}

pub(crate) struct UnitParts {
    pub(crate) project: ProjectId,
    pub(crate) dependent_checksum: Checksum,
    pub(crate) syntax_trees: OrdMap<DocumentId, Arc<SyntaxTree>>,
    pub(crate) references: Vec<(ProjectId, Arc<CompiledUnit>)>,
    pub(crate) metadata: Vec<MetadataReference>,
    pub(crate) load_failures: Vec<LoadFailure>,
    pub(crate) partial: bool,
}

/// Semantic artifact of one project
#[derive(Debug)]
pub struct CompiledUnit {
    id: UnitId,
    project: ProjectId,
    dependent_checksum: Checksum,
    syntax_trees: OrdMap<DocumentId, Arc<SyntaxTree>>,
    references: Vec<(ProjectId, Arc<CompiledUnit>)>,
    metadata: Vec<MetadataReference>,
    load_failures: Vec<LoadFailure>,
    partial: bool,
}

impl CompiledUnit {
    pub(crate) fn assemble(parts: UnitParts) -> Self {
        Self {
            id: UnitId::next(),
            project: parts.project,
            dependent_checksum: parts.dependent_checksum,
            syntax_trees: parts.syntax_trees,
            references: parts.references,
            metadata: parts.metadata,
            load_failures: parts.load_failures,
            partial: parts.partial,
        }
    }

    pub(crate) fn aborted(project: ProjectId, dependent_checksum: Checksum, reason: String) -> Self {
        Self::assemble(UnitParts {
            project,
            dependent_checksum,
            syntax_trees: OrdMap::new(),
            references: Vec::new(),
            metadata: Vec::new(),
            load_failures: vec![LoadFailure::BuildAborted(reason)],
            partial: false,
        })
    }

    /// Identity of this build
    #[must_use]
    pub fn id(&self) -> UnitId {
        self.id
    }

    /// Owning project
    #[must_use]
    pub fn project(&self) -> ProjectId {
        self.project
    }

    /// Dependent checksum the unit was built for
    #[must_use]
    pub fn dependent_checksum(&self) -> Checksum {
        self.dependent_checksum
    }

    /// Tree of one document
    #[must_use]
    pub fn syntax_tree(&self, document: DocumentId) -> Option<&Arc<SyntaxTree>> {
        self.syntax_trees.get(&document)
    }

    /// All trees in document order
    pub fn syntax_trees(&self) -> impl Iterator<Item = &Arc<SyntaxTree>> + '_ {
        self.syntax_trees.values()
    }

    pub(crate) fn syntax_tree_map(&self) -> &OrdMap<DocumentId, Arc<SyntaxTree>> {
        &self.syntax_trees
    }

    /// Resolved project references, in reference order
    #[must_use]
    pub fn references(&self) -> &[(ProjectId, Arc<CompiledUnit>)] {
        &self.references
    }

    /// Prebuilt references
    #[must_use]
    pub fn metadata(&self) -> &[MetadataReference] {
        &self.metadata
    }

    /// Failures met while building this project's own inputs
    #[must_use]
    pub fn load_failures(&self) -> &[LoadFailure] {
        &self.load_failures
    }

    /// Whether every input of this project resolved
    #[must_use]
    pub fn has_successfully_loaded(&self) -> bool {
        self.load_failures.is_empty()
    }

    /// Assembled without waiting for a full build
    #[must_use]
    pub fn is_partial(&self) -> bool {
        self.partial
    }

    /// Handle for a name declared in this unit's source
    #[must_use]
    pub fn symbol(&self, name: &str) -> Option<SymbolHandle> {
        self.syntax_trees
            .values()
            .flat_map(|tree| tree.declarations().iter())
            .find(|declared| &***declared == name)
            .map(|declared| SymbolHandle {
                origin: SymbolOrigin::Unit(self.id),
                name: Arc::clone(declared),
            })
    }

    /// Handles for every name declared in this unit's source
    #[must_use]
    pub fn symbols(&self) -> Vec<SymbolHandle> {
        self.syntax_trees
            .values()
            .flat_map(|tree| tree.declarations().iter())
            .map(|declared| SymbolHandle {
                origin: SymbolOrigin::Unit(self.id),
                name: Arc::clone(declared),
            })
            .collect()
    }

    /// Whether `symbol` belongs to this unit or, unless `primary_only`, to
    /// anything it references
    #[must_use]
    pub fn contains(&self, symbol: &SymbolHandle, primary_only: bool) -> Containment {
        match symbol.origin {
            SymbolOrigin::Dynamic => return Containment::PRIMARY,
            SymbolOrigin::Unit(id) if id == self.id => return Containment::PRIMARY,
            _ if primary_only => return Containment::NO,
            _ => {}
        }
        if let SymbolOrigin::Metadata(content) = symbol.origin {
            if self.metadata.iter().any(|m| m.content == content) {
                return Containment::through(ReferencedThrough::Metadata(content));
            }
        }
        self.references
            .iter()
            .find(|(_, unit)| unit.reaches(symbol.origin))
            .map_or(Containment::NO, |(project, _)| {
                Containment::through(ReferencedThrough::Project(*project))
            })
    }

    fn reaches(&self, origin: SymbolOrigin) -> bool {
        let own = match origin {
            SymbolOrigin::Unit(id) => id == self.id,
            SymbolOrigin::Metadata(content) => self.metadata.iter().any(|m| m.content == content),
            SymbolOrigin::Dynamic => true,
        };
        own || self.references.iter().any(|(_, unit)| unit.reaches(origin))
    }
}
