//! Project nodes
//!
//! A [`ProjectState`] owns its attributes and a persistent, identity-ordered
//! map of documents. Forking a project copies O(log n) map nodes; every
//! untouched [`DocumentState`] is shared with the previous version.

use crate::document::DocumentState;
use im::OrdMap;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use snapsync_checksum::{Checksum, ChecksumMerkleTree, ChecksumWriter, DocumentId, ProjectId};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Key/value options. Ordered by key, so insertion order never matters.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OptionSet(BTreeMap<Arc<str>, Arc<str>>);

impl OptionSet {
    /// Empty set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set one option
    #[must_use]
    pub fn with(mut self, key: impl Into<Arc<str>>, value: impl Into<Arc<str>>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Look up an option
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(AsRef::as_ref)
    }

    fn write_to(&self, writer: &mut ChecksumWriter) {
        writer.write_u64(self.0.len() as u64);
        for (key, value) in &self.0 {
            writer.write_str(key).write_str(value);
        }
    }
}

/// Reference from one project to another; order is significant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectReference {
    pub project: ProjectId,
    pub alias: Option<Arc<str>>,
}

impl ProjectReference {
    /// Plain reference
    #[must_use]
    pub fn to(project: ProjectId) -> Self {
        Self {
            project,
            alias: None,
        }
    }
}

/// Kind of a prebuilt reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetadataKind {
    /// Compiled library
    Library,
    /// Analyzer plugin
    Analyzer,
}

/// Prebuilt input identified by its content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataReference {
    pub kind: MetadataKind,
    pub display: Arc<str>,
    pub content: Checksum,
}

impl MetadataReference {
    /// Library reference
    #[must_use]
    pub fn library(display: impl Into<Arc<str>>, content: Checksum) -> Self {
        Self {
            kind: MetadataKind::Library,
            display: display.into(),
            content,
        }
    }

    /// Analyzer reference
    #[must_use]
    pub fn analyzer(display: impl Into<Arc<str>>, content: Checksum) -> Self {
        Self {
            kind: MetadataKind::Analyzer,
            display: display.into(),
            content,
        }
    }
}

/// Everything about a project except its documents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectAttributes {
    pub id: ProjectId,
    pub name: Arc<str>,
    pub language: Arc<str>,
    pub compilation_options: OptionSet,
    pub parse_options: OptionSet,
    pub project_references: Vec<ProjectReference>,
    pub metadata_references: Vec<MetadataReference>,
}

impl ProjectAttributes {
    /// Project with no options or references
    #[must_use]
    pub fn new(id: ProjectId, name: impl Into<Arc<str>>, language: impl Into<Arc<str>>) -> Self {
        Self {
            id,
            name: name.into(),
            language: language.into(),
            compilation_options: OptionSet::new(),
            parse_options: OptionSet::new(),
            project_references: Vec::new(),
            metadata_references: Vec::new(),
        }
    }

    /// Replace compilation options
    #[must_use]
    pub fn with_compilation_options(mut self, options: OptionSet) -> Self {
        self.compilation_options = options;
        self
    }

    /// Replace parse options
    #[must_use]
    pub fn with_parse_options(mut self, options: OptionSet) -> Self {
        self.parse_options = options;
        self
    }

    /// Append a project reference
    #[must_use]
    pub fn with_project_reference(mut self, reference: ProjectReference) -> Self {
        self.project_references.push(reference);
        self
    }

    /// Append a metadata reference
    #[must_use]
    pub fn with_metadata_reference(mut self, reference: MetadataReference) -> Self {
        self.metadata_references.push(reference);
        self
    }

    /// Checksum of the attributes alone
    ///
    /// Project references are hashed in order; metadata references as a set.
    #[must_use]
    pub fn checksum(&self) -> Checksum {
        let mut writer = ChecksumWriter::new("project-attributes");
        writer
            .write_id(self.id.to_bytes())
            .write_str(&self.name)
            .write_str(&self.language);
        self.compilation_options.write_to(&mut writer);
        self.parse_options.write_to(&mut writer);

        writer.write_u64(self.project_references.len() as u64);
        for reference in &self.project_references {
            writer
                .write_id(reference.project.to_bytes())
                .write_opt_str(reference.alias.as_deref());
        }

        let mut metadata: Vec<&MetadataReference> = self.metadata_references.iter().collect();
        metadata.sort_by(|a, b| {
            (a.content, a.kind as u8, &a.display).cmp(&(b.content, b.kind as u8, &b.display))
        });
        writer.write_u64(metadata.len() as u64);
        for reference in metadata {
            writer
                .write_bool(reference.kind == MetadataKind::Analyzer)
                .write_str(&reference.display)
                .write_checksum(&reference.content);
        }
        writer.finish()
    }
}

/// Immutable project node
#[derive(Debug)]
pub struct ProjectState {
    attributes: Arc<ProjectAttributes>,
    documents: OrdMap<DocumentId, Arc<DocumentState>>,
    attributes_checksum: OnceCell<Checksum>,
    documents_checksum: OnceCell<Checksum>,
    checksum: OnceCell<Checksum>,
}

impl ProjectState {
    /// Project with no documents
    #[must_use]
    pub fn new(attributes: ProjectAttributes) -> Self {
        Self::from_parts(Arc::new(attributes), OrdMap::new())
    }

    fn from_parts(
        attributes: Arc<ProjectAttributes>,
        documents: OrdMap<DocumentId, Arc<DocumentState>>,
    ) -> Self {
        Self {
            attributes,
            documents,
            attributes_checksum: OnceCell::new(),
            documents_checksum: OnceCell::new(),
            checksum: OnceCell::new(),
        }
    }

    /// Identity
    #[inline]
    #[must_use]
    pub fn id(&self) -> ProjectId {
        self.attributes.id
    }

    /// Attributes
    #[inline]
    #[must_use]
    pub fn attributes(&self) -> &ProjectAttributes {
        &self.attributes
    }

    /// Documents in identity order
    pub fn documents(&self) -> impl Iterator<Item = &Arc<DocumentState>> + '_ {
        self.documents.values()
    }

    /// Document by identity
    #[must_use]
    pub fn document(&self, id: DocumentId) -> Option<&Arc<DocumentState>> {
        self.documents.get(&id)
    }

    /// Number of documents
    #[must_use]
    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    /// Fork with `document` added or replaced
    #[must_use]
    pub fn with_document(&self, document: Arc<DocumentState>) -> Self {
        let documents = self.documents.update(document.id(), document);
        let next = Self::from_parts(Arc::clone(&self.attributes), documents);
        next.inherit_attributes_checksum(self);
        next
    }

    /// Fork with `id` removed
    #[must_use]
    pub fn without_document(&self, id: DocumentId) -> Self {
        let documents = self.documents.without(&id);
        let next = Self::from_parts(Arc::clone(&self.attributes), documents);
        next.inherit_attributes_checksum(self);
        next
    }

    /// Fork with new attributes, sharing all documents
    #[must_use]
    pub fn with_attributes(&self, attributes: ProjectAttributes) -> Self {
        let next = Self::from_parts(Arc::new(attributes), self.documents.clone());
        if let Some(checksum) = self.documents_checksum.get() {
            let _ = next.documents_checksum.set(*checksum);
        }
        next
    }

    fn inherit_attributes_checksum(&self, previous: &Self) {
        if let Some(checksum) = previous.attributes_checksum.get() {
            let _ = self.attributes_checksum.set(*checksum);
        }
    }

    /// Memoized checksum of the attributes
    #[must_use]
    pub fn attributes_checksum(&self) -> Checksum {
        *self
            .attributes_checksum
            .get_or_init(|| self.attributes.checksum())
    }

    /// Memoized Merkle root over document checksums in identity order
    #[must_use]
    pub fn documents_checksum(&self) -> Checksum {
        *self.documents_checksum.get_or_init(|| {
            ChecksumMerkleTree::root_of(self.documents.values().map(|d| d.checksum()))
        })
    }

    /// Memoized checksum of the whole project
    #[must_use]
    pub fn checksum(&self) -> Checksum {
        *self.checksum.get_or_init(|| {
            let mut writer = ChecksumWriter::new("project");
            writer
                .write_checksum(&self.attributes_checksum())
                .write_u64(self.documents.len() as u64)
                .write_checksum(&self.documents_checksum());
            writer.finish()
        })
    }

    /// Whether [`checksum`](Self::checksum) has been computed on this instance
    #[must_use]
    pub fn is_checksum_computed(&self) -> bool {
        self.checksum.get().is_some()
    }

    /// Whether any checksum at all has been computed on this instance
    #[must_use]
    pub fn is_any_checksum_computed(&self) -> bool {
        self.checksum.get().is_some()
            || self.documents_checksum.get().is_some()
            || self.attributes_checksum.get().is_some()
    }
}
