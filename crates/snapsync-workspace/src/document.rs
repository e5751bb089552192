//! Document nodes
//!
//! A [`DocumentState`] is the leaf of the workspace tree: attributes plus
//! text. Its checksums are computed at most once per instance.

use crate::error::TextLoadError;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use snapsync_checksum::{Checksum, ChecksumWriter, DocumentId};
use std::fmt::Debug;
use std::sync::Arc;

/// Encoding the document was read with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TextEncoding {
    #[default]
    Utf8,
    Utf8Bom,
    Utf16Le,
}

impl TextEncoding {
    fn tag(self) -> &'static str {
        match self {
            Self::Utf8 => "utf8",
            Self::Utf8Bom => "utf8-bom",
            Self::Utf16Le => "utf16le",
        }
    }
}

/// Role of the document inside its project
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DocumentKind {
    /// Compiled source
    #[default]
    Source,
    /// Non-source file visible to analyzers
    Additional,
    /// Analyzer configuration
    Config,
}

impl DocumentKind {
    fn tag(self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Additional => "additional",
            Self::Config => "config",
        }
    }
}

/// Everything about a document except its text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentAttributes {
    pub id: DocumentId,
    pub path: Arc<str>,
    pub encoding: TextEncoding,
    pub kind: DocumentKind,
}

impl DocumentAttributes {
    /// Source document with default encoding
    #[must_use]
    pub fn new(id: DocumentId, path: impl Into<Arc<str>>) -> Self {
        Self {
            id,
            path: path.into(),
            encoding: TextEncoding::default(),
            kind: DocumentKind::default(),
        }
    }

    /// Set the encoding
    #[must_use]
    pub fn with_encoding(mut self, encoding: TextEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Set the kind
    #[must_use]
    pub fn with_kind(mut self, kind: DocumentKind) -> Self {
        self.kind = kind;
        self
    }

    /// Checksum of the attributes alone
    #[must_use]
    pub fn checksum(&self) -> Checksum {
        let mut writer = ChecksumWriter::new("document-attributes");
        writer
            .write_id(self.id.to_bytes())
            .write_str(&self.path)
            .write_str(self.encoding.tag())
            .write_str(self.kind.tag());
        writer.finish()
    }
}

/// Produces a document's text on first access
pub trait TextLoader: Send + Sync + Debug {
    /// Load the full text
    ///
    /// # Errors
    /// Returns [`TextLoadError`] when the text cannot be produced
    fn load(&self) -> Result<Arc<str>, TextLoadError>;
}

#[derive(Debug, Clone)]
enum TextSource {
    Loaded(Arc<str>),
    Deferred(Arc<dyn TextLoader>),
}

/// Immutable document node
///
/// Cloning a `DocumentState` is never needed; nodes are shared through `Arc`
/// and replaced wholesale by forks.
#[derive(Debug)]
pub struct DocumentState {
    attributes: DocumentAttributes,
    source: TextSource,
    text: OnceCell<Result<Arc<str>, TextLoadError>>,
    attributes_checksum: OnceCell<Checksum>,
    text_checksum: OnceCell<Checksum>,
    checksum: OnceCell<Checksum>,
}

impl DocumentState {
    /// Document with text already in memory
    #[must_use]
    pub fn new(attributes: DocumentAttributes, text: impl Into<Arc<str>>) -> Self {
        Self::from_source(attributes, TextSource::Loaded(text.into()))
    }

    /// Document whose text is produced by `loader` on first access
    #[must_use]
    pub fn deferred(attributes: DocumentAttributes, loader: Arc<dyn TextLoader>) -> Self {
        Self::from_source(attributes, TextSource::Deferred(loader))
    }

    fn from_source(attributes: DocumentAttributes, source: TextSource) -> Self {
        Self {
            attributes,
            source,
            text: OnceCell::new(),
            attributes_checksum: OnceCell::new(),
            text_checksum: OnceCell::new(),
            checksum: OnceCell::new(),
        }
    }

    /// Identity
    #[inline]
    #[must_use]
    pub fn id(&self) -> DocumentId {
        self.attributes.id
    }

    /// Attributes
    #[inline]
    #[must_use]
    pub fn attributes(&self) -> &DocumentAttributes {
        &self.attributes
    }

    /// Text, loading it on first access
    ///
    /// # Errors
    /// Returns the loader's error; the failure is memoized like a success
    pub fn text(&self) -> Result<Arc<str>, TextLoadError> {
        self.text
            .get_or_init(|| match &self.source {
                TextSource::Loaded(text) => Ok(Arc::clone(text)),
                TextSource::Deferred(loader) => {
                    let loaded = loader.load();
                    if let Err(error) = &loaded {
                        tracing::debug!(document = %self.attributes.id, %error, "text load failed");
                    }
                    loaded
                }
            })
            .clone()
    }

    /// Whether the text has been produced (or failed) already
    #[must_use]
    pub fn is_text_loaded(&self) -> bool {
        matches!(self.source, TextSource::Loaded(_)) || self.text.get().is_some()
    }

    /// Same attributes, new text
    #[must_use]
    pub fn with_text(&self, text: impl Into<Arc<str>>) -> Self {
        Self::new(self.attributes.clone(), text)
    }

    /// New attributes, same text source
    ///
    /// Text already loaded is carried over; the text checksum is reused.
    #[must_use]
    pub fn with_attributes(&self, attributes: DocumentAttributes) -> Self {
        let next = Self::from_source(attributes, self.source.clone());
        if let Some(text) = self.text.get() {
            let _ = next.text.set(text.clone());
        }
        if let Some(checksum) = self.text_checksum.get() {
            let _ = next.text_checksum.set(*checksum);
        }
        next
    }

    /// Memoized checksum of the attributes
    #[must_use]
    pub fn attributes_checksum(&self) -> Checksum {
        *self
            .attributes_checksum
            .get_or_init(|| self.attributes.checksum())
    }

    /// Memoized checksum of the text
    ///
    /// A failed load hashes the failure, so the document still has a stable
    /// checksum and changes once the text becomes loadable.
    #[must_use]
    pub fn text_checksum(&self) -> Checksum {
        *self.text_checksum.get_or_init(|| match self.text() {
            Ok(text) => Checksum::of_text(&text),
            Err(error) => {
                let mut writer = ChecksumWriter::new("text-load-failure");
                writer.write_str(&error.message);
                writer.finish()
            }
        })
    }

    /// Memoized checksum of the whole document
    #[must_use]
    pub fn checksum(&self) -> Checksum {
        *self.checksum.get_or_init(|| {
            let mut writer = ChecksumWriter::new("document");
            writer
                .write_checksum(&self.attributes_checksum())
                .write_checksum(&self.text_checksum());
            writer.finish()
        })
    }

    /// Whether [`checksum`](Self::checksum) has been computed on this instance
    #[must_use]
    pub fn is_checksum_computed(&self) -> bool {
        self.checksum.get().is_some()
    }

    /// Whether [`text_checksum`](Self::text_checksum) has been computed on this instance
    #[must_use]
    pub fn is_text_checksum_computed(&self) -> bool {
        self.text_checksum.get().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use snapsync_checksum::ProjectId;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn attrs(n: u128) -> DocumentAttributes {
        DocumentAttributes::new(
            DocumentId::from_raw(ProjectId::from_raw(1), n),
            format!("src/file{n}.rs"),
        )
    }

    #[derive(Debug, Default)]
    struct CountingLoader {
        calls: AtomicUsize,
        fail: bool,
    }

    impl TextLoader for CountingLoader {
        fn load(&self) -> Result<Arc<str>, TextLoadError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(TextLoadError::new("src/file1.rs", "permission denied"))
            } else {
                Ok(Arc::from("loaded text"))
            }
        }
    }

    #[test]
    fn checksum_is_idempotent_and_memoized() {
        let doc = DocumentState::new(attrs(1), "abc");
        assert!(!doc.is_checksum_computed());
        let first = doc.checksum();
        assert!(doc.is_checksum_computed());
        assert_eq!(first, doc.checksum());
    }

    #[test]
    fn equal_content_gives_equal_checksum() {
        let a = DocumentState::new(attrs(1), "abc");
        let b = DocumentState::new(attrs(1), String::from("abc"));
        assert_eq!(a.checksum(), b.checksum());
    }

    #[test]
    fn text_and_attributes_both_matter() {
        let base = DocumentState::new(attrs(1), "abc");
        assert_ne!(base.checksum(), base.with_text("abd").checksum());
        let moved = base.with_attributes(attrs(1).with_kind(DocumentKind::Additional));
        assert_ne!(base.checksum(), moved.checksum());
        assert_eq!(base.text_checksum(), moved.text_checksum());
    }

    #[test]
    fn text_checksum_does_not_force_full_checksum() {
        let doc = DocumentState::new(attrs(1), "abc");
        assert_eq!(doc.text_checksum(), Checksum::of_text("abc"));
        assert!(!doc.is_checksum_computed());
    }

    #[test]
    fn deferred_text_loads_once() {
        let loader = Arc::new(CountingLoader::default());
        let doc = DocumentState::deferred(attrs(1), loader.clone());
        assert!(!doc.is_text_loaded());
        assert_eq!(&*doc.text().unwrap(), "loaded text");
        let _ = doc.checksum();
        assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
        assert_eq!(doc.text_checksum(), Checksum::of_text("loaded text"));
    }

    #[test]
    fn failed_load_still_has_stable_checksum() {
        let loader = Arc::new(CountingLoader {
            fail: true,
            ..CountingLoader::default()
        });
        let doc = DocumentState::deferred(attrs(1), loader.clone());
        assert!(doc.text().is_err());
        assert_eq!(doc.checksum(), doc.checksum());
        assert_ne!(doc.text_checksum(), Checksum::of_text(""));
        assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
    }
}
