//! Testing utilities for the snapsync workspace
//!
//! Shared fixtures, a recording remote host and a toy syntax provider.

#![allow(missing_docs)]

use async_trait::async_trait;
use parking_lot::Mutex;
use snapsync_checksum::{DocumentId, ProjectId, TextDelta};
use snapsync_compilation::{CompiledUnitCache, ParseFailure, SyntaxProvider, SyntaxTree};
use snapsync_engine::{RemoteError, RemoteHost, SnapshotRef};
use snapsync_workspace::{
    DocumentAttributes, DocumentState, OptionSet, ProjectAttributes, ProjectReference, ProjectState, Snapshot,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Text that makes [`WordSyntaxProvider`] fail
pub const PARSE_ERROR_MARKER: &str = "<<parse-error>>";

/// Text that makes [`WordSyntaxProvider`] panic mid-build
pub const PANIC_MARKER: &str = "<<panic>>";

pub fn project_id(n: u128) -> ProjectId {
    ProjectId::from_raw(n)
}

pub fn document_id(project: u128, n: u128) -> DocumentId {
    DocumentId::from_raw(project_id(project), n)
}

pub fn document(project: u128, n: u128, text: &str) -> DocumentState {
    DocumentState::new(
        DocumentAttributes::new(document_id(project, n), format!("src/d{n}.rs")),
        text,
    )
}

/// One project in a [`build_snapshot`] layout
#[derive(Debug, Clone, Copy)]
pub struct ProjectSpec<'a> {
    pub id: u128,
    pub references: &'a [u128],
    pub documents: &'a [(u128, &'a str)],
}

/// Snapshot with the given projects, added in order
///
/// Panics on an invalid layout.
pub fn build_snapshot(projects: &[ProjectSpec<'_>]) -> Snapshot {
    let mut snapshot = Snapshot::empty();
    for spec in projects {
        let mut attributes = ProjectAttributes::new(project_id(spec.id), format!("p{}", spec.id), "rust");
        for reference in spec.references {
            attributes = attributes.with_project_reference(ProjectReference::to(project_id(*reference)));
        }
        snapshot = snapshot.add_project(ProjectState::new(attributes)).unwrap();
        for (n, text) in spec.documents {
            snapshot = snapshot.add_document(document(spec.id, *n, text)).unwrap();
        }
    }
    snapshot
}

/// Project 1 with one document
pub fn single_document_snapshot(text: &str) -> (Snapshot, DocumentId) {
    let snapshot = build_snapshot(&[ProjectSpec {
        id: 1,
        references: &[],
        documents: &[(1, text)],
    }]);
    (snapshot, document_id(1, 1))
}

pub fn small_cache() -> CompiledUnitCache {
    CompiledUnitCache::new(64)
}

/// Declares every identifier following `fn`
///
/// Fails on [`PARSE_ERROR_MARKER`] and panics on [`PANIC_MARKER`].
#[derive(Debug, Default)]
pub struct WordSyntaxProvider {
    parses: AtomicUsize,
    reparses: AtomicUsize,
}

impl WordSyntaxProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn parse_count(&self) -> usize {
        self.parses.load(Ordering::SeqCst)
    }

    pub fn reparse_count(&self) -> usize {
        self.reparses.load(Ordering::SeqCst)
    }

    fn tree(document: &DocumentState, text: &str) -> Result<SyntaxTree, ParseFailure> {
        assert!(!text.contains(PANIC_MARKER), "parser crashed on {}", document.attributes().path);
        if text.contains(PARSE_ERROR_MARKER) {
            return Err(ParseFailure(format!("unexpected token in {}", document.attributes().path)));
        }
        let mut declarations = Vec::new();
        let mut words = text.split_whitespace();
        while let Some(word) = words.next() {
            if word != "fn" {
                continue;
            }
            let name: String = words
                .next()
                .unwrap_or_default()
                .chars()
                .take_while(|c| c.is_alphanumeric() || *c == '_')
                .collect();
            if !name.is_empty() {
                declarations.push(Arc::from(name));
            }
        }
        Ok(SyntaxTree::new(document.id(), document.text_checksum(), declarations))
    }
}

impl SyntaxProvider for WordSyntaxProvider {
    fn parse(&self, document: &DocumentState, text: &str, _options: &OptionSet) -> Result<SyntaxTree, ParseFailure> {
        self.parses.fetch_add(1, Ordering::SeqCst);
        Self::tree(document, text)
    }

    fn reparse(
        &self,
        _previous: &SyntaxTree,
        document: &DocumentState,
        text: &str,
        _options: &OptionSet,
    ) -> Result<SyntaxTree, ParseFailure> {
        self.reparses.fetch_add(1, Ordering::SeqCst);
        Self::tree(document, text)
    }
}

/// One call received by [`RecordingRemoteHost`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    Snapshot(SnapshotRef),
    ActiveDocument(Option<DocumentId>),
    TextDelta(TextDelta),
}

/// Remote host that records every call
#[derive(Debug, Default)]
pub struct RecordingRemoteHost {
    calls: Mutex<Vec<RemoteCall>>,
    failure: Mutex<Option<RemoteError>>,
}

impl RecordingRemoteHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make every following call fail with `error`, or succeed again on `None`
    pub fn fail_with(&self, error: Option<RemoteError>) {
        *self.failure.lock() = error;
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.calls.lock().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }

    pub fn snapshots(&self) -> Vec<SnapshotRef> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                RemoteCall::Snapshot(snapshot) => Some(*snapshot),
                _ => None,
            })
            .collect()
    }

    pub fn active_documents(&self) -> Vec<Option<DocumentId>> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                RemoteCall::ActiveDocument(document) => Some(*document),
                _ => None,
            })
            .collect()
    }

    pub fn text_deltas(&self) -> Vec<TextDelta> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                RemoteCall::TextDelta(delta) => Some(delta.clone()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: RemoteCall) -> Result<(), RemoteError> {
        if let Some(error) = self.failure.lock().clone() {
            return Err(error);
        }
        self.calls.lock().push(call);
        Ok(())
    }
}

#[async_trait]
impl RemoteHost for RecordingRemoteHost {
    async fn synchronize_primary_snapshot(
        &self,
        snapshot: SnapshotRef,
        _cancel: &CancellationToken,
    ) -> Result<(), RemoteError> {
        self.record(RemoteCall::Snapshot(snapshot))
    }

    async fn synchronize_active_document(
        &self,
        document: Option<DocumentId>,
        _cancel: &CancellationToken,
    ) -> Result<(), RemoteError> {
        self.record(RemoteCall::ActiveDocument(document))
    }

    async fn synchronize_text_delta(&self, delta: TextDelta, _cancel: &CancellationToken) -> Result<(), RemoteError> {
        self.record(RemoteCall::TextDelta(delta))
    }
}
