//! snapsync workspace model
//!
//! An immutable, content-addressed tree of the codebase being edited.
//!
//! # Core Concepts
//!
//! - [`Snapshot`]: versioned root; forks share every untouched subtree
//! - [`ProjectState`]: project attributes plus identity-ordered documents
//! - [`DocumentState`]: attributes plus eagerly or lazily loaded text
//! - Scoped queries: [`Snapshot::find_checksums`] and [`Snapshot::find_assets`]
//!   visit only what an [`AssetPath`](snapsync_checksum::AssetPath) selects
//! - [`Workspace`]: the current snapshot plus change notifications
//!
//! # Example
//!
//! ```rust
//! use snapsync_checksum::{AssetPath, DocumentId, ProjectId};
//! use snapsync_workspace::{DocumentAttributes, DocumentState, ProjectAttributes, ProjectState, Snapshot};
//!
//! let project = ProjectId::from_raw(1);
//! let document = DocumentId::from_raw(project, 1);
//! let snapshot = Snapshot::empty()
//!     .add_project(ProjectState::new(ProjectAttributes::new(project, "core", "rust")))
//!     .and_then(|s| s.add_document(DocumentState::new(DocumentAttributes::new(document, "lib.rs"), "")))
//!     .unwrap();
//!
//! let edited = snapshot.with_document_text(document, "fn main() {}").unwrap();
//! assert_ne!(snapshot.checksum(), edited.checksum());
//!
//! let text = edited.find_checksums(&AssetPath::document_text(document)).unwrap();
//! assert_eq!(text.len(), 1);
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod assets;
mod document;
mod error;
mod project;
mod snapshot;
mod subscription;
mod workspace;

pub use assets::{Asset, AssetKey, ChecksumSet};
pub use document::{DocumentAttributes, DocumentKind, DocumentState, TextEncoding, TextLoader};
pub use error::{TextLoadError, WorkspaceError};
pub use project::{
    MetadataKind, MetadataReference, OptionSet, ProjectAttributes, ProjectReference, ProjectState,
};
pub use snapshot::{Snapshot, SnapshotVersion};
pub use subscription::{EventSource, Subscription};
pub use workspace::{Workspace, WorkspaceChange, WorkspaceChangeKind};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod integration_tests {
    use super::*;
    use proptest::prelude::*;
    use snapsync_checksum::{DocumentId, ProjectId};

    fn build(order: &[(u128, u128, String)]) -> Snapshot {
        let mut snapshot = Snapshot::empty();
        for (p, d, text) in order {
            let project = ProjectId::from_raw(*p);
            if snapshot.project(project).is_none() {
                snapshot = snapshot
                    .add_project(ProjectState::new(ProjectAttributes::new(project, format!("p{p}"), "rust")))
                    .unwrap();
            }
            let id = DocumentId::from_raw(project, *d);
            snapshot = snapshot
                .add_document(DocumentState::new(DocumentAttributes::new(id, format!("{d}.rs")), text.as_str()))
                .unwrap();
        }
        snapshot
    }

    fn orderings() -> impl Strategy<Value = (Vec<(u128, u128, String)>, Vec<(u128, u128, String)>)> {
        proptest::collection::btree_map((1u128..4, 1u128..6), "[a-z ]{0,12}", 1..10)
            .prop_map(|m| m.into_iter().map(|((p, d), text)| (p, d, text)).collect::<Vec<_>>())
            .prop_flat_map(|items| (Just(items.clone()), Just(items).prop_shuffle()))
    }

    proptest! {
        #[test]
        fn construction_order_never_changes_checksum((items, shuffled) in orderings()) {
            let a = build(&items);
            let b = build(&shuffled);
            prop_assert_eq!(a.checksum(), b.checksum());
            for project in a.projects() {
                prop_assert_eq!(project.checksum(), b.project(project.id()).unwrap().checksum());
            }
        }
    }
}
