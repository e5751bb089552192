//! snapsync checksum primitives
//!
//! Content addressing building blocks shared by every snapsync crate.
//!
//! # Core Concepts
//!
//! - [`Checksum`]: 32-byte BLAKE3 digest identifying tree content
//! - [`ChecksumWriter`]: framed, domain-separated checksum builder
//! - [`ChecksumMerkleTree`]: ordered combination of child checksums
//! - [`AssetPath`]: scope restricting a traversal to part of a snapshot
//! - [`TextDelta`]: positional diff of one document against a baseline
//!
//! # Example
//!
//! ```rust
//! use snapsync_checksum::{Checksum, TextDiff};
//!
//! let diff = TextDiff::compute("fn a() {}", "fn ab() {}");
//! assert_eq!(diff.len(), 1);
//! assert_eq!(diff.apply("fn a() {}").unwrap(), "fn ab() {}");
//! assert_ne!(Checksum::of_text("a"), Checksum::of_text("b"));
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod asset_path;
mod checksum;
mod ids;
mod merkle;
mod text_diff;

pub use asset_path::{AssetPath, AssetPathError, AssetScope};
pub use checksum::{Checksum, ChecksumError, ChecksumWriter};
pub use ids::{DocumentId, ProjectId};
pub use merkle::{Blake3Hasher, ChecksumMerkleTree, InclusionProof};
pub use text_diff::{DiffBudget, TextChange, TextDelta, TextDeltaError, TextDiff};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
