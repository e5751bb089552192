//! snapsync compilation tracking
//!
//! Derived semantic artifacts per project, rebuilt lazily and incrementally.
//!
//! # Core Concepts
//!
//! - [`CompilationTracker`]: lazily built unit of one project version;
//!   single-flight builds, partial freezing, symbol containment
//! - [`CompilationState`]: a snapshot plus one tracker per project, forked
//!   alongside the workspace
//! - [`CompiledUnit`]: the artifact itself, keyed by its dependent checksum
//! - [`CompiledUnitCache`]: reuse of finished units across snapshots
//! - [`SyntaxProvider`]: host-supplied parsing
//!
//! A tracker never fails a build: unreadable texts, parse failures and
//! dangling references are recorded on the unit and reported through
//! [`CompilationTracker::has_successfully_loaded`].

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod cache;
mod error;
mod provider;
mod state;
mod tracker;
mod unit;

pub use cache::CompiledUnitCache;
pub use error::{CompilationError, ParseFailure};
pub use provider::SyntaxProvider;
pub use state::CompilationState;
pub use tracker::{CompilationTracker, EditKind, TrackerStatus};
pub use unit::{
    CompiledUnit, Containment, LoadFailure, ReferencedThrough, SymbolHandle, SymbolOrigin,
    SyntaxTree, UnitId,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
