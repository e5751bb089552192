//! snapsync synchronization engine
//!
//! Keeps a remote analysis host's view of a [`Workspace`](snapsync_workspace::Workspace)
//! current with as little traffic as possible.
//!
//! # Core Concepts
//!
//! - [`SyncEngine`]: subscribes to workspace, focus and global-operation
//!   events and drives three debounced queues
//! - [`BatchingQueue`]: debounced, single-flight, cancellable batches
//! - [`RemoteHost`] / [`RemoteConnection`]: best-effort calls to whatever
//!   host is currently connected
//! - [`AssetRegistry`]: advertised snapshots the host can still pull from
//! - [`GlobalOperationNotifier`]: pauses snapshot and focus traffic while an
//!   expensive host operation runs; text deltas keep flowing
//!
//! # Example
//!
//! ```rust,no_run
//! use snapsync_engine::{ActiveDocumentTracker, GlobalOperationNotifier, RemoteConnection, SyncConfig, SyncEngine};
//! use snapsync_workspace::Workspace;
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), snapsync_engine::SyncError> {
//! let workspace = Arc::new(Workspace::default());
//! let operations = GlobalOperationNotifier::new();
//! let engine = SyncEngine::start(
//!     &SyncConfig::default(),
//!     Arc::clone(&workspace),
//!     &operations,
//!     ActiveDocumentTracker::new(),
//!     RemoteConnection::new(),
//! )?;
//!
//! let bulk_load = operations.start("bulk load");
//! // ... many workspace edits, no snapshot traffic ...
//! bulk_load.done();
//!
//! engine.shutdown();
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod assets;
mod config;
mod engine;
mod error;
mod notify;
mod queue;
mod remote;

pub use assets::{AssetRegistry, SnapshotPin};
pub use config::SyncConfig;
pub use engine::{SyncEngine, SyncStats};
pub use error::{ConfigError, RemoteError, SyncError};
pub use notify::{ActiveDocumentTracker, GlobalOperation, GlobalOperationEvent, GlobalOperationNotifier};
pub use queue::{BatchProcessor, BatchingQueue};
pub use remote::{RemoteConnection, RemoteHost, SnapshotRef};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
