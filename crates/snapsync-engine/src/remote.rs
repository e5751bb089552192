//! Remote analysis host boundary

use crate::error::RemoteError;
use async_trait::async_trait;
use parking_lot::RwLock;
use snapsync_checksum::{Checksum, DocumentId, TextDelta};
use snapsync_workspace::{Snapshot, SnapshotVersion};
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// What the remote host is told about a snapshot
///
/// The host pulls whatever subtrees it is missing through scoped asset
/// queries against `checksum`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SnapshotRef {
    pub checksum: Checksum,
    pub version: SnapshotVersion,
}

impl SnapshotRef {
    /// Reference to `snapshot`, hashing it if needed
    #[must_use]
    pub fn of(snapshot: &Snapshot) -> Self {
        Self {
            checksum: snapshot.checksum(),
            version: snapshot.version(),
        }
    }
}

impl fmt::Display for SnapshotRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.checksum.short(), self.version)
    }
}

/// Best-effort calls the engine makes against a remote host
///
/// Implementations should honour `cancel`; the engine also stops waiting
/// on its own once the token fires.
#[async_trait]
pub trait RemoteHost: Send + Sync + fmt::Debug {
    /// Advertise the current snapshot
    async fn synchronize_primary_snapshot(
        &self,
        snapshot: SnapshotRef,
        cancel: &CancellationToken,
    ) -> Result<(), RemoteError>;

    /// Report the focused document, if any
    async fn synchronize_active_document(
        &self,
        document: Option<DocumentId>,
        cancel: &CancellationToken,
    ) -> Result<(), RemoteError>;

    /// Ship an incremental text edit
    async fn synchronize_text_delta(
        &self,
        delta: TextDelta,
        cancel: &CancellationToken,
    ) -> Result<(), RemoteError>;
}

/// Swappable slot for the currently connected host
///
/// Clones share the slot.
#[derive(Clone, Default)]
pub struct RemoteConnection {
    host: Arc<RwLock<Option<Arc<dyn RemoteHost>>>>,
}

impl fmt::Debug for RemoteConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteConnection")
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl RemoteConnection {
    /// Empty slot
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot already holding `host`
    #[must_use]
    pub fn connected(host: Arc<dyn RemoteHost>) -> Self {
        let connection = Self::new();
        connection.connect(host);
        connection
    }

    /// Install `host`, returning the previous one
    pub fn connect(&self, host: Arc<dyn RemoteHost>) -> Option<Arc<dyn RemoteHost>> {
        tracing::debug!("remote host connected");
        self.host.write().replace(host)
    }

    /// Empty the slot, returning the previous host
    pub fn disconnect(&self) -> Option<Arc<dyn RemoteHost>> {
        let previous = self.host.write().take();
        if previous.is_some() {
            tracing::debug!("remote host disconnected");
        }
        previous
    }

    /// Currently connected host
    #[must_use]
    pub fn host(&self) -> Option<Arc<dyn RemoteHost>> {
        self.host.read().clone()
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.host.read().is_some()
    }
}
