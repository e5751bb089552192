//! Snapshots the remote host may still pull from
//!
//! Every advertised snapshot is pinned here by checksum. A pin is counted:
//! the engine holds one for the latest advertisement, and a pull in progress
//! can hold another so the snapshot outlives the next advertisement.

use crate::error::SyncError;
use dashmap::DashMap;
use snapsync_checksum::{AssetPath, Checksum};
use snapsync_workspace::{Asset, ChecksumSet, Snapshot};
use std::fmt;
use std::sync::Arc;

struct PinnedSnapshot {
    snapshot: Arc<Snapshot>,
    pins: usize,
}

/// Pinned snapshots by root checksum
///
/// Clones share the registry.
#[derive(Clone, Default)]
pub struct AssetRegistry {
    pinned: Arc<DashMap<Checksum, PinnedSnapshot>>,
}

impl fmt::Debug for AssetRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssetRegistry")
            .field("pinned", &self.pinned.len())
            .finish()
    }
}

impl AssetRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin `snapshot` under its checksum
    pub fn pin(&self, snapshot: Arc<Snapshot>) -> SnapshotPin {
        let checksum = snapshot.checksum();
        self.pinned
            .entry(checksum)
            .and_modify(|entry| entry.pins += 1)
            .or_insert_with(|| PinnedSnapshot { snapshot, pins: 1 });
        SnapshotPin {
            checksum,
            registry: self.clone(),
        }
    }

    /// Extra pin on an already pinned snapshot
    #[must_use]
    pub fn acquire(&self, checksum: Checksum) -> Option<SnapshotPin> {
        let mut entry = self.pinned.get_mut(&checksum)?;
        entry.pins += 1;
        Some(SnapshotPin {
            checksum,
            registry: self.clone(),
        })
    }

    /// Pinned snapshot by checksum
    #[must_use]
    pub fn snapshot(&self, checksum: Checksum) -> Option<Arc<Snapshot>> {
        self.pinned
            .get(&checksum)
            .map(|entry| Arc::clone(&entry.snapshot))
    }

    /// Scoped checksums inside a pinned snapshot
    ///
    /// # Errors
    /// [`SyncError::UnknownSnapshot`] if nothing is pinned under `root`;
    /// [`SyncError::Workspace`] if `path` names an absent identity
    pub fn find_checksums(&self, root: Checksum, path: &AssetPath) -> Result<ChecksumSet, SyncError> {
        let snapshot = self.snapshot(root).ok_or(SyncError::UnknownSnapshot(root))?;
        Ok(snapshot.find_checksums(path)?)
    }

    /// Scoped assets inside a pinned snapshot
    ///
    /// # Errors
    /// Same as [`find_checksums`](Self::find_checksums)
    pub fn find_assets(
        &self,
        root: Checksum,
        path: &AssetPath,
        wanted: &[Checksum],
    ) -> Result<Vec<(Checksum, Asset)>, SyncError> {
        let snapshot = self.snapshot(root).ok_or(SyncError::UnknownSnapshot(root))?;
        Ok(snapshot.find_assets(path, wanted)?)
    }

    /// Number of pinned snapshots
    #[must_use]
    pub fn len(&self) -> usize {
        self.pinned.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pinned.is_empty()
    }

    fn release(&self, checksum: Checksum) {
        self.pinned.remove_if_mut(&checksum, |_, entry| {
            entry.pins -= 1;
            entry.pins == 0
        });
    }
}

/// Keeps one snapshot pullable until dropped
#[must_use = "dropping the pin releases the snapshot"]
pub struct SnapshotPin {
    checksum: Checksum,
    registry: AssetRegistry,
}

impl SnapshotPin {
    #[must_use]
    pub fn checksum(&self) -> Checksum {
        self.checksum
    }
}

impl fmt::Debug for SnapshotPin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SnapshotPin").field(&self.checksum).finish()
    }
}

impl Drop for SnapshotPin {
    fn drop(&mut self) {
        self.registry.release(self.checksum);
    }
}
