#![allow(dead_code)]

use snapsync_engine::{
    ActiveDocumentTracker, GlobalOperationNotifier, RemoteConnection, RemoteHost, SyncConfig, SyncEngine,
};
use snapsync_test_utils::RecordingRemoteHost;
use snapsync_workspace::{Snapshot, Workspace};
use std::sync::Arc;
use std::time::Duration;

pub struct Harness {
    pub workspace: Arc<Workspace>,
    pub operations: GlobalOperationNotifier,
    pub focus: ActiveDocumentTracker,
    pub host: Arc<RecordingRemoteHost>,
    pub remote: RemoteConnection,
    pub engine: SyncEngine,
}

impl Harness {
    /// Engine with a connected recording host, initial flushes already drained
    pub async fn started(snapshot: Snapshot) -> Self {
        let host = RecordingRemoteHost::new();
        let remote = RemoteConnection::connected(Arc::clone(&host) as Arc<dyn RemoteHost>);
        let harness = Self::with_remote(snapshot, remote, host).await;
        harness.host.clear();
        harness
    }

    pub async fn disconnected(snapshot: Snapshot) -> Self {
        Self::with_remote(snapshot, RemoteConnection::new(), RecordingRemoteHost::new()).await
    }

    async fn with_remote(snapshot: Snapshot, remote: RemoteConnection, host: Arc<RecordingRemoteHost>) -> Self {
        let workspace = Arc::new(Workspace::new(snapshot));
        let operations = GlobalOperationNotifier::new();
        let focus = ActiveDocumentTracker::new();
        let engine = SyncEngine::start(
            &SyncConfig::default(),
            Arc::clone(&workspace),
            &operations,
            focus.clone(),
            remote.clone(),
        )
        .unwrap();
        settle().await;
        Self {
            workspace,
            operations,
            focus,
            host,
            remote,
            engine,
        }
    }
}

/// Long enough for every debounce interval to elapse
pub async fn settle() {
    tokio::time::sleep(Duration::from_secs(1)).await;
}
