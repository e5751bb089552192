//! The synchronization engine
//!
//! Listens to workspace changes, focus changes and global operations and
//! drives three independent batching queues:
//!
//! | queue           | item                | pausable |
//! |-----------------|---------------------|----------|
//! | text deltas     | one text edit       | no       |
//! | snapshot        | "something changed" | yes      |
//! | active document | "focus changed"     | yes      |
//!
//! Snapshot and active-document flushes read the current state when they
//! run, so any number of notifications between two flushes costs one call.

use crate::assets::{AssetRegistry, SnapshotPin};
use crate::config::SyncConfig;
use crate::error::{RemoteError, SyncError};
use crate::notify::{ActiveDocumentTracker, GlobalOperationEvent, GlobalOperationNotifier};
use crate::queue::{BatchProcessor, BatchingQueue};
use crate::remote::{RemoteConnection, RemoteHost, SnapshotRef};
use futures::FutureExt;
use parking_lot::Mutex;
use serde::Serialize;
use snapsync_checksum::{Checksum, DiffBudget, DocumentId, TextDelta, TextDiff};
use snapsync_workspace::{Snapshot, Subscription, Workspace, WorkspaceChange, WorkspaceChangeKind};
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

/// Counters since the engine started
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    /// Batches flushed by the text-delta queue
    pub text_delta_flushes: u64,
    /// Batches flushed by the snapshot queue
    pub snapshot_flushes: u64,
    /// Batches flushed by the active-document queue
    pub active_document_flushes: u64,
    /// Text deltas delivered
    pub deltas_sent: u64,
    /// Edits not worth a delta (empty or whole-document)
    pub deltas_skipped: u64,
    /// Remote calls that failed for a reason other than absence or cancellation
    pub remote_failures: u64,
}

#[derive(Debug, Default)]
struct Counters {
    deltas_sent: AtomicU64,
    deltas_skipped: AtomicU64,
    remote_failures: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }
}

/// One text edit waiting to be diffed
struct PendingEdit {
    document: DocumentId,
    old: Arc<Snapshot>,
    new: Arc<Snapshot>,
}

struct EngineInner {
    workspace: Arc<Workspace>,
    focus: ActiveDocumentTracker,
    remote: RemoteConnection,
    registry: AssetRegistry,
    counters: Arc<Counters>,
    paused: Mutex<bool>,
    text_deltas: BatchingQueue<PendingEdit>,
    snapshots: BatchingQueue<()>,
    active_documents: BatchingQueue<()>,
    subscriptions: Mutex<Vec<Subscription>>,
    shutdown: CancellationToken,
}

/// Running synchronization engine
///
/// Created with [`SyncEngine::start`]; stops on [`SyncEngine::shutdown`] or
/// drop.
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

impl fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncEngine")
            .field("paused", &self.is_paused())
            .field("remote", &self.inner.remote)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl SyncEngine {
    /// Start synchronizing `workspace`
    ///
    /// Captures the current tokio runtime, subscribes to every source and
    /// schedules one snapshot flush and one active-document flush.
    ///
    /// # Errors
    /// [`SyncError::NoRuntime`] when called outside a tokio runtime
    pub fn start(
        config: &SyncConfig,
        workspace: Arc<Workspace>,
        operations: &GlobalOperationNotifier,
        focus: ActiveDocumentTracker,
        remote: RemoteConnection,
    ) -> Result<Self, SyncError> {
        let runtime = Handle::try_current().map_err(|_| SyncError::NoRuntime)?;
        let shutdown = CancellationToken::new();
        let registry = AssetRegistry::new();
        let counters = Arc::new(Counters::default());
        let advertised: Arc<Mutex<Option<SnapshotPin>>> = Arc::new(Mutex::new(None));

        let text_deltas = BatchingQueue::new(
            "text-delta",
            config.text_delta_delay(),
            runtime.clone(),
            &shutdown,
            text_delta_processor(remote.clone(), config.diff_budget(), Arc::clone(&counters)),
        );
        let snapshots = BatchingQueue::new(
            "snapshot",
            config.snapshot_delay(),
            runtime.clone(),
            &shutdown,
            snapshot_processor(
                Arc::clone(&workspace),
                remote.clone(),
                registry.clone(),
                advertised,
                Arc::clone(&counters),
            ),
        );
        let active_documents = BatchingQueue::new(
            "active-document",
            config.active_document_delay(),
            runtime,
            &shutdown,
            active_document_processor(focus.clone(), remote.clone(), Arc::clone(&counters)),
        );

        let inner = Arc::new(EngineInner {
            workspace,
            focus,
            remote,
            registry,
            counters,
            paused: Mutex::new(false),
            text_deltas,
            snapshots,
            active_documents,
            subscriptions: Mutex::new(Vec::new()),
            shutdown,
        });

        let subscriptions = vec![
            inner.workspace.subscribe(on_event(&inner, EngineInner::on_workspace_change)),
            inner.focus.subscribe(on_event(&inner, |engine: &EngineInner, _: &Option<DocumentId>| {
                engine.on_focus_change();
            })),
            operations.subscribe(on_event(&inner, EngineInner::on_global_operation)),
        ];
        *inner.subscriptions.lock() = subscriptions;

        inner.snapshots.add_work(());
        inner.active_documents.add_work(());
        tracing::debug!("sync engine started");
        Ok(Self { inner })
    }

    /// Whether a global operation has paused snapshot and focus traffic
    #[must_use]
    pub fn is_paused(&self) -> bool {
        *self.inner.paused.lock()
    }

    /// Connection slot the engine sends through
    #[must_use]
    pub fn remote(&self) -> &RemoteConnection {
        &self.inner.remote
    }

    /// Snapshots the remote host can pull from
    #[must_use]
    pub fn assets(&self) -> &AssetRegistry {
        &self.inner.registry
    }

    #[must_use]
    pub fn stats(&self) -> SyncStats {
        let counters = &self.inner.counters;
        SyncStats {
            text_delta_flushes: self.inner.text_deltas.flush_count(),
            snapshot_flushes: self.inner.snapshots.flush_count(),
            active_document_flushes: self.inner.active_documents.flush_count(),
            deltas_sent: counters.deltas_sent.load(Ordering::Relaxed),
            deltas_skipped: counters.deltas_skipped.load(Ordering::Relaxed),
            remote_failures: counters.remote_failures.load(Ordering::Relaxed),
        }
    }

    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Release every subscription and cancel all queue work
    ///
    /// Compilation builds are unaffected. Idempotent.
    pub fn shutdown(&self) {
        self.inner.shutdown();
    }
}

impl Drop for SyncEngine {
    fn drop(&mut self) {
        self.inner.shutdown();
    }
}

fn on_event<E, F>(inner: &Arc<EngineInner>, handler: F) -> impl Fn(&E) + Send + Sync + 'static
where
    E: 'static,
    F: Fn(&EngineInner, &E) + Send + Sync + 'static,
{
    let engine: Weak<EngineInner> = Arc::downgrade(inner);
    move |event: &E| {
        if let Some(engine) = engine.upgrade() {
            handler(&engine, event);
        }
    }
}

impl EngineInner {
    fn on_workspace_change(&self, change: &WorkspaceChange) {
        if let WorkspaceChangeKind::DocumentTextChanged(document) = change.kind {
            self.text_deltas.add_work(PendingEdit {
                document,
                old: Arc::clone(&change.old),
                new: Arc::clone(&change.new),
            });
        }
        let paused = self.paused.lock();
        if *paused {
            tracing::trace!(kind = ?change.kind, "paused; snapshot notification dropped");
            return;
        }
        self.snapshots.add_work(());
    }

    fn on_focus_change(&self) {
        let paused = self.paused.lock();
        if *paused {
            tracing::trace!("paused; focus notification dropped");
            return;
        }
        self.active_documents.add_work(());
    }

    fn on_global_operation(&self, event: &GlobalOperationEvent) {
        let mut paused = self.paused.lock();
        match event {
            GlobalOperationEvent::Started { name } => {
                self.snapshots.cancel_existing_work();
                self.active_documents.cancel_existing_work();
                *paused = true;
                tracing::debug!(operation = %name, "synchronization paused");
            }
            GlobalOperationEvent::Stopped { name } => {
                *paused = false;
                self.snapshots.add_work(());
                self.active_documents.add_work(());
                tracing::debug!(operation = %name, "synchronization resumed");
            }
        }
    }

    fn shutdown(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        let subscriptions = std::mem::take(&mut *self.subscriptions.lock());
        for subscription in subscriptions {
            subscription.unsubscribe();
        }
        self.shutdown.cancel();
        self.text_deltas.cancel_existing_work();
        self.snapshots.cancel_existing_work();
        self.active_documents.cancel_existing_work();
        tracing::debug!("sync engine shut down");
    }
}

/// Run one remote call, giving up when `cancel` fires
///
/// Returns whether the call succeeded; silent failures are not counted.
async fn call_remote<F>(call: &'static str, counters: &Counters, cancel: &CancellationToken, fut: F) -> bool
where
    F: Future<Output = Result<(), RemoteError>>,
{
    let result = tokio::select! {
        biased;
        () = cancel.cancelled() => Err(RemoteError::Cancelled),
        result = fut => result,
    };
    match result {
        Ok(()) => true,
        Err(error) if error.is_silent() => {
            tracing::debug!(call, %error, "remote call skipped");
            false
        }
        Err(error) => {
            Counters::bump(&counters.remote_failures, 1);
            tracing::warn!(call, %error, "remote call failed");
            false
        }
    }
}

fn connected_host(remote: &RemoteConnection, queue: &'static str) -> Option<Arc<dyn RemoteHost>> {
    let host = remote.host();
    if host.is_none() {
        tracing::trace!(queue, "no remote host; flush is a no-op");
    }
    host
}

fn snapshot_processor(
    workspace: Arc<Workspace>,
    remote: RemoteConnection,
    registry: AssetRegistry,
    advertised: Arc<Mutex<Option<SnapshotPin>>>,
    counters: Arc<Counters>,
) -> BatchProcessor<()> {
    Arc::new(move |_batch, cancel| {
        let workspace = Arc::clone(&workspace);
        let remote = remote.clone();
        let registry = registry.clone();
        let advertised = Arc::clone(&advertised);
        let counters = Arc::clone(&counters);
        async move {
            let Some(host) = connected_host(&remote, "snapshot") else {
                return;
            };
            let snapshot = workspace.current();
            let reference = SnapshotRef::of(&snapshot);
            let pin = registry.pin(snapshot);
            *advertised.lock() = Some(pin);
            tracing::debug!(snapshot = %reference, "advertising snapshot");
            call_remote(
                "synchronize_primary_snapshot",
                &counters,
                &cancel,
                host.synchronize_primary_snapshot(reference, &cancel),
            )
            .await;
        }
        .boxed()
    })
}

fn active_document_processor(
    focus: ActiveDocumentTracker,
    remote: RemoteConnection,
    counters: Arc<Counters>,
) -> BatchProcessor<()> {
    Arc::new(move |_batch, cancel| {
        let focus = focus.clone();
        let remote = remote.clone();
        let counters = Arc::clone(&counters);
        async move {
            let Some(host) = connected_host(&remote, "active-document") else {
                return;
            };
            let active = focus.active();
            call_remote(
                "synchronize_active_document",
                &counters,
                &cancel,
                host.synchronize_active_document(active, &cancel),
            )
            .await;
        }
        .boxed()
    })
}

fn text_delta_processor(
    remote: RemoteConnection,
    budget: DiffBudget,
    counters: Arc<Counters>,
) -> BatchProcessor<PendingEdit> {
    Arc::new(move |batch, cancel| {
        let remote = remote.clone();
        let counters = Arc::clone(&counters);
        async move {
            let Some(host) = connected_host(&remote, "text-delta") else {
                return;
            };
            let tally = Arc::clone(&counters);
            let diffing = tokio::task::spawn_blocking(move || worthwhile_deltas(batch, &budget, &tally));
            let deltas = match diffing.await {
                Ok(deltas) => deltas,
                Err(error) => {
                    tracing::warn!(%error, "text diff task failed");
                    return;
                }
            };
            for delta in deltas {
                if cancel.is_cancelled() {
                    return;
                }
                let document = delta.document();
                let sent = call_remote(
                    "synchronize_text_delta",
                    &counters,
                    &cancel,
                    host.synchronize_text_delta(delta, &cancel),
                )
                .await;
                if sent {
                    Counters::bump(&counters.deltas_sent, 1);
                    tracing::trace!(%document, "text delta sent");
                }
            }
        }
        .boxed()
    })
}

/// Collapse a batch to one delta per document, oldest text to newest
///
/// Edits whose diff is empty, rewrites the document or exceeds `budget` are
/// dropped. Blocking: loads texts and diffs them.
fn worthwhile_deltas(batch: Vec<PendingEdit>, budget: &DiffBudget, counters: &Counters) -> Vec<TextDelta> {
    let mut merged: BTreeMap<DocumentId, (Arc<Snapshot>, Arc<Snapshot>)> = BTreeMap::new();
    for edit in batch {
        merged
            .entry(edit.document)
            .and_modify(|(_, new)| *new = Arc::clone(&edit.new))
            .or_insert((edit.old, edit.new));
    }

    let mut deltas = Vec::with_capacity(merged.len());
    for (document, (old, new)) in merged {
        let texts = old
            .document(document)
            .and_then(|d| d.text().ok())
            .zip(new.document(document).and_then(|d| d.text().ok()));
        let Some((old_text, new_text)) = texts else {
            tracing::trace!(%document, "text unavailable; no delta");
            continue;
        };
        let diff = TextDiff::compute_within(&old_text, &new_text, budget)
            .filter(|diff| !diff.is_empty() && !diff.is_full_replacement(&old_text));
        let Some(diff) = diff else {
            tracing::trace!(%document, "edit not worth a delta");
            Counters::bump(&counters.deltas_skipped, 1);
            continue;
        };
        deltas.push(TextDelta::new(document, Checksum::of_text(&old_text), diff));
    }
    deltas
}
