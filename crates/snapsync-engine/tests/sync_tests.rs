//! Engine traffic against a recording remote host

mod common;

use common::{settle, Harness};
use pretty_assertions::assert_eq;
use snapsync_checksum::{AssetPath, Checksum, TextChange};
use snapsync_engine::{RemoteError, RemoteHost, SnapshotRef, SyncError};
use snapsync_test_utils::{project_id, single_document_snapshot, RemoteCall};
use snapsync_workspace::{Asset, AssetKey};
use std::sync::Arc;

#[tokio::test(start_paused = true)]
async fn edit_pause_resume_scenario() {
    let (s0, document) = single_document_snapshot("");
    let harness = Harness::started(s0).await;
    let s0 = harness.workspace.current();

    let change = harness.workspace.set_document_text(document, "hello").unwrap();
    let s1 = Arc::clone(&change.new);
    assert_ne!(s0.checksum(), s1.checksum());
    assert_ne!(
        s0.project(project_id(1)).unwrap().checksum(),
        s1.project(project_id(1)).unwrap().checksum()
    );
    settle().await;

    let deltas = harness.host.text_deltas();
    assert_eq!(deltas.len(), 1);
    assert_eq!(deltas[0].document(), document);
    assert_eq!(deltas[0].base_checksum(), Checksum::of_text(""));
    assert_eq!(deltas[0].diff().changes(), &[TextChange::insert(0, "hello")]);
    assert_eq!(harness.host.snapshots(), vec![SnapshotRef::of(&s1)]);
    harness.host.clear();

    let operation = harness.operations.start("bulk load");
    for text in ["hello world", "hello world!", "hello, world!"] {
        harness.workspace.set_document_text(document, text).unwrap();
    }
    settle().await;
    assert!(harness.host.snapshots().is_empty());

    operation.done();
    settle().await;
    let last = harness.workspace.current();
    assert_eq!(harness.host.snapshots(), vec![SnapshotRef::of(&last)]);
    assert_eq!(
        last.document(document).unwrap().text().unwrap().as_ref(),
        "hello, world!"
    );
}

#[tokio::test(start_paused = true)]
async fn initial_sync_advertises_snapshot_and_focus() {
    let (snapshot, _) = single_document_snapshot("fn main() {}");
    let root = snapshot.checksum();
    let host = snapsync_test_utils::RecordingRemoteHost::new();
    let workspace = Arc::new(snapsync_workspace::Workspace::new(snapshot));
    let _engine = snapsync_engine::SyncEngine::start(
        &snapsync_engine::SyncConfig::default(),
        workspace,
        &snapsync_engine::GlobalOperationNotifier::new(),
        snapsync_engine::ActiveDocumentTracker::new(),
        snapsync_engine::RemoteConnection::connected(Arc::clone(&host) as Arc<dyn RemoteHost>),
    )
    .unwrap();
    settle().await;

    assert_eq!(host.snapshots().len(), 1);
    assert_eq!(host.snapshots()[0].checksum, root);
    assert_eq!(host.active_documents(), vec![None]);
}

#[tokio::test(start_paused = true)]
async fn single_character_insert_sends_one_delta() {
    let (snapshot, document) = single_document_snapshot("fn main() {}");
    let harness = Harness::started(snapshot).await;

    harness
        .workspace
        .set_document_text(document, "fn main() {;}")
        .unwrap();
    settle().await;

    let deltas = harness.host.text_deltas();
    assert_eq!(deltas.len(), 1);
    assert!(!deltas[0].diff().is_empty());
    assert!(!deltas[0].diff().is_full_replacement("fn main() {}"));
    assert_eq!(deltas[0].apply("fn main() {}").unwrap(), "fn main() {;}");
    assert_eq!(harness.engine.stats().deltas_sent, 1);
}

#[tokio::test(start_paused = true)]
async fn whole_document_replacement_sends_nothing() {
    let (snapshot, document) = single_document_snapshot("abc");
    let harness = Harness::started(snapshot).await;

    harness.workspace.set_document_text(document, "xyz").unwrap();
    settle().await;

    assert!(harness.host.text_deltas().is_empty());
    assert_eq!(harness.engine.stats().deltas_skipped, 1);
    assert_eq!(harness.host.snapshots().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn rewrite_sharing_letters_sends_nothing() {
    let (snapshot, document) = single_document_snapshot("hello world");
    let harness = Harness::started(snapshot).await;

    harness.workspace.set_document_text(document, "goodbye moon").unwrap();
    settle().await;

    assert!(harness.host.text_deltas().is_empty());
    assert_eq!(harness.engine.stats().deltas_skipped, 1);
    assert_eq!(harness.host.snapshots(), vec![SnapshotRef::of(&harness.workspace.current())]);
}

/// Deterministic lowercase noise
fn scramble(seed: u64, len: usize) -> String {
    let mut state = seed;
    (0..len)
        .map(|_| {
            state = state
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            char::from(b'a' + u8::try_from((state >> 33) % 26).unwrap())
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn large_unrelated_rewrites_are_bounded_and_send_nothing() {
    for len in [60_000, 300_000] {
        let old = scramble(1, len);
        let (snapshot, document) = single_document_snapshot(&old);
        let harness = Harness::started(snapshot).await;

        let started = std::time::Instant::now();
        harness.workspace.set_document_text(document, scramble(2, len)).unwrap();
        settle().await;

        assert!(started.elapsed() < std::time::Duration::from_secs(5), "len = {len}");
        assert!(harness.host.text_deltas().is_empty(), "len = {len}");
        assert_eq!(harness.engine.stats().deltas_skipped, 1, "len = {len}");
        assert_eq!(harness.host.snapshots().len(), 1, "len = {len}");
    }
}

#[tokio::test(start_paused = true)]
async fn burst_of_edits_merges_into_one_delta() {
    let (snapshot, document) = single_document_snapshot("let x = 1;");
    let harness = Harness::started(snapshot).await;

    for text in ["let x = 12;", "let x = 123;", "let xy = 123;"] {
        harness.workspace.set_document_text(document, text).unwrap();
    }
    settle().await;

    let deltas = harness.host.text_deltas();
    assert_eq!(deltas.len(), 1);
    assert_eq!(deltas[0].base_checksum(), Checksum::of_text("let x = 1;"));
    assert_eq!(deltas[0].apply("let x = 1;").unwrap(), "let xy = 123;");
    assert_eq!(harness.host.snapshots().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn edit_and_undo_within_one_batch_sends_nothing() {
    let (snapshot, document) = single_document_snapshot("same");
    let harness = Harness::started(snapshot).await;

    harness.workspace.set_document_text(document, "changed").unwrap();
    harness.workspace.set_document_text(document, "same").unwrap();
    settle().await;

    assert!(harness.host.text_deltas().is_empty());
}

#[tokio::test(start_paused = true)]
async fn focus_changes_report_latest_document() {
    let (snapshot, document) = single_document_snapshot("a");
    let harness = Harness::started(snapshot).await;

    harness.focus.set_active(None);
    harness.focus.set_active(Some(document));
    settle().await;

    assert_eq!(harness.host.active_documents(), vec![Some(document)]);
}

#[tokio::test(start_paused = true)]
async fn flushes_observe_non_decreasing_versions() {
    let (snapshot, document) = single_document_snapshot("0");
    let harness = Harness::started(snapshot).await;

    for i in 1..=5 {
        harness
            .workspace
            .set_document_text(document, i.to_string())
            .unwrap();
        if i % 2 == 0 {
            settle().await;
        }
    }
    settle().await;

    let versions: Vec<_> = harness.host.snapshots().iter().map(|s| s.version).collect();
    let mut sorted = versions.clone();
    sorted.sort();
    assert_eq!(versions, sorted);
    assert_eq!(versions.last().copied(), Some(harness.workspace.current().version()));
}

#[tokio::test(start_paused = true)]
async fn no_remote_is_a_silent_no_op() {
    let (snapshot, document) = single_document_snapshot("a");
    let harness = Harness::disconnected(snapshot).await;

    harness.workspace.set_document_text(document, "ab").unwrap();
    harness.focus.set_active(Some(document));
    settle().await;

    let stats = harness.engine.stats();
    assert!(stats.snapshot_flushes >= 1);
    assert_eq!(stats.deltas_sent, 0);
    assert_eq!(stats.remote_failures, 0);
    assert!(harness.host.calls().is_empty());

    harness.remote.connect(Arc::clone(&harness.host) as Arc<dyn RemoteHost>);
    harness.workspace.set_document_text(document, "abc").unwrap();
    settle().await;
    assert_eq!(harness.host.snapshots().len(), 1);
    assert_eq!(harness.host.text_deltas().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn remote_failures_are_counted_but_not_fatal() {
    let (snapshot, document) = single_document_snapshot("a");
    let harness = Harness::started(snapshot).await;

    harness
        .host
        .fail_with(Some(RemoteError::Failed("connection reset".into())));
    harness.workspace.set_document_text(document, "ab").unwrap();
    settle().await;
    assert_eq!(harness.engine.stats().remote_failures, 2);

    harness.host.fail_with(Some(RemoteError::NotConnected));
    harness.workspace.set_document_text(document, "abc").unwrap();
    settle().await;
    assert_eq!(harness.engine.stats().remote_failures, 2);

    harness.host.fail_with(None);
    harness.workspace.set_document_text(document, "abcd").unwrap();
    settle().await;
    assert_eq!(harness.host.snapshots().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn remote_pulls_assets_from_advertised_snapshot() {
    let (snapshot, document) = single_document_snapshot("a");
    let harness = Harness::started(snapshot).await;

    harness.workspace.set_document_text(document, "hello").unwrap();
    settle().await;
    let root = harness.host.snapshots()[0].checksum;
    let assets = harness.engine.assets();

    let path = AssetPath::document_text(document);
    let checksums = assets.find_checksums(root, &path).unwrap();
    assert_eq!(checksums.get(AssetKey::DocumentText(document)), Some(Checksum::of_text("hello")));
    let pulled = assets
        .find_assets(root, &path, &[Checksum::of_text("hello")])
        .unwrap();
    assert!(matches!(&pulled[..], [(_, Asset::DocumentText(text))] if &**text == "hello"));

    let held = assets.acquire(root).unwrap();
    harness.workspace.set_document_text(document, "hello!").unwrap();
    settle().await;
    assert!(assets.find_checksums(root, &path).is_ok());

    drop(held);
    assert!(matches!(
        assets.find_checksums(root, &path),
        Err(SyncError::UnknownSnapshot(r)) if r == root
    ));
    let latest = harness.host.snapshots()[1].checksum;
    assert!(assets.find_checksums(latest, &AssetPath::full_tree()).is_ok());
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_all_traffic() {
    let (snapshot, document) = single_document_snapshot("a");
    let harness = Harness::started(snapshot).await;

    harness.workspace.set_document_text(document, "ab").unwrap();
    harness.engine.shutdown();
    harness.engine.shutdown();
    harness.workspace.set_document_text(document, "abc").unwrap();
    harness.focus.set_active(Some(document));
    harness.operations.start("after shutdown").done();
    settle().await;

    assert!(harness.engine.is_shut_down());
    assert_eq!(harness.host.calls(), Vec::<RemoteCall>::new());
}
