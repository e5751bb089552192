//! Global operations pause snapshot and focus traffic, never text deltas

mod common;

use common::{settle, Harness};
use pretty_assertions::assert_eq;
use snapsync_engine::SnapshotRef;
use snapsync_test_utils::single_document_snapshot;

#[tokio::test(start_paused = true)]
async fn paused_notifications_collapse_into_one_flush_per_queue() {
    for notifications in [1_usize, 3, 25] {
        let (snapshot, document) = single_document_snapshot("fn main() {}");
        let harness = Harness::started(snapshot).await;

        let operation = harness.operations.start("bulk load");
        assert!(harness.engine.is_paused());
        for i in 0..notifications {
            harness
                .workspace
                .set_document_text(document, format!("fn main() {{}} // {i}"))
                .unwrap();
            harness
                .focus
                .set_active(if i % 2 == 0 { Some(document) } else { None });
        }
        settle().await;
        assert!(harness.host.snapshots().is_empty(), "n = {notifications}");
        assert!(harness.host.active_documents().is_empty(), "n = {notifications}");

        operation.done();
        assert!(!harness.engine.is_paused());
        settle().await;

        assert_eq!(
            harness.host.snapshots(),
            vec![SnapshotRef::of(&harness.workspace.current())],
            "n = {notifications}"
        );
        assert_eq!(harness.host.active_documents(), vec![harness.focus.active()]);
    }
}

#[tokio::test(start_paused = true)]
async fn pause_cancels_pending_flush() {
    let (snapshot, document) = single_document_snapshot("a");
    let harness = Harness::started(snapshot).await;

    harness.workspace.set_document_text(document, "ab").unwrap();
    harness.focus.set_active(Some(document));
    let operation = harness.operations.start("refactor");
    settle().await;

    assert!(harness.host.snapshots().is_empty());
    assert!(harness.host.active_documents().is_empty());
    drop(operation);
    settle().await;
    assert_eq!(harness.host.snapshots().len(), 1);
    assert_eq!(harness.host.active_documents(), vec![Some(document)]);
}

#[tokio::test(start_paused = true)]
async fn resume_flushes_even_without_changes() {
    let (snapshot, _) = single_document_snapshot("a");
    let harness = Harness::started(snapshot).await;

    harness.operations.start("noop").done();
    settle().await;

    assert_eq!(harness.host.snapshots().len(), 1);
    assert_eq!(harness.host.active_documents().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn text_deltas_keep_flowing_while_paused() {
    let (snapshot, document) = single_document_snapshot("hello");
    let harness = Harness::started(snapshot).await;

    let _operation = harness.operations.start("bulk load");
    harness.workspace.set_document_text(document, "hello!").unwrap();
    settle().await;

    let deltas = harness.host.text_deltas();
    assert_eq!(deltas.len(), 1);
    assert_eq!(deltas[0].apply("hello").unwrap(), "hello!");
    assert!(harness.host.snapshots().is_empty());
}

#[tokio::test(start_paused = true)]
async fn overlapping_operations_stay_paused_until_the_last_stops() {
    let (snapshot, document) = single_document_snapshot("a");
    let harness = Harness::started(snapshot).await;

    let outer = harness.operations.start("outer");
    let inner = harness.operations.start("inner");
    outer.done();
    harness.workspace.set_document_text(document, "b").unwrap();
    harness.focus.set_active(Some(document));
    settle().await;

    assert!(harness.engine.is_paused());
    assert!(harness.host.snapshots().is_empty());
    assert!(harness.host.active_documents().is_empty());

    inner.done();
    assert!(!harness.engine.is_paused());
    settle().await;
    assert_eq!(
        harness.host.snapshots(),
        vec![SnapshotRef::of(&harness.workspace.current())]
    );
    assert_eq!(harness.host.active_documents(), vec![Some(document)]);
    assert_eq!(harness.operations.running(), 0);
}
