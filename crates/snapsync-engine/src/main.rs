use anyhow::Context;
use async_trait::async_trait;
use clap::{value_parser, Arg, ArgAction, Command};
use snapsync_checksum::{DocumentId, ProjectId, TextDelta};
use snapsync_engine::{
    ActiveDocumentTracker, GlobalOperationNotifier, RemoteConnection, RemoteError, RemoteHost, SnapshotRef,
    SyncConfig, SyncEngine,
};
use snapsync_workspace::{DocumentAttributes, DocumentState, ProjectAttributes, ProjectState, Snapshot, Workspace};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Remote host that only counts what it receives
#[derive(Debug, Default)]
struct CountingHost {
    snapshots: AtomicU64,
    active_documents: AtomicU64,
    text_deltas: AtomicU64,
}

#[async_trait]
impl RemoteHost for CountingHost {
    async fn synchronize_primary_snapshot(
        &self,
        snapshot: SnapshotRef,
        _cancel: &CancellationToken,
    ) -> Result<(), RemoteError> {
        tracing::info!(%snapshot, "snapshot advertised");
        self.snapshots.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn synchronize_active_document(
        &self,
        _document: Option<DocumentId>,
        _cancel: &CancellationToken,
    ) -> Result<(), RemoteError> {
        self.active_documents.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn synchronize_text_delta(&self, _delta: TextDelta, _cancel: &CancellationToken) -> Result<(), RemoteError> {
        self.text_deltas.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

fn cli() -> Command {
    Command::new("snapsync-sim")
        .version(snapsync_engine::VERSION)
        .about("Drive a synthetic workspace through the sync engine")
        .arg(
            Arg::new("projects")
                .long("projects")
                .default_value("4")
                .value_parser(value_parser!(u32))
                .help("Number of projects"),
        )
        .arg(
            Arg::new("documents")
                .long("documents")
                .default_value("8")
                .value_parser(value_parser!(u32))
                .help("Documents per project"),
        )
        .arg(
            Arg::new("edits")
                .long("edits")
                .default_value("100")
                .value_parser(value_parser!(u32))
                .help("Number of text edits to perform"),
        )
        .arg(
            Arg::new("pause")
                .long("pause")
                .action(ArgAction::SetTrue)
                .help("Run the middle third of the edits inside a global operation"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .help("TOML file with debounce settings"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .action(ArgAction::SetTrue)
                .help("Print statistics as JSON"),
        )
}

fn synthetic_snapshot(projects: u32, documents: u32) -> anyhow::Result<Snapshot> {
    let mut snapshot = Snapshot::empty();
    for p in 0..projects {
        let project = ProjectId::from_raw(u128::from(p) + 1);
        snapshot = snapshot.add_project(ProjectState::new(ProjectAttributes::new(
            project,
            format!("project{p}"),
            "rust",
        )))?;
        for d in 0..documents {
            let id = DocumentId::from_raw(project, u128::from(d) + 1);
            let attributes = DocumentAttributes::new(id, format!("src/file{d}.rs"));
            snapshot = snapshot.add_document(DocumentState::new(attributes, format!("fn f{d}() {{}}\n")))?;
        }
    }
    Ok(snapshot)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let matches = cli().get_matches();
    let projects = matches.get_one::<u32>("projects").copied().unwrap_or(4).max(1);
    let documents = matches.get_one::<u32>("documents").copied().unwrap_or(8).max(1);
    let edits = matches.get_one::<u32>("edits").copied().unwrap_or(100);
    let pause = matches.get_flag("pause");
    let config = match matches.get_one::<String>("config") {
        Some(path) => SyncConfig::load(path).with_context(|| format!("loading {path}"))?,
        None => SyncConfig::default(),
    };

    let workspace = Arc::new(Workspace::new(synthetic_snapshot(projects, documents)?));
    let host = Arc::new(CountingHost::default());
    let operations = GlobalOperationNotifier::new();
    let focus = ActiveDocumentTracker::new();
    let engine = SyncEngine::start(
        &config,
        Arc::clone(&workspace),
        &operations,
        focus.clone(),
        RemoteConnection::connected(Arc::clone(&host) as Arc<dyn RemoteHost>),
    )?;

    let mut operation = None;
    for i in 0..edits {
        if pause && i == edits / 3 {
            operation = Some(operations.start("simulated bulk operation"));
        }
        if i == edits * 2 / 3 {
            if let Some(running) = operation.take() {
                running.done();
            }
        }
        let project = ProjectId::from_raw(u128::from(i % projects) + 1);
        let document = DocumentId::from_raw(project, u128::from(i % documents) + 1);
        let text = workspace
            .current()
            .document(document)
            .and_then(|d| d.text().ok())
            .context("synthetic document missing")?;
        workspace.set_document_text(document, format!("{text}// edit {i}\n"))?;
        focus.set_active(Some(document));
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    drop(operation);

    let settle = config
        .text_delta_delay()
        .max(config.snapshot_delay())
        .max(config.active_document_delay());
    tokio::time::sleep(settle * 2 + Duration::from_millis(50)).await;

    let stats = engine.stats();
    engine.shutdown();

    if matches.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        println!("snapsync-sim");
        println!("============");
        println!("Edits:                 {edits}");
        println!("Paused mid-run:        {pause}");
        println!();
        println!("Text-delta flushes:    {}", stats.text_delta_flushes);
        println!("  deltas sent:         {}", stats.deltas_sent);
        println!("  deltas skipped:      {}", stats.deltas_skipped);
        println!("Snapshot flushes:      {}", stats.snapshot_flushes);
        println!("Focus flushes:         {}", stats.active_document_flushes);
        println!("Remote failures:       {}", stats.remote_failures);
        println!();
        println!(
            "Host received:         {} snapshots, {} focus changes, {} deltas",
            host.snapshots.load(Ordering::Relaxed),
            host.active_documents.load(Ordering::Relaxed),
            host.text_deltas.load(Ordering::Relaxed),
        );
    }
    Ok(())
}
