//! Debounced single-flight batching queue
//!
//! Items added while a batch is pending join that batch. A batch is handed
//! to the processor once its debounce interval elapses; at most one batch
//! is processed at a time, and items arriving during processing start the
//! next batch.

use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

/// Batch handler; the token fires when the batch is cancelled
pub type BatchProcessor<T> =
    Arc<dyn Fn(Vec<T>, CancellationToken) -> BoxFuture<'static, ()> + Send + Sync>;

struct Pending<T> {
    items: Vec<T>,
    scheduled: bool,
    generation: CancellationToken,
}

struct QueueInner<T> {
    name: &'static str,
    delay: Duration,
    processor: BatchProcessor<T>,
    runtime: Handle,
    shutdown: CancellationToken,
    pending: Mutex<Pending<T>>,
    flight: tokio::sync::Mutex<()>,
    flushes: AtomicU64,
}

/// Debounced batching queue running on a captured runtime
pub struct BatchingQueue<T> {
    inner: Arc<QueueInner<T>>,
}

impl<T: Send + 'static> fmt::Debug for BatchingQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchingQueue")
            .field("name", &self.inner.name)
            .field("delay", &self.inner.delay)
            .field("flushes", &self.flush_count())
            .finish_non_exhaustive()
    }
}

impl<T: Send + 'static> BatchingQueue<T> {
    /// Queue whose flushes run on `runtime`
    ///
    /// Cancelling `shutdown` stops the queue for good.
    #[must_use]
    pub fn new(
        name: &'static str,
        delay: Duration,
        runtime: Handle,
        shutdown: &CancellationToken,
        processor: BatchProcessor<T>,
    ) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                name,
                delay,
                processor,
                runtime,
                shutdown: shutdown.clone(),
                pending: Mutex::new(Pending {
                    items: Vec::new(),
                    scheduled: false,
                    generation: shutdown.child_token(),
                }),
                flight: tokio::sync::Mutex::new(()),
                flushes: AtomicU64::new(0),
            }),
        }
    }

    /// Add an item, scheduling a flush if none is pending
    ///
    /// Never blocks; items added after shutdown are dropped.
    pub fn add_work(&self, item: T) {
        if self.inner.shutdown.is_cancelled() {
            tracing::trace!(queue = self.inner.name, "work after shutdown dropped");
            return;
        }
        let mut pending = self.inner.pending.lock();
        pending.items.push(item);
        if pending.scheduled {
            return;
        }
        pending.scheduled = true;
        let token = pending.generation.clone();
        let inner = Arc::clone(&self.inner);
        self.inner.runtime.spawn(flush(inner, token));
    }

    /// Drop pending items and cancel any in-flight batch
    pub fn cancel_existing_work(&self) {
        let mut pending = self.inner.pending.lock();
        let dropped = pending.items.len();
        pending.items.clear();
        pending.scheduled = false;
        pending.generation.cancel();
        pending.generation = self.inner.shutdown.child_token();
        tracing::debug!(queue = self.inner.name, dropped, "queue work cancelled");
    }

    /// Items waiting for the next flush
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.inner.pending.lock().items.len()
    }

    /// Batches handed to the processor so far
    #[must_use]
    pub fn flush_count(&self) -> u64 {
        self.inner.flushes.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.inner.name
    }
}

async fn flush<T: Send + 'static>(inner: Arc<QueueInner<T>>, token: CancellationToken) {
    tokio::select! {
        () = token.cancelled() => return,
        () = tokio::time::sleep(inner.delay) => {}
    }
    let _flight = tokio::select! {
        () = token.cancelled() => return,
        guard = inner.flight.lock() => guard,
    };
    let items = {
        let mut pending = inner.pending.lock();
        if token.is_cancelled() {
            return;
        }
        pending.scheduled = false;
        std::mem::take(&mut pending.items)
    };
    if items.is_empty() {
        return;
    }
    inner.flushes.fetch_add(1, Ordering::Relaxed);
    tracing::debug!(queue = inner.name, items = items.len(), "flushing batch");
    (inner.processor)(items, token).await;
}
