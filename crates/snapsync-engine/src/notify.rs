//! Host-side notification sources the engine listens to
//!
//! - [`GlobalOperationNotifier`]: expensive host operations (bulk loads,
//!   solution-wide refactorings) that should suspend snapshot traffic
//! - [`ActiveDocumentTracker`]: which document currently has focus

use parking_lot::{Mutex, RwLock};
use snapsync_checksum::DocumentId;
use snapsync_workspace::{EventSource, Subscription};
use std::fmt;
use std::sync::Arc;

/// The host became busy with global operations, or went quiet again
///
/// Overlapping operations produce one `Started` (named after the first
/// operation) and one `Stopped` (named after the last one to finish).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GlobalOperationEvent {
    Started { name: Arc<str> },
    Stopped { name: Arc<str> },
}

impl GlobalOperationEvent {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Started { name } | Self::Stopped { name } => name,
        }
    }
}

#[derive(Default)]
struct NotifierInner {
    events: EventSource<GlobalOperationEvent>,
    running: Mutex<usize>,
}

/// Source of global-operation start/stop events
///
/// Clones share subscribers.
#[derive(Clone, Default)]
pub struct GlobalOperationNotifier {
    inner: Arc<NotifierInner>,
}

impl fmt::Debug for GlobalOperationNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlobalOperationNotifier")
            .field("running", &self.running())
            .field("subscribers", &self.inner.events.subscriber_count())
            .finish()
    }
}

impl GlobalOperationNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Announce an operation; it ends when the guard is finished or dropped
    ///
    /// Subscribers hear `Started` only when no other operation is running.
    /// They must not start or stop operations from inside the handler.
    pub fn start(&self, name: impl Into<Arc<str>>) -> GlobalOperation {
        let name = name.into();
        let mut running = self.inner.running.lock();
        *running += 1;
        tracing::debug!(operation = %name, running = *running, "global operation started");
        if *running == 1 {
            self.inner.events.emit(&GlobalOperationEvent::Started {
                name: Arc::clone(&name),
            });
        }
        drop(running);
        GlobalOperation {
            name,
            inner: Some(Arc::clone(&self.inner)),
        }
    }

    /// Observe starts and stops
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&GlobalOperationEvent) + Send + Sync + 'static,
    {
        self.inner.events.subscribe(handler)
    }

    /// Operations started and not yet stopped
    #[must_use]
    pub fn running(&self) -> usize {
        *self.inner.running.lock()
    }
}

/// Guard for one running global operation
#[must_use = "dropping the guard stops the operation immediately"]
pub struct GlobalOperation {
    name: Arc<str>,
    inner: Option<Arc<NotifierInner>>,
}

impl GlobalOperation {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stop the operation
    pub fn done(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let Some(inner) = self.inner.take() else {
            return;
        };
        let mut running = inner.running.lock();
        *running = running.saturating_sub(1);
        tracing::debug!(operation = %self.name, running = *running, "global operation stopped");
        if *running == 0 {
            inner.events.emit(&GlobalOperationEvent::Stopped {
                name: Arc::clone(&self.name),
            });
        }
    }
}

impl fmt::Debug for GlobalOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlobalOperation")
            .field("name", &self.name)
            .field("running", &self.inner.is_some())
            .finish()
    }
}

impl Drop for GlobalOperation {
    fn drop(&mut self) {
        self.stop();
    }
}

#[derive(Default)]
struct FocusInner {
    active: RwLock<Option<DocumentId>>,
    events: EventSource<Option<DocumentId>>,
}

/// Current focused document plus change notifications
///
/// Clones share state.
#[derive(Clone, Default)]
pub struct ActiveDocumentTracker {
    inner: Arc<FocusInner>,
}

impl fmt::Debug for ActiveDocumentTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveDocumentTracker")
            .field("active", &self.active())
            .finish()
    }
}

impl ActiveDocumentTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn active(&self) -> Option<DocumentId> {
        *self.inner.active.read()
    }

    /// Change focus; subscribers hear only actual changes
    pub fn set_active(&self, document: Option<DocumentId>) {
        {
            let mut active = self.inner.active.write();
            if *active == document {
                return;
            }
            *active = document;
        }
        self.inner.events.emit(&document);
    }

    /// Observe focus changes
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&Option<DocumentId>) + Send + Sync + 'static,
    {
        self.inner.events.subscribe(handler)
    }
}
