//! Explicit event subscriptions
//!
//! [`EventSource`] delivers events synchronously to registered handlers.
//! Registration returns a [`Subscription`] handle; the handler stays attached
//! until the handle is dropped or [`Subscription::unsubscribe`] is called.

use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;
type HandlerList<E> = RwLock<Vec<(u64, Handler<E>)>>;

/// Multi-subscriber event source
pub struct EventSource<E> {
    handlers: Arc<HandlerList<E>>,
    next_id: AtomicU64,
}

impl<E: 'static> fmt::Debug for EventSource<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSource")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl<E> Default for EventSource<E> {
    fn default() -> Self {
        Self {
            handlers: Arc::new(RwLock::new(Vec::new())),
            next_id: AtomicU64::new(0),
        }
    }
}

impl<E: 'static> EventSource<E> {
    /// Source with no subscribers
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `handler` until the returned handle is released
    #[must_use = "dropping the subscription detaches the handler immediately"]
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.handlers.write().push((id, Arc::new(handler)));
        let handlers: Weak<HandlerList<E>> = Arc::downgrade(&self.handlers);
        Subscription {
            detach: Some(Box::new(move || {
                if let Some(handlers) = handlers.upgrade() {
                    handlers.write().retain(|(handler_id, _)| *handler_id != id);
                }
            })),
        }
    }

    /// Deliver `event` to every current subscriber
    ///
    /// Handlers run outside the registry lock, so a handler may subscribe or
    /// unsubscribe without deadlocking.
    pub fn emit(&self, event: &E) {
        let handlers: Vec<Handler<E>> = self
            .handlers
            .read()
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect();
        for handler in handlers {
            handler(event);
        }
    }

    /// Number of attached handlers
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.handlers.read().len()
    }
}

/// Handle keeping one handler attached
#[must_use = "dropping the subscription detaches the handler immediately"]
pub struct Subscription {
    detach: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// Detach the handler now
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("attached", &self.detach.is_some())
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn handlers_receive_until_unsubscribed() {
        let source = EventSource::<u32>::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let subscription = source.subscribe(move |value| {
            counter.fetch_add(*value as usize, Ordering::SeqCst);
        });

        source.emit(&2);
        source.emit(&3);
        subscription.unsubscribe();
        source.emit(&100);

        assert_eq!(seen.load(Ordering::SeqCst), 5);
        assert_eq!(source.subscriber_count(), 0);
    }

    #[test]
    fn dropping_handle_detaches() {
        let source = EventSource::<()>::new();
        {
            let _subscription = source.subscribe(|()| {});
            assert_eq!(source.subscriber_count(), 1);
        }
        assert_eq!(source.subscriber_count(), 0);
    }

    #[test]
    fn handle_outliving_source_is_harmless() {
        let source = EventSource::<()>::new();
        let subscription = source.subscribe(|()| {});
        drop(source);
        drop(subscription);
    }
}
