//! Event sources that triggers can subscribe to.
//!
//! Any type can feed triggers by implementing [`EventSource`]. [`Signal`] is
//! a ready-made multicast source for callers that just want to fire events.

use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Callback registered with an event source.
pub type EventHandler<A> = Arc<dyn Fn(&A) + Send + Sync>;

/// Handle returned by [`EventSource::subscribe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// A source of events of type `A`.
///
/// Implementations must not hold internal locks while invoking handlers:
/// a handler may synchronously run a transition that unsubscribes other
/// handlers from the same source.
pub trait EventSource<A>: Send + Sync {
    fn subscribe(&self, handler: EventHandler<A>) -> SubscriptionId;

    fn unsubscribe(&self, id: SubscriptionId);
}

/// Multicast event source.
///
/// ```rust
/// use turnstile::machine::{EventSource, Signal};
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// let signal = Signal::<u32>::new();
/// let seen = Arc::new(AtomicUsize::new(0));
/// let sink = Arc::clone(&seen);
/// let id = signal.subscribe(Arc::new(move |n: &u32| {
///     sink.fetch_add(*n as usize, Ordering::SeqCst);
/// }));
///
/// signal.emit(&3);
/// signal.unsubscribe(id);
/// signal.emit(&4);
/// assert_eq!(seen.load(Ordering::SeqCst), 3);
/// ```
pub struct Signal<A> {
    handlers: RwLock<Vec<(SubscriptionId, EventHandler<A>)>>,
    next_id: AtomicU64,
}

impl<A> Signal<A> {
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Invoke every current subscriber with `args`.
    pub fn emit(&self, args: &A) {
        let snapshot: Vec<EventHandler<A>> = self
            .handlers
            .read()
            .iter()
            .map(|(_, h)| Arc::clone(h))
            .collect();
        for handler in snapshot {
            handler(args);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.handlers.read().len()
    }
}

impl Signal<()> {
    /// Fire a payload-free signal.
    pub fn fire(&self) {
        self.emit(&());
    }
}

impl<A> Default for Signal<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> fmt::Debug for Signal<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl<A: 'static> EventSource<A> for Signal<A> {
    fn subscribe(&self, handler: EventHandler<A>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers.write().push((id, handler));
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.handlers.write().retain(|(existing, _)| *existing != id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn emit_reaches_every_subscriber() {
        let signal = Signal::<()>::new();
        let hits = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let hits = Arc::clone(&hits);
            signal.subscribe(Arc::new(move |_: &()| {
                hits.fetch_add(1, Ordering::SeqCst);
            }));
        }

        signal.fire();
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert_eq!(signal.subscriber_count(), 3);
    }

    #[test]
    fn unsubscribe_removes_only_that_handler() {
        let signal = Signal::<()>::new();
        let a = signal.subscribe(Arc::new(|_: &()| {}));
        let b = signal.subscribe(Arc::new(|_: &()| {}));
        assert_ne!(a, b);

        signal.unsubscribe(a);
        assert_eq!(signal.subscriber_count(), 1);
        signal.unsubscribe(a);
        assert_eq!(signal.subscriber_count(), 1);
    }

    #[test]
    fn handler_may_unsubscribe_during_emit() {
        let signal = Arc::new(Signal::<()>::new());
        let slot = Arc::new(parking_lot::Mutex::new(None));
        let (inner_signal, inner_slot) = (Arc::clone(&signal), Arc::clone(&slot));
        let id = signal.subscribe(Arc::new(move |_: &()| {
            if let Some(id) = inner_slot.lock().take() {
                inner_signal.unsubscribe(id);
            }
        }));
        *slot.lock() = Some(id);

        signal.fire();
        assert_eq!(signal.subscriber_count(), 0);
    }
}
