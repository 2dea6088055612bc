//! Triggers adapt external event sources into transition requests.
//!
//! A trigger subscribes to its source only while the state that owns its
//! transition is current. Each trip it produces carries the visit token that
//! was live when the trigger was activated, so a trip that is delivered
//! after that visit ended is rejected.

use super::engine::Shared;
use super::source::{EventHandler, EventSource, SubscriptionId};
use super::TransitionId;
use crate::core::{Cause, Constraint, Fault, FaultSource, Trip, VisitToken, Waypoint};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

pub(crate) struct TriggerState {
    name: String,
    active: AtomicBool,
    token: Mutex<Option<VisitToken>>,
}

impl TriggerState {
    fn new(name: String) -> Self {
        Self {
            name,
            active: AtomicBool::new(false),
            token: Mutex::new(None),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn token(&self) -> Option<VisitToken> {
        self.token.lock().clone()
    }
}

/// Where a trip goes once a source fires.
#[derive(Clone)]
pub(crate) struct TripSink {
    machine: Weak<Shared>,
    transition: TransitionId,
    trigger: Arc<TriggerState>,
}

impl TripSink {
    pub(crate) fn new(machine: Weak<Shared>, transition: TransitionId, trigger: &Trigger) -> Self {
        Self {
            machine,
            transition,
            trigger: Arc::clone(&trigger.state),
        }
    }

    fn fire(&self) {
        let Some(machine) = self.machine.upgrade() else {
            return;
        };
        if !self.trigger.is_active() {
            tracing::debug!(trigger = %self.trigger.name, "trip ignored: trigger inactive");
            return;
        }
        let Some(token) = self.trigger.token() else {
            return;
        };

        let name = self.trigger.name.clone();
        let mut trip = Trip::new(Cause::Trigger(name.clone()), Some(token));
        trip.push(Waypoint::Trigger(name));
        machine.dispatch(self.transition, Arc::clone(&self.trigger), trip);
    }

    fn fault(&self, fault: Fault) {
        if let Some(machine) = self.machine.upgrade() {
            machine.report_fault(fault);
        }
    }
}

/// Type-erased connection between a trigger and its source.
trait Binding: Send + Sync {
    fn is_lazy(&self) -> bool;

    /// Subscribe to the source. Returns `false` if the source is gone.
    fn attach(&self, sink: TripSink) -> bool;

    fn detach(&self);
}

enum SourceRef<S> {
    Bound(Weak<S>),
    Deferred(Arc<dyn Fn() -> Option<Arc<S>> + Send + Sync>),
}

struct SourceBinding<A, S> {
    source: SourceRef<S>,
    filter: Option<Arc<Constraint<A>>>,
    subscription: Mutex<Option<(Weak<S>, SubscriptionId)>>,
}

impl<A, S> Binding for SourceBinding<A, S>
where
    A: 'static,
    S: EventSource<A> + 'static,
{
    fn is_lazy(&self) -> bool {
        matches!(self.source, SourceRef::Deferred(_))
    }

    fn attach(&self, sink: TripSink) -> bool {
        if self.subscription.lock().is_some() {
            return true;
        }
        let source = match &self.source {
            SourceRef::Bound(weak) => weak.upgrade(),
            SourceRef::Deferred(resolve) => resolve(),
        };
        let Some(source) = source else {
            return false;
        };

        let filter = self.filter.clone();
        let handler: EventHandler<A> = Arc::new(move |args: &A| {
            if let Some(filter) = &filter {
                match filter.evaluate(args) {
                    Ok(true) => {}
                    Ok(false) => return,
                    Err(err) => {
                        sink.fault(Fault::new(FaultSource::Filter, filter.name(), err.to_string()));
                        return;
                    }
                }
            }
            sink.fire();
        });

        let id = source.subscribe(handler);
        *self.subscription.lock() = Some((Arc::downgrade(&source), id));
        true
    }

    fn detach(&self) {
        let subscription = self.subscription.lock().take();
        if let Some((source, id)) = subscription {
            if let Some(source) = source.upgrade() {
                source.unsubscribe(id);
            }
        }
    }
}

/// A trigger attached to a transition.
///
/// Built with [`Trigger::on`] or [`Trigger::lazy`] and converted when it is
/// added to a transition.
pub struct Trigger {
    state: Arc<TriggerState>,
    binding: Box<dyn Binding>,
}

impl Trigger {
    /// Trigger fired by every event of `source`.
    ///
    /// Only a weak reference to the source is kept.
    pub fn on<A, S>(name: impl Into<String>, source: &Arc<S>) -> EventTrigger<A, S>
    where
        A: 'static,
        S: EventSource<A> + 'static,
    {
        EventTrigger {
            name: name.into(),
            source: SourceRef::Bound(Arc::downgrade(source)),
            filter: None,
        }
    }

    /// Trigger whose source is resolved late, after the owning state has
    /// been entered and the transition that entered it has completed.
    pub fn lazy<A, S, F>(name: impl Into<String>, resolve: F) -> EventTrigger<A, S>
    where
        A: 'static,
        S: EventSource<A> + 'static,
        F: Fn() -> Option<Arc<S>> + Send + Sync + 'static,
    {
        EventTrigger {
            name: name.into(),
            source: SourceRef::Deferred(Arc::new(resolve)),
            filter: None,
        }
    }

    pub fn name(&self) -> &str {
        self.state.name()
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    pub fn is_lazy(&self) -> bool {
        self.binding.is_lazy()
    }

    pub(crate) fn activate(&self, token: VisitToken, sink: TripSink) {
        *self.state.token.lock() = Some(token);
        self.state.active.store(true, Ordering::SeqCst);
        if self.binding.attach(sink) {
            tracing::debug!(trigger = %self.state.name, "trigger activated");
        } else {
            self.state.active.store(false, Ordering::SeqCst);
            self.state.token.lock().take();
            tracing::debug!(trigger = %self.state.name, "trigger source unavailable");
        }
    }

    pub(crate) fn deactivate(&self) {
        self.state.active.store(false, Ordering::SeqCst);
        self.state.token.lock().take();
        self.binding.detach();
    }
}

impl fmt::Debug for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trigger")
            .field("name", &self.state.name)
            .field("active", &self.is_active())
            .field("lazy", &self.is_lazy())
            .finish()
    }
}

/// Typed trigger under construction.
pub struct EventTrigger<A, S> {
    name: String,
    source: SourceRef<S>,
    filter: Option<Constraint<A>>,
}

impl<A, S> EventTrigger<A, S> {
    /// Only fire for events that satisfy `filter`.
    pub fn filter(mut self, filter: Constraint<A>) -> Self {
        self.filter = Some(filter);
        self
    }
}

impl<A, S> From<EventTrigger<A, S>> for Trigger
where
    A: 'static,
    S: EventSource<A> + 'static,
{
    fn from(trigger: EventTrigger<A, S>) -> Self {
        Trigger {
            state: Arc::new(TriggerState::new(trigger.name)),
            binding: Box::new(SourceBinding {
                source: trigger.source,
                filter: trigger.filter.map(Arc::new),
                subscription: Mutex::new(None),
            }),
        }
    }
}
