//! Observable machine events and the listener registry.

use crate::core::{panic_message, Cause, Fault, Trip, Waypoint};
use parking_lot::RwLock;
use serde::Serialize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Context attached to every state and transition event.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TransitionReport {
    /// Transition taken, `None` for administrative jumps.
    pub transition: Option<String>,
    pub cause: Cause,
    pub trigger: Option<String>,
    /// Route walked by the trip so far.
    pub route: Vec<Waypoint>,
    pub trip_id: Uuid,
}

impl TransitionReport {
    pub(crate) fn new(transition: Option<&str>, trip: &Trip) -> Self {
        Self {
            transition: transition.map(str::to_string),
            cause: trip.cause().clone(),
            trigger: trip.trigger().map(str::to_string),
            route: trip.trail().to_vec(),
            trip_id: trip.id(),
        }
    }
}

/// Why a transition attempt was refused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum FailureReason {
    /// The guard evaluated to false.
    GuardRejected,
    /// The supplier state is not current any more.
    SupplierNotCurrent,
    /// The consumer state is already current and the edge is not a self-loop.
    ConsumerAlreadyCurrent,
}

/// Events published to machine listeners.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum MachineEvent {
    StateExited {
        state: String,
        report: TransitionReport,
    },
    StateEntered {
        state: String,
        report: TransitionReport,
    },
    StateChanged {
        from: Option<String>,
        to: String,
        report: TransitionReport,
    },
    TransitionSucceeded(TransitionReport),
    TransitionFailed {
        reason: FailureReason,
        report: TransitionReport,
    },
    Fault(Fault),
}

/// Handle returned by [`crate::Machine::subscribe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

pub(crate) type Listener = Arc<dyn Fn(&MachineEvent) + Send + Sync>;

#[derive(Default)]
pub(crate) struct Observers {
    listeners: RwLock<Vec<(ListenerId, Listener)>>,
    next_id: AtomicU64,
}

impl Observers {
    pub(crate) fn subscribe(&self, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, listener));
        id
    }

    pub(crate) fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    /// Deliver `event` to every listener. A panicking listener is logged
    /// and skipped; it never unwinds into the engine.
    pub(crate) fn notify(&self, machine: &str, event: &MachineEvent) {
        let snapshot: Vec<Listener> = self
            .listeners
            .read()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in snapshot {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| listener(event))) {
                tracing::warn!(
                    machine = %machine,
                    panic = %panic_message(payload.as_ref()),
                    "machine listener panicked"
                );
            }
        }
    }
}
