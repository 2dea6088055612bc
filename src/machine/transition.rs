//! Transition nodes and the exit/enter hand-off.

use super::engine::Scope;
use super::events::{FailureReason, MachineEvent, TransitionReport};
use super::trigger::{TripSink, Trigger};
use super::{Action, StateId, TransitionId};
use crate::core::{Fault, FaultSource, Guard, Result, Trip, VisitToken, Waypoint};
use std::sync::Arc;

pub(crate) struct TransitionNode {
    pub(crate) id: TransitionId,
    pub(crate) name: String,
    pub(crate) supplier: StateId,
    pub(crate) consumer: StateId,
    pub(crate) triggers: Vec<Trigger>,
    pub(crate) guard: Option<Guard>,
    pub(crate) effect: Option<Action>,
}

impl TransitionNode {
    pub(crate) fn new(id: TransitionId, name: String, supplier: StateId, consumer: StateId) -> Self {
        Self {
            id,
            name,
            supplier,
            consumer,
            triggers: Vec::new(),
            guard: None,
            effect: None,
        }
    }

    /// A passive transition has no triggers and only fires on signal.
    pub(crate) fn is_passive(&self) -> bool {
        self.triggers.is_empty()
    }

    pub(crate) fn is_self_loop(&self) -> bool {
        self.supplier == self.consumer
    }

    pub(crate) fn activate(&self, token: &VisitToken, lazy: bool, scope: Scope<'_>) {
        for trigger in self.triggers.iter().filter(|t| t.is_lazy() == lazy) {
            let sink = TripSink::new(scope.shared.handle(), self.id, trigger);
            trigger.activate(token.clone(), sink);
        }
    }

    pub(crate) fn deactivate(&self) {
        for trigger in &self.triggers {
            trigger.deactivate();
        }
    }

    /// Execute this transition for `trip`.
    ///
    /// Returns `Ok(false)` without side effects when validation fails. A
    /// faulting guard is reported and its error returned before anything
    /// has changed.
    pub(crate) fn attempt(&self, trip: &mut Trip, scope: Scope<'_>) -> Result<bool> {
        let supplier = scope.state(self.supplier);
        let consumer = scope.state(self.consumer);

        let refusal = if !supplier.can_exit(self) {
            Some(FailureReason::SupplierNotCurrent)
        } else if !consumer.can_enter(self) {
            Some(FailureReason::ConsumerAlreadyCurrent)
        } else if !self.guard_holds(scope)? {
            Some(FailureReason::GuardRejected)
        } else {
            None
        };

        if let Some(reason) = refusal {
            tracing::debug!(
                machine = %scope.shared.name(),
                transition = %self.name,
                ?reason,
                trip = %trip.id(),
                "transition refused"
            );
            scope.shared.publish(MachineEvent::TransitionFailed {
                reason,
                report: TransitionReport::new(Some(&self.name), trip),
            });
            return Ok(false);
        }

        trip.push(Waypoint::Transition(self.name.clone()));
        supplier.exit(Some(&self.name), trip, scope);
        consumer.enter(Some(&self.name), trip, scope);

        if let Some(effect) = &self.effect {
            scope
                .shared
                .run_side_effect(FaultSource::Effect, &self.name, Arc::clone(effect), trip.clone());
        }

        scope
            .shared
            .record_entry(Some(supplier), consumer, Some(&self.name), trip);
        scope
            .shared
            .publish(MachineEvent::TransitionSucceeded(TransitionReport::new(
                Some(&self.name),
                trip,
            )));

        consumer.activate_lazy(scope);
        Ok(true)
    }

    fn guard_holds(&self, scope: Scope<'_>) -> Result<bool> {
        let Some(guard) = &self.guard else {
            return Ok(true);
        };
        guard.check().map_err(|err| {
            scope
                .shared
                .report_fault(Fault::new(FaultSource::Guard, guard.name(), err.to_string()));
            err
        })
    }
}
