//! State nodes: entry/exit gating, hooks and visit tokens.

use super::engine::Scope;
use super::events::{MachineEvent, TransitionReport};
use super::transition::TransitionNode;
use super::{Action, StateId, TransitionId};
use crate::core::{FaultSource, Trip, VisitToken, Waypoint};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub(crate) struct StateNode {
    pub(crate) id: StateId,
    pub(crate) name: String,
    /// Outbound transitions in declaration order.
    pub(crate) outbound: Vec<TransitionId>,
    pub(crate) entry: Vec<Action>,
    pub(crate) exit: Vec<Action>,
    pub(crate) activity: Vec<Action>,
    current: AtomicBool,
    enabled: AtomicBool,
    visit: Mutex<Option<VisitToken>>,
}

impl StateNode {
    pub(crate) fn new(id: StateId, name: String) -> Self {
        Self {
            id,
            name,
            outbound: Vec::new(),
            entry: Vec::new(),
            exit: Vec::new(),
            activity: Vec::new(),
            current: AtomicBool::new(false),
            enabled: AtomicBool::new(false),
            visit: Mutex::new(None),
        }
    }

    pub(crate) fn is_current(&self) -> bool {
        self.current.load(Ordering::SeqCst)
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Token of the ongoing visit, if the state is enabled.
    pub(crate) fn visit_token(&self) -> Option<VisitToken> {
        self.visit.lock().clone()
    }

    /// Refuses a second entry while current, unless `via` is a self-loop.
    pub(crate) fn can_enter(&self, via: &TransitionNode) -> bool {
        if self.is_current() && !via.is_self_loop() {
            tracing::debug!(
                state = %self.name,
                transition = %via.name,
                "entry refused: state is already current"
            );
            return false;
        }
        true
    }

    /// Refuses to exit a state that is no longer current.
    pub(crate) fn can_exit(&self, via: &TransitionNode) -> bool {
        if !self.is_current() {
            tracing::debug!(
                state = %self.name,
                transition = %via.name,
                "exit refused: state is not current"
            );
            return false;
        }
        true
    }

    /// Make this state current.
    ///
    /// Outbound triggers are enabled only after every entry hook has run.
    pub(crate) fn enter(&self, via: Option<&str>, trip: &mut Trip, scope: Scope<'_>) {
        self.current.store(true, Ordering::SeqCst);
        trip.push(Waypoint::State(self.name.clone()));

        for hook in &self.entry {
            scope
                .shared
                .run_inline(FaultSource::EntryHook, &self.name, hook, trip);
        }
        self.enable(scope);

        scope.shared.publish(MachineEvent::StateEntered {
            state: self.name.clone(),
            report: TransitionReport::new(via, trip),
        });

        for activity in &self.activity {
            scope.shared.run_side_effect(
                FaultSource::DoBehavior,
                &self.name,
                Arc::clone(activity),
                trip.clone(),
            );
        }
    }

    /// Leave this state.
    ///
    /// The visit token is revoked before any exit hook runs, so nothing
    /// fired from an exit hook can be honored against this visit.
    pub(crate) fn exit(&self, via: Option<&str>, trip: &mut Trip, scope: Scope<'_>) {
        self.current.store(false, Ordering::SeqCst);
        self.disable(scope);

        for hook in &self.exit {
            scope
                .shared
                .run_inline(FaultSource::ExitHook, &self.name, hook, trip);
        }

        scope.shared.publish(MachineEvent::StateExited {
            state: self.name.clone(),
            report: TransitionReport::new(via, trip),
        });
    }

    /// Mint a visit token and activate eager outbound triggers. Idempotent.
    pub(crate) fn enable(&self, scope: Scope<'_>) {
        if self.enabled.swap(true, Ordering::SeqCst) {
            return;
        }
        let token = VisitToken::mint();
        *self.visit.lock() = Some(token.clone());

        for id in &self.outbound {
            scope.transition(*id).activate(&token, false, scope);
        }
        tracing::debug!(state = %self.name, visit = token.id(), "state enabled");
    }

    /// Revoke the visit token and deactivate every outbound trigger. Idempotent.
    pub(crate) fn disable(&self, scope: Scope<'_>) {
        if !self.enabled.swap(false, Ordering::SeqCst) {
            return;
        }
        let token = self.visit.lock().take();
        if let Some(token) = &token {
            token.revoke();
        }

        for id in &self.outbound {
            scope.transition(*id).deactivate();
        }
        tracing::debug!(
            state = %self.name,
            visit = ?token.as_ref().map(VisitToken::id),
            "state disabled"
        );
    }

    /// Activate lazy triggers once the state has settled.
    pub(crate) fn activate_lazy(&self, scope: Scope<'_>) {
        let Some(token) = self.visit_token() else {
            return;
        };
        for id in &self.outbound {
            scope.transition(*id).activate(&token, true, scope);
        }
    }
}
