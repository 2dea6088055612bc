//! The machine: state arena, build phases and the serialized attempt protocol.
//!
//! Every transition request, whether it comes from a trigger, a signal, a
//! direct `try_transition_to` or an administrative jump, runs while holding
//! the machine's [`Synchronizer`]. At most one exit/enter hand-off is
//! therefore in flight per synchronizer at any instant, including across
//! sibling machines that share one.
//!
//! Callbacks that run inside a hand-off (hooks, inline effects) must not
//! start another one. Trigger deliveries that arrive that way are deferred
//! until the running attempt completes, and listener notifications are
//! queued and published once the serialized section has finished its work.

use super::events::{ListenerId, MachineEvent, Observers};
use super::scheduler::Scheduler;
use super::state::StateNode;
use super::transition::TransitionNode;
use super::trigger::{Trigger, TriggerState};
use super::{Action, StateId, TransitionId};
use crate::builder::{validation, TransitionBuilder};
use crate::config::MachineOptions;
use crate::core::{
    BoxError, Cause, Fault, FaultSource, Guard, MachineError, Result, RouteHistory,
    RouteRecord, Trip, VisitToken,
};
use chrono::Utc;
use parking_lot::{Mutex, MutexGuard, ReentrantMutex, ReentrantMutexGuard, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, Weak};

/// Re-entrant lock serializing transition attempts.
///
/// Clone it into several machines to serialize their transitions against
/// each other. Work that arrives while an attempt is in flight (trigger
/// trips, listener notifications) is parked in a backlog and run by the
/// outermost holder once the attempt has finished.
#[derive(Clone, Default)]
pub struct Synchronizer {
    core: Arc<SyncCore>,
}

#[derive(Default)]
struct SyncCore {
    lock: ReentrantMutex<()>,
    depth: AtomicUsize,
    backlog: Mutex<VecDeque<Backlog>>,
}

enum Backlog {
    Notify(Weak<Shared>, MachineEvent),
    Deliver {
        machine: Weak<Shared>,
        transition: TransitionId,
        trigger: Arc<TriggerState>,
        trip: Trip,
    },
}

impl Synchronizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_shared_with(&self, other: &Synchronizer) -> bool {
        Arc::ptr_eq(&self.core, &other.core)
    }

    fn lock(&self) -> ReentrantMutexGuard<'_, ()> {
        self.core.lock.lock()
    }

    /// Whether the calling thread holds the lock, directly or through an
    /// enclosing hand-off or listener.
    fn held_here(&self) -> bool {
        self.core.lock.is_owned_by_current_thread()
    }

    /// Whether the lock holder is inside an exit/enter hand-off.
    fn in_flight(&self) -> bool {
        self.core.depth.load(Ordering::SeqCst) > 0
    }

    fn enter_flight(&self) -> InFlight<'_> {
        self.core.depth.fetch_add(1, Ordering::SeqCst);
        InFlight(&self.core.depth)
    }

    /// Queue `event` if an attempt is in flight; hand it back otherwise.
    fn park_event(&self, machine: Weak<Shared>, event: MachineEvent) -> Option<MachineEvent> {
        let mut backlog = self.core.backlog.lock();
        if self.in_flight() {
            backlog.push_back(Backlog::Notify(machine, event));
            return None;
        }
        Some(event)
    }

    fn park_delivery(&self, item: Backlog) {
        self.core.backlog.lock().push_back(item);
    }

    /// Run parked work until the backlog is empty. Caller holds the lock
    /// and is not in flight.
    fn drain(&self) {
        loop {
            let next = self.core.backlog.lock().pop_front();
            match next {
                None => break,
                Some(Backlog::Notify(machine, event)) => {
                    if let Some(machine) = machine.upgrade() {
                        machine.observers.notify(machine.name(), &event);
                    }
                }
                Some(Backlog::Deliver {
                    machine,
                    transition,
                    trigger,
                    trip,
                }) => {
                    let Some(machine) = machine.upgrade() else {
                        continue;
                    };
                    if let Some(scope) = machine.frozen() {
                        let _flight = self.enter_flight();
                        machine.deliver_locked(scope, transition, &trigger, trip);
                    }
                }
            }
        }
    }
}

impl fmt::Debug for Synchronizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Synchronizer")
            .field("handles", &Arc::strong_count(&self.core))
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

/// Phase label reported while an editor holds the draft.
const EDITING: &str = "editing";

/// Lifecycle phase of a machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    /// Topology is editable; no state is current.
    Building,
    /// Topology is frozen and a state is current.
    Assembled,
}

impl Phase {
    fn label(self) -> &'static str {
        match self {
            Self::Building => "building",
            Self::Assembled => "assembled",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Read-only description of one transition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TransitionInfo {
    pub id: TransitionId,
    pub name: String,
    pub supplier: String,
    pub consumer: String,
    pub passive: bool,
    pub guard: Option<String>,
    pub triggers: Vec<String>,
}

#[derive(Default)]
pub(crate) struct Topology {
    pub(crate) states: Vec<StateNode>,
    pub(crate) transitions: Vec<TransitionNode>,
    index: HashMap<String, StateId>,
    pub(crate) initial: Option<StateId>,
}

impl Topology {
    pub(crate) fn state(&self, id: StateId) -> &StateNode {
        &self.states[id.0]
    }

    pub(crate) fn transition(&self, id: TransitionId) -> &TransitionNode {
        &self.transitions[id.0]
    }

    pub(crate) fn find(&self, name: &str) -> Result<StateId> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| MachineError::UnknownState(name.to_string()))
    }

    fn state_mut(&mut self, name: &str) -> Result<&mut StateNode> {
        let id = self.find(name)?;
        Ok(&mut self.states[id.0])
    }

    fn transition_mut(&mut self, id: TransitionId) -> Result<&mut TransitionNode> {
        self.transitions
            .get_mut(id.0)
            .ok_or(MachineError::UnknownTransition(id.0))
    }

    fn info(&self, transition: &TransitionNode) -> TransitionInfo {
        TransitionInfo {
            id: transition.id,
            name: transition.name.clone(),
            supplier: self.state(transition.supplier).name.clone(),
            consumer: self.state(transition.consumer).name.clone(),
            passive: transition.is_passive(),
            guard: transition.guard.as_ref().map(|g| g.name().to_string()),
            triggers: transition
                .triggers
                .iter()
                .map(|t| t.name().to_string())
                .collect(),
        }
    }
}

/// Borrowed view of a frozen machine passed through the attempt path.
#[derive(Clone, Copy)]
pub(crate) struct Scope<'a> {
    pub(crate) shared: &'a Shared,
    pub(crate) topo: &'a Topology,
}

impl<'a> Scope<'a> {
    pub(crate) fn state(&self, id: StateId) -> &'a StateNode {
        self.topo.state(id)
    }

    pub(crate) fn transition(&self, id: TransitionId) -> &'a TransitionNode {
        self.topo.transition(id)
    }
}

/// Marks the lock holder as being inside a transition attempt.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub(crate) struct Shared {
    weak: Weak<Shared>,
    options: MachineOptions,
    synchronizer: Synchronizer,
    draft: Mutex<Option<Topology>>,
    topology: OnceLock<Topology>,
    assembled: AtomicBool,
    current: RwLock<Option<StateId>>,
    history: Mutex<RouteHistory>,
    observers: Observers,
    trigger_scheduler: Option<Scheduler>,
    effect_scheduler: Option<Scheduler>,
}

impl Shared {
    pub(crate) fn name(&self) -> &str {
        &self.options.name
    }

    pub(crate) fn handle(&self) -> Weak<Shared> {
        self.weak.clone()
    }

    fn phase(&self) -> Phase {
        if self.assembled.load(Ordering::SeqCst) {
            Phase::Assembled
        } else {
            Phase::Building
        }
    }

    fn frozen(&self) -> Option<Scope<'_>> {
        self.topology.get().map(|topo| Scope { shared: self, topo })
    }

    /// Scope for a run-time operation; fails until assembly has completed.
    fn scope(&self, operation: &'static str) -> Result<Scope<'_>> {
        let invalid = MachineError::InvalidOperation {
            operation,
            phase: self.phase().label(),
        };
        if self.phase() != Phase::Assembled {
            return Err(invalid);
        }
        self.frozen().ok_or(invalid)
    }

    fn current_id(&self) -> Option<StateId> {
        *self.current.read()
    }

    fn current_token(&self, scope: Scope<'_>) -> Option<VisitToken> {
        self.current_id()
            .and_then(|id| scope.state(id).visit_token())
    }

    /// Publish now, or queue until the running attempt has finished.
    pub(crate) fn publish(&self, event: MachineEvent) {
        if let Some(event) = self.synchronizer.park_event(self.handle(), event) {
            self.observers.notify(self.name(), &event);
        }
    }

    pub(crate) fn report_fault(&self, fault: Fault) {
        tracing::warn!(machine = %self.name(), %fault, "callback fault captured");
        self.publish(MachineEvent::Fault(fault));
    }

    /// Run a hook on the calling thread, reporting any failure.
    pub(crate) fn run_inline(&self, source: FaultSource, origin: &str, action: &Action, trip: &Trip) {
        if let Err(fault) = invoke(source, origin, action, trip) {
            self.report_fault(fault);
        }
    }

    /// Run an effect or do-behavior, on the effect scheduler when present.
    pub(crate) fn run_side_effect(&self, source: FaultSource, origin: &str, action: Action, trip: Trip) {
        let Some(scheduler) = &self.effect_scheduler else {
            self.run_inline(source, origin, &action, &trip);
            return;
        };

        let machine = self.handle();
        let origin = origin.to_string();
        let queued = scheduler.enqueue(move || {
            if let Err(fault) = invoke(source, &origin, &action, &trip) {
                match machine.upgrade() {
                    Some(machine) => machine.report_fault(fault),
                    None => tracing::warn!(%fault, "fault after machine teardown"),
                }
            }
        });
        if !queued {
            tracing::warn!(machine = %self.name(), %source, "effect scheduler stopped, side effect dropped");
        }
    }

    /// Route a trigger trip to delivery, hopping onto the trigger scheduler
    /// when one is configured.
    pub(crate) fn dispatch(&self, transition: TransitionId, trigger: Arc<TriggerState>, trip: Trip) {
        let Some(scheduler) = &self.trigger_scheduler else {
            self.deliver(transition, &trigger, trip);
            return;
        };

        let machine = self.handle();
        let queued = scheduler.enqueue(move || {
            if let Some(machine) = machine.upgrade() {
                machine.deliver(transition, &trigger, trip);
            }
        });
        if !queued {
            tracing::warn!(machine = %self.name(), "trigger scheduler stopped, trip dropped");
        }
    }

    fn deliver(&self, transition: TransitionId, trigger: &Arc<TriggerState>, trip: Trip) {
        let Some(scope) = self.frozen() else {
            return;
        };
        let sync = &self.synchronizer;
        let _guard = sync.lock();
        if sync.in_flight() {
            tracing::debug!(
                machine = %self.name(),
                trigger = %trigger.name(),
                trip = %trip.id(),
                "trip deferred until the running attempt completes"
            );
            sync.park_delivery(Backlog::Deliver {
                machine: self.handle(),
                transition,
                trigger: Arc::clone(trigger),
                trip,
            });
            return;
        }

        {
            let _flight = sync.enter_flight();
            self.deliver_locked(scope, transition, trigger, trip);
        }
        sync.drain();
    }

    fn deliver_locked(
        &self,
        scope: Scope<'_>,
        transition: TransitionId,
        trigger: &TriggerState,
        mut trip: Trip,
    ) {
        if trip.is_stale() || !trigger.is_active() {
            tracing::debug!(
                machine = %self.name(),
                trigger = %trigger.name(),
                trip = %trip.id(),
                "stale trip rejected"
            );
            return;
        }

        let outcome = self
            .attempt_unsafe(scope, transition, &mut trip)
            .and_then(|moved| {
                if moved {
                    self.advance(scope, &mut trip)?;
                }
                Ok(moved)
            });
        if let Err(err) = outcome {
            tracing::warn!(
                machine = %self.name(),
                trigger = %trigger.name(),
                error = %err,
                "trigger delivery aborted"
            );
        }
    }

    /// Run `work` as the outermost holder of the synchronizer.
    fn serialized<T>(
        &self,
        scope: Scope<'_>,
        operation: &'static str,
        work: impl FnOnce(Scope<'_>) -> Result<T>,
    ) -> Result<T> {
        let sync = &self.synchronizer;
        let _guard = sync.lock();
        if sync.in_flight() {
            return Err(MachineError::Reentrant(operation));
        }
        let result = {
            let _flight = sync.enter_flight();
            work(scope)
        };
        sync.drain();
        result
    }

    /// Attempt one transition. Caller must hold the synchronizer.
    fn attempt_unsafe(&self, scope: Scope<'_>, transition: TransitionId, trip: &mut Trip) -> Result<bool> {
        if trip.is_stale() {
            tracing::debug!(machine = %self.name(), trip = %trip.id(), "stale trip rejected");
            return Ok(false);
        }
        scope.transition(transition).attempt(trip, scope)
    }

    /// Try the passive transitions of the current state in declaration
    /// order; the first one that completes wins.
    fn stimulate_unsafe(&self, scope: Scope<'_>, trip: &mut Trip) -> Result<bool> {
        let Some(current) = self.current_id() else {
            return Ok(false);
        };
        for id in &scope.state(current).outbound {
            if scope.transition(*id).is_passive() && self.attempt_unsafe(scope, *id, trip)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Chain through passive transitions while auto-advance is enabled.
    fn advance(&self, scope: Scope<'_>, trip: &mut Trip) -> Result<()> {
        if !self.options.auto_advance {
            return Ok(());
        }
        let mut steps = 0;
        loop {
            if steps >= self.options.max_auto_advance {
                tracing::warn!(
                    machine = %self.name(),
                    steps,
                    route = %trip.route(),
                    "auto-advance step limit reached"
                );
                return Ok(());
            }
            trip.rebind(self.current_token(scope));
            if !self.stimulate_unsafe(scope, trip)? {
                return Ok(());
            }
            steps += 1;
        }
    }

    /// Leave the current state (if any) and enter `target` directly.
    fn jump_locked(&self, scope: Scope<'_>, target: StateId, trip: &mut Trip) {
        let from = self.current_id().map(|id| scope.state(id));
        if let Some(from) = from {
            from.exit(None, trip, scope);
        }
        let to = scope.state(target);
        to.enter(None, trip, scope);
        self.record_entry(from, to, None, trip);
        to.activate_lazy(scope);
    }

    /// Bookkeeping once `to` has been entered: current pointer, route
    /// history and the state-changed event.
    pub(crate) fn record_entry(
        &self,
        from: Option<&StateNode>,
        to: &StateNode,
        transition: Option<&str>,
        trip: &Trip,
    ) {
        *self.current.write() = Some(to.id);

        let from_name = from.map(|s| s.name.clone());
        self.history.lock().record(RouteRecord {
            from: from_name.clone(),
            to: to.name.clone(),
            transition: transition.map(str::to_string),
            trigger: trip.trigger().map(str::to_string),
            trip_id: trip.id(),
            timestamp: Utc::now(),
        });

        tracing::info!(
            machine = %self.name(),
            from = from_name.as_deref().unwrap_or("-"),
            to = %to.name,
            transition = transition.unwrap_or("-"),
            trigger = trip.trigger().unwrap_or("-"),
            "state changed"
        );

        self.publish(MachineEvent::StateChanged {
            from: from_name,
            to: to.name.clone(),
            report: super::events::TransitionReport::new(transition, trip),
        });
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        if let Some(topo) = self.topology.get() {
            let scope = Scope { shared: self, topo };
            for state in &topo.states {
                state.disable(scope);
            }
        }
    }
}

fn invoke(source: FaultSource, origin: &str, action: &Action, trip: &Trip) -> std::result::Result<(), Fault> {
    match catch_unwind(AssertUnwindSafe(|| action(trip))) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(Fault::new(source, origin, err.to_string())),
        Err(payload) => Err(Fault::from_panic(source, origin, payload)),
    }
}

/// An embeddable state machine.
///
/// Cloning yields another handle to the same machine.
///
/// # Example
///
/// ```rust
/// use turnstile::{Machine, MachineOptions};
///
/// let machine = Machine::new(MachineOptions::named("door")).unwrap();
/// let mut editor = machine.begin_edit().unwrap();
/// editor.add_state("Closed").unwrap();
/// editor.add_state("Open").unwrap();
/// editor.add_transition("Closed", "Open").unwrap();
/// editor.set_initial_state("Closed").unwrap();
/// editor.complete().unwrap();
///
/// assert_eq!(machine.current_state().as_deref(), Some("Closed"));
/// assert!(machine.signal("push").unwrap());
/// assert_eq!(machine.current_state().as_deref(), Some("Open"));
/// assert!(!machine.signal("push").unwrap());
/// ```
#[derive(Clone)]
pub struct Machine {
    shared: Arc<Shared>,
}

impl Machine {
    /// Create a machine with a private synchronizer.
    pub fn new(options: MachineOptions) -> Result<Self> {
        Self::with_synchronizer(options, Synchronizer::new())
    }

    /// Create a machine serialized by `synchronizer`, which may be shared
    /// with other machines.
    pub fn with_synchronizer(options: MachineOptions, synchronizer: Synchronizer) -> Result<Self> {
        options.validate()?;
        let trigger_scheduler = if options.trigger_scheduler {
            Some(Scheduler::spawn(format!("{}-triggers", options.name))?)
        } else {
            None
        };
        let effect_scheduler = if options.effect_scheduler {
            Some(Scheduler::spawn(format!("{}-effects", options.name))?)
        } else {
            None
        };
        let history = RouteHistory::with_limit(options.history_limit);

        let shared = Arc::new_cyclic(|weak| Shared {
            weak: weak.clone(),
            options,
            synchronizer,
            draft: Mutex::new(Some(Topology::default())),
            topology: OnceLock::new(),
            assembled: AtomicBool::new(false),
            current: RwLock::new(None),
            history: Mutex::new(history),
            observers: Observers::default(),
            trigger_scheduler,
            effect_scheduler,
        });
        Ok(Self { shared })
    }

    pub fn name(&self) -> &str {
        self.shared.name()
    }

    pub fn options(&self) -> &MachineOptions {
        &self.shared.options
    }

    pub fn phase(&self) -> Phase {
        self.shared.phase()
    }

    pub fn synchronizer(&self) -> Synchronizer {
        self.shared.synchronizer.clone()
    }

    /// Start editing the topology.
    ///
    /// The returned editor holds the build lock until it is dropped or
    /// completed. Fails once the machine is assembled, and while another
    /// editor is open.
    pub fn begin_edit(&self) -> Result<Editor<'_>> {
        let draft = self.shared.draft.try_lock().ok_or(MachineError::InvalidOperation {
            operation: "begin_edit",
            phase: EDITING,
        })?;
        if draft.is_none() {
            return Err(MachineError::InvalidOperation {
                operation: "begin_edit",
                phase: Phase::Assembled.label(),
            });
        }
        Ok(Editor {
            shared: &self.shared,
            draft,
        })
    }

    /// Freeze the topology and enter the initial state.
    pub fn complete_build(&self) -> Result<()> {
        self.begin_edit()?.complete()
    }

    /// Try the current state's passive transitions, in declaration order.
    ///
    /// Returns whether a transition was executed.
    pub fn signal(&self, origin: &str) -> Result<bool> {
        let scope = self.shared.scope("signal")?;
        self.shared.serialized(scope, "signal", |scope| {
            let mut trip = Trip::new(
                Cause::Signal(origin.to_string()),
                self.shared.current_token(scope),
            );
            self.stimulate_trip(scope, &mut trip)
        })
    }

    /// Offer `trip` to the current state's passive transitions.
    ///
    /// A trip whose visit token has been revoked is rejected.
    pub fn stimulate(&self, mut trip: Trip) -> Result<bool> {
        let scope = self.shared.scope("stimulate")?;
        self.shared
            .serialized(scope, "stimulate", |scope| self.stimulate_trip(scope, &mut trip))
    }

    fn stimulate_trip(&self, scope: Scope<'_>, trip: &mut Trip) -> Result<bool> {
        let moved = self.shared.stimulate_unsafe(scope, trip)?;
        if moved {
            self.shared.advance(scope, trip)?;
        }
        Ok(moved)
    }

    /// Take the first transition from the current state to `target` that
    /// completes, triggered or not.
    ///
    /// Returns whether the current state actually changed.
    pub fn try_transition_to(&self, target: &str) -> Result<bool> {
        let scope = self.shared.scope("try_transition_to")?;
        self.shared.serialized(scope, "try_transition_to", |scope| {
            let target = scope.topo.find(target)?;
            let Some(current) = self.shared.current_id() else {
                return Ok(false);
            };
            let mut trip = Trip::new(
                Cause::Direct(scope.state(target).name.clone()),
                scope.state(current).visit_token(),
            );
            for id in &scope.state(current).outbound {
                if scope.transition(*id).consumer != target {
                    continue;
                }
                if self.shared.attempt_unsafe(scope, *id, &mut trip)? {
                    self.shared.advance(scope, &mut trip)?;
                    return Ok(self.shared.current_id() != Some(current));
                }
            }
            Ok(false)
        })
    }

    /// Enter `target` directly, bypassing transitions and guards.
    pub fn jump_to(&self, target: &str) -> Result<()> {
        let scope = self.shared.scope("jump_to")?;
        self.shared.serialized(scope, "jump_to", |scope| {
            let target = scope.topo.find(target)?;
            let mut trip = Trip::new(Cause::Jump, self.shared.current_token(scope));
            self.shared.jump_locked(scope, target, &mut trip);
            Ok(())
        })
    }

    /// Name of the current state; `None` before assembly.
    pub fn current_state(&self) -> Option<String> {
        let scope = self.shared.frozen()?;
        self.shared
            .current_id()
            .map(|id| scope.state(id).name.clone())
    }

    pub fn is_current(&self, state: &str) -> Result<bool> {
        self.read_topology("is_current", |topo| Ok(topo.state(topo.find(state)?).is_current()))
    }

    pub fn is_enabled(&self, state: &str) -> Result<bool> {
        self.read_topology("is_enabled", |topo| Ok(topo.state(topo.find(state)?).is_enabled()))
    }

    /// Token of the ongoing visit to `state`; `None` unless it is current.
    pub fn visit_token(&self, state: &str) -> Result<Option<VisitToken>> {
        self.read_topology("visit_token", |topo| Ok(topo.state(topo.find(state)?).visit_token()))
    }

    /// Declared state names, in declaration order.
    ///
    /// Empty while an editor is open.
    pub fn state_names(&self) -> Vec<String> {
        self.read_topology("state_names", |topo| {
            Ok(topo.states.iter().map(|s| s.name.clone()).collect())
        })
        .unwrap_or_default()
    }

    /// Outbound transitions of `state`, in declaration order.
    pub fn outbound(&self, state: &str) -> Result<Vec<TransitionInfo>> {
        self.read_topology("outbound", |topo| {
            let id = topo.find(state)?;
            Ok(topo
                .state(id)
                .outbound
                .iter()
                .map(|t| topo.info(topo.transition(*t)))
                .collect())
        })
    }

    /// Snapshot of the route history.
    pub fn history(&self) -> RouteHistory {
        self.shared.history.lock().clone()
    }

    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&MachineEvent) + Send + Sync + 'static,
    {
        self.shared.observers.subscribe(Arc::new(listener))
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.shared.observers.unsubscribe(id)
    }

    /// Wait until work queued on the schedulers before this call has run.
    ///
    /// A no-op for fully synchronous machines, and when called from a hook,
    /// effect or listener that holds the synchronizer: the trigger worker
    /// needs that lock to make progress.
    pub fn settle(&self) {
        if self.shared.synchronizer.held_here() {
            tracing::debug!(machine = %self.name(), "settle skipped inside a serialized section");
            return;
        }
        let schedulers = [&self.shared.trigger_scheduler, &self.shared.effect_scheduler];
        for _ in 0..2 {
            for scheduler in schedulers.iter().copied().flatten() {
                scheduler.flush();
            }
        }
    }

    /// Read the frozen topology, or the draft when no editor holds it.
    fn read_topology<T>(
        &self,
        operation: &'static str,
        read: impl FnOnce(&Topology) -> Result<T>,
    ) -> Result<T> {
        if let Some(topo) = self.shared.topology.get() {
            return read(topo);
        }
        let busy = MachineError::InvalidOperation {
            operation,
            phase: EDITING,
        };
        let draft = self.shared.draft.try_lock().ok_or(busy)?;
        match draft.as_ref() {
            Some(topo) => read(topo),
            // The draft is only taken right before the topology is frozen.
            None => match self.shared.topology.get() {
                Some(topo) => read(topo),
                None => read(&Topology::default()),
            },
        }
    }
}

impl fmt::Debug for Machine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Machine")
            .field("name", &self.name())
            .field("phase", &self.phase())
            .field("current", &self.current_state())
            .finish()
    }
}

/// Exclusive access to a machine's topology while it is being built.
pub struct Editor<'a> {
    shared: &'a Shared,
    draft: MutexGuard<'a, Option<Topology>>,
}

impl<'a> Editor<'a> {
    fn draft(&mut self, operation: &'static str) -> Result<&mut Topology> {
        self.draft.as_mut().ok_or(MachineError::InvalidOperation {
            operation,
            phase: Phase::Assembled.label(),
        })
    }

    pub fn add_state(&mut self, name: impl Into<String>) -> Result<StateId> {
        let name = name.into();
        let topo = self.draft("add_state")?;
        if topo.index.contains_key(&name) {
            return Err(MachineError::DuplicateState(name));
        }
        let id = StateId(topo.states.len());
        topo.index.insert(name.clone(), id);
        topo.states.push(StateNode::new(id, name));
        Ok(id)
    }

    pub fn add_states<I, N>(&mut self, names: I) -> Result<Vec<StateId>>
    where
        I: IntoIterator<Item = N>,
        N: Into<String>,
    {
        names.into_iter().map(|n| self.add_state(n)).collect()
    }

    /// Declare a transition from `supplier` to `consumer`.
    ///
    /// Outbound transitions are tried in the order they are declared.
    pub fn add_transition(&mut self, supplier: &str, consumer: &str) -> Result<TransitionId> {
        let topo = self.draft("add_transition")?;
        let from = topo.find(supplier)?;
        let to = topo.find(consumer)?;

        let base = format!("{supplier}->{consumer}");
        let twins = topo
            .transitions
            .iter()
            .filter(|t| t.supplier == from && t.consumer == to)
            .count();
        let name = if twins == 0 {
            base
        } else {
            format!("{base}#{}", twins + 1)
        };

        let id = TransitionId(topo.transitions.len());
        topo.transitions.push(TransitionNode::new(id, name, from, to));
        topo.states[from.0].outbound.push(id);
        Ok(id)
    }

    pub fn add_trigger(&mut self, transition: TransitionId, trigger: impl Into<Trigger>) -> Result<()> {
        self.draft("add_trigger")?
            .transition_mut(transition)?
            .triggers
            .push(trigger.into());
        Ok(())
    }

    pub fn set_guard(&mut self, transition: TransitionId, guard: Guard) -> Result<()> {
        self.draft("set_guard")?.transition_mut(transition)?.guard = Some(guard);
        Ok(())
    }

    /// Action run after the consumer has been entered and before the
    /// success event.
    pub fn set_effect<F>(&mut self, transition: TransitionId, effect: F) -> Result<()>
    where
        F: Fn(&Trip) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        self.set_effect_action(transition, Arc::new(effect))
    }

    fn set_effect_action(&mut self, transition: TransitionId, effect: Action) -> Result<()> {
        self.draft("set_effect")?.transition_mut(transition)?.effect = Some(effect);
        Ok(())
    }

    pub fn on_entry<F>(&mut self, state: &str, hook: F) -> Result<()>
    where
        F: Fn(&Trip) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        self.draft("on_entry")?.state_mut(state)?.entry.push(Arc::new(hook));
        Ok(())
    }

    pub fn on_exit<F>(&mut self, state: &str, hook: F) -> Result<()>
    where
        F: Fn(&Trip) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        self.draft("on_exit")?.state_mut(state)?.exit.push(Arc::new(hook));
        Ok(())
    }

    /// Behavior started once the state has been entered; runs on the
    /// effect scheduler when one is configured.
    pub fn on_do<F>(&mut self, state: &str, behavior: F) -> Result<()>
    where
        F: Fn(&Trip) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        self.draft("on_do")?
            .state_mut(state)?
            .activity
            .push(Arc::new(behavior));
        Ok(())
    }

    pub fn set_initial_state(&mut self, name: &str) -> Result<()> {
        let topo = self.draft("set_initial_state")?;
        let id = topo.find(name)?;
        match topo.initial {
            Some(existing) if existing != id => Err(MachineError::InitialStateAlreadySet {
                existing: topo.state(existing).name.clone(),
                requested: name.to_string(),
            }),
            _ => {
                topo.initial = Some(id);
                Ok(())
            }
        }
    }

    /// Declare a transition assembled with a [`TransitionBuilder`].
    pub fn install(&mut self, builder: TransitionBuilder) -> Result<TransitionId> {
        let parts = builder.into_parts()?;
        let id = self.add_transition(&parts.from, &parts.to)?;
        if let Some(guard) = parts.guard {
            self.set_guard(id, guard)?;
        }
        for trigger in parts.triggers {
            self.add_trigger(id, trigger)?;
        }
        if let Some(effect) = parts.effect {
            self.set_effect_action(id, effect)?;
        }
        Ok(id)
    }

    #[cfg(test)]
    pub(crate) fn with_topology<T>(&self, read: impl FnOnce(&Topology) -> T) -> Option<T> {
        self.draft.as_ref().map(read)
    }

    /// Validate and freeze the topology, then enter the initial state.
    ///
    /// On a validation failure the draft is left untouched so it can be
    /// fixed and completed again.
    pub fn complete(self) -> Result<()> {
        let Self { shared, mut draft } = self;
        let invalid = || MachineError::InvalidOperation {
            operation: "complete_build",
            phase: Phase::Assembled.label(),
        };

        let initial = {
            let topo = draft.as_ref().ok_or_else(invalid)?;
            validation::check(topo)?;
            topo.initial
                .ok_or(MachineError::AssemblyFailed(vec![
                    crate::core::AssemblyIssue::MissingInitialState,
                ]))?
        };

        // Nothing is committed until the synchronizer is ours.
        let sync = &shared.synchronizer;
        let _guard = sync.lock();
        if sync.in_flight() {
            return Err(MachineError::Reentrant("complete_build"));
        }

        let topo = draft.take().ok_or_else(invalid)?;
        let (states, transitions) = (topo.states.len(), topo.transitions.len());
        if shared.topology.set(topo).is_err() {
            return Err(invalid());
        }
        drop(draft);

        let scope = shared.frozen().ok_or_else(invalid)?;
        {
            let _flight = sync.enter_flight();
            let mut trip = Trip::new(Cause::Jump, None);
            shared.jump_locked(scope, initial, &mut trip);
            // Listeners drained below already see an assembled machine.
            shared.assembled.store(true, Ordering::SeqCst);
        }
        tracing::info!(
            machine = %shared.name(),
            states,
            transitions,
            initial = %scope.state(initial).name,
            "machine assembled"
        );
        sync.drain();
        Ok(())
    }
}
