//! Typed machine and editor.

use super::MachineState;
use crate::builder::TransitionBuilder;
use crate::config::MachineOptions;
use crate::core::{BoxError, Guard, Result, Trip};
use crate::machine::{
    Editor, ListenerId, Machine, MachineEvent, Phase, Synchronizer, TransitionId, TransitionReport,
    Trigger,
};
use std::fmt;
use std::marker::PhantomData;

/// State events projected onto the state enum.
#[derive(Clone, Debug, PartialEq)]
pub enum TypedEvent<S> {
    /// `from` is the unset value for the initial entry.
    Changed {
        from: S,
        to: S,
        report: TransitionReport,
    },
    Entered {
        state: S,
        report: TransitionReport,
    },
    Exited {
        state: S,
        report: TransitionReport,
    },
}

impl<S: MachineState> TypedEvent<S> {
    fn project(event: &MachineEvent) -> Option<Self> {
        let typed = |name: &str| S::from_name(name);
        match event {
            MachineEvent::StateChanged { from, to, report } => Some(Self::Changed {
                from: from.as_deref().and_then(typed).unwrap_or_else(S::unset),
                to: typed(to)?,
                report: report.clone(),
            }),
            MachineEvent::StateEntered { state, report } => Some(Self::Entered {
                state: typed(state)?,
                report: report.clone(),
            }),
            MachineEvent::StateExited { state, report } => Some(Self::Exited {
                state: typed(state)?,
                report: report.clone(),
            }),
            _ => None,
        }
    }
}

/// A [`Machine`] whose states are the declared variants of `S`.
///
/// # Example
///
/// ```rust
/// use turnstile::state_enum;
/// use turnstile::typed::TypedMachine;
/// use turnstile::MachineOptions;
///
/// state_enum! {
///     enum Job {
///         Unset,
///         Queued,
///         Running,
///         Done,
///     }
///     unset: Unset
/// }
///
/// let job = TypedMachine::<Job>::new(MachineOptions::named("job")).unwrap();
/// assert_eq!(job.current_state(), Job::Unset);
///
/// let mut editor = job.edit().unwrap();
/// editor.add_transition(Job::Queued, Job::Running).unwrap();
/// editor.add_transition(Job::Running, Job::Done).unwrap();
/// editor.set_initial_state(Job::Queued).unwrap();
/// editor.complete().unwrap();
///
/// assert!(job.try_transition_to(Job::Running).unwrap());
/// assert!(!job.try_transition_to(Job::Queued).unwrap());
/// assert_eq!(job.current_state(), Job::Running);
/// ```
pub struct TypedMachine<S> {
    machine: Machine,
    _states: PhantomData<fn() -> S>,
}

impl<S: MachineState> TypedMachine<S> {
    /// Create a machine with one state per declared variant.
    pub fn new(options: MachineOptions) -> Result<Self> {
        Self::wrap(Machine::new(options)?)
    }

    pub fn with_synchronizer(options: MachineOptions, synchronizer: Synchronizer) -> Result<Self> {
        Self::wrap(Machine::with_synchronizer(options, synchronizer)?)
    }

    fn wrap(machine: Machine) -> Result<Self> {
        machine
            .begin_edit()?
            .add_states(S::declared().into_iter().map(|s| s.name()))?;
        Ok(Self {
            machine,
            _states: PhantomData,
        })
    }

    pub fn edit(&self) -> Result<TypedEditor<'_, S>> {
        Ok(TypedEditor {
            editor: self.machine.begin_edit()?,
            _states: PhantomData,
        })
    }

    pub fn complete_build(&self) -> Result<()> {
        self.machine.complete_build()
    }

    /// Current state, or the unset value before assembly.
    pub fn current_state(&self) -> S {
        self.machine
            .current_state()
            .and_then(|name| S::from_name(&name))
            .unwrap_or_else(S::unset)
    }

    pub fn is_current(&self, state: S) -> bool {
        self.current_state() == state
    }

    pub fn phase(&self) -> Phase {
        self.machine.phase()
    }

    pub fn signal(&self, origin: &str) -> Result<bool> {
        self.machine.signal(origin)
    }

    /// Take the first outbound transition to `target` that completes,
    /// triggered or passive. Returns whether the current state changed.
    pub fn try_transition_to(&self, target: S) -> Result<bool> {
        self.machine.try_transition_to(target.name())
    }

    pub fn jump_to(&self, target: S) -> Result<()> {
        self.machine.jump_to(target.name())
    }

    /// Listen for typed state events. Transition and fault events are
    /// available through [`Machine::subscribe`].
    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&TypedEvent<S>) + Send + Sync + 'static,
    {
        self.machine.subscribe(move |event| {
            if let Some(typed) = TypedEvent::<S>::project(event) {
                listener(&typed);
            }
        })
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.machine.unsubscribe(id)
    }

    /// The untyped machine underneath.
    pub fn machine(&self) -> &Machine {
        &self.machine
    }
}

impl<S> Clone for TypedMachine<S> {
    fn clone(&self) -> Self {
        Self {
            machine: self.machine.clone(),
            _states: PhantomData,
        }
    }
}

impl<S: MachineState> fmt::Debug for TypedMachine<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedMachine")
            .field("name", &self.machine.name())
            .field("current", &self.current_state())
            .finish()
    }
}

/// Typed wrapper around [`Editor`].
pub struct TypedEditor<'a, S> {
    editor: Editor<'a>,
    _states: PhantomData<fn() -> S>,
}

impl<'a, S: MachineState> TypedEditor<'a, S> {
    pub fn add_transition(&mut self, from: S, to: S) -> Result<TransitionId> {
        self.editor.add_transition(from.name(), to.name())
    }

    pub fn add_trigger(&mut self, transition: TransitionId, trigger: impl Into<Trigger>) -> Result<()> {
        self.editor.add_trigger(transition, trigger)
    }

    pub fn set_guard(&mut self, transition: TransitionId, guard: Guard) -> Result<()> {
        self.editor.set_guard(transition, guard)
    }

    pub fn set_effect<F>(&mut self, transition: TransitionId, effect: F) -> Result<()>
    where
        F: Fn(&Trip) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        self.editor.set_effect(transition, effect)
    }

    pub fn on_entry<F>(&mut self, state: S, hook: F) -> Result<()>
    where
        F: Fn(&Trip) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        self.editor.on_entry(state.name(), hook)
    }

    pub fn on_exit<F>(&mut self, state: S, hook: F) -> Result<()>
    where
        F: Fn(&Trip) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        self.editor.on_exit(state.name(), hook)
    }

    pub fn on_do<F>(&mut self, state: S, behavior: F) -> Result<()>
    where
        F: Fn(&Trip) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        self.editor.on_do(state.name(), behavior)
    }

    pub fn set_initial_state(&mut self, state: S) -> Result<()> {
        self.editor.set_initial_state(state.name())
    }

    pub fn install(&mut self, builder: TransitionBuilder) -> Result<TransitionId> {
        self.editor.install(builder)
    }

    /// The untyped editor, for anything not covered here.
    pub fn untyped(&mut self) -> &mut Editor<'a> {
        &mut self.editor
    }

    pub fn complete(self) -> Result<()> {
        self.editor.complete()
    }
}
