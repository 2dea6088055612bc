//! Builder for declaring transitions.

use crate::core::{BoxError, Constraint, Guard, MachineError, Result, Trip};
use crate::machine::{Action, Trigger};
use std::sync::Arc;

/// Fluent description of one transition, installed with
/// [`Editor::install`](crate::machine::Editor::install).
///
/// ```rust
/// use turnstile::builder::TransitionBuilder;
/// use turnstile::{Machine, MachineOptions};
///
/// let machine = Machine::new(MachineOptions::named("job")).unwrap();
/// let mut editor = machine.begin_edit().unwrap();
/// editor.add_states(["Queued", "Running"]).unwrap();
/// editor
///     .install(
///         TransitionBuilder::new()
///             .from("Queued")
///             .to("Running")
///             .when("worker available", || true),
///     )
///     .unwrap();
/// editor.set_initial_state("Queued").unwrap();
/// editor.complete().unwrap();
///
/// assert!(machine.signal("poll").unwrap());
/// ```
#[derive(Default)]
pub struct TransitionBuilder {
    from: Option<String>,
    to: Option<String>,
    guard: Option<Guard>,
    triggers: Vec<Trigger>,
    effect: Option<Action>,
}

/// A validated builder, ready to be wired into a topology.
pub(crate) struct TransitionParts {
    pub(crate) from: String,
    pub(crate) to: String,
    pub(crate) guard: Option<Guard>,
    pub(crate) triggers: Vec<Trigger>,
    pub(crate) effect: Option<Action>,
}

impl TransitionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the supplier state (required).
    pub fn from(mut self, state: impl Into<String>) -> Self {
        self.from = Some(state.into());
        self
    }

    /// Set the consumer state (required).
    pub fn to(mut self, state: impl Into<String>) -> Self {
        self.to = Some(state.into());
        self
    }

    /// Gate the transition on `guard`.
    pub fn guard(mut self, guard: Guard) -> Self {
        self.guard = Some(guard);
        self
    }

    /// Gate the transition on a named closure.
    pub fn when<F>(self, name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.guard(Constraint::new(name, move |_: &()| predicate()))
    }

    /// Attach a trigger. A transition with no trigger is passive.
    pub fn on(mut self, trigger: impl Into<Trigger>) -> Self {
        self.triggers.push(trigger.into());
        self
    }

    /// Run `effect` once the consumer state has been entered.
    pub fn effect<F>(mut self, effect: F) -> Self
    where
        F: Fn(&Trip) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        self.effect = Some(Arc::new(effect));
        self
    }

    pub(crate) fn into_parts(self) -> Result<TransitionParts> {
        let from = self.from.ok_or(MachineError::IncompleteTransition("from"))?;
        let to = self.to.ok_or(MachineError::IncompleteTransition("to"))?;
        Ok(TransitionParts {
            from,
            to,
            guard: self.guard,
            triggers: self.triggers,
            effect: self.effect,
        })
    }
}
