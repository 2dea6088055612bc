//! Error and fault types.
//!
//! Build-time contract violations are returned synchronously as
//! [`MachineError`]. Failures inside user callbacks (hooks, effects,
//! listeners) never unwind through the engine; they are captured as
//! [`Fault`] values and published to observers instead.

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use thiserror::Error;

/// Boxed error returned by fallible user callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result alias used throughout the engine.
pub type Result<T> = std::result::Result<T, MachineError>;

/// Structural problem found while assembling a machine.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum AssemblyIssue {
    #[error("machine declares no states")]
    NoStates,

    #[error("no initial state was set. Call set_initial_state(name) before complete_build()")]
    MissingInitialState,
}

/// Errors surfaced synchronously to the caller.
#[derive(Debug, Error)]
pub enum MachineError {
    #[error("'{operation}' is not allowed while the machine is {phase}")]
    InvalidOperation {
        operation: &'static str,
        phase: &'static str,
    },

    #[error("state '{0}' is already declared")]
    DuplicateState(String),

    #[error("state '{0}' is not declared on this machine")]
    UnknownState(String),

    #[error("transition #{0} does not exist on this machine")]
    UnknownTransition(usize),

    #[error("initial state already set to '{existing}', refusing '{requested}'")]
    InitialStateAlreadySet { existing: String, requested: String },

    #[error("guard '{guard}' failed to evaluate: {message}")]
    GuardFault { guard: String, message: String },

    #[error("'{0}' was called from inside a running transition")]
    Reentrant(&'static str),

    #[error("transition {0} state not specified. Call .{0}(state)")]
    IncompleteTransition(&'static str),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("scheduler could not be started: {0}")]
    SchedulerUnavailable(String),

    #[error("machine assembly failed: {}", join_issues(.0))]
    AssemblyFailed(Vec<AssemblyIssue>),
}

fn join_issues(issues: &[AssemblyIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Which kind of user callback produced a [`Fault`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FaultSource {
    EntryHook,
    ExitHook,
    DoBehavior,
    Effect,
    Guard,
    Filter,
}

impl fmt::Display for FaultSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::EntryHook => "entry hook",
            Self::ExitHook => "exit hook",
            Self::DoBehavior => "do behavior",
            Self::Effect => "effect",
            Self::Guard => "guard",
            Self::Filter => "trigger filter",
        };
        f.write_str(label)
    }
}

/// A captured failure of a user callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fault {
    pub source: FaultSource,
    /// Name of the state, transition or constraint the callback belongs to.
    pub origin: String,
    pub message: String,
}

impl Fault {
    pub fn new(source: FaultSource, origin: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            source,
            origin: origin.into(),
            message: message.into(),
        }
    }

    pub(crate) fn from_panic(
        source: FaultSource,
        origin: impl Into<String>,
        payload: Box<dyn Any + Send>,
    ) -> Self {
        Self::new(source, origin, panic_message(payload.as_ref()))
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}' failed: {}", self.source, self.origin, self.message)
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assembly_failure_lists_every_issue() {
        let err = MachineError::AssemblyFailed(vec![
            AssemblyIssue::NoStates,
            AssemblyIssue::MissingInitialState,
        ]);
        let text = err.to_string();
        assert!(text.contains("no states"));
        assert!(text.contains("no initial state"));
    }

    #[test]
    fn invalid_operation_names_phase() {
        let err = MachineError::InvalidOperation {
            operation: "add_state",
            phase: "assembled",
        };
        assert_eq!(
            err.to_string(),
            "'add_state' is not allowed while the machine is assembled"
        );
    }

    #[test]
    fn panic_payloads_become_messages() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        let fault = Fault::from_panic(FaultSource::Effect, "A->B", payload);
        assert_eq!(fault.message, "boom");

        let payload: Box<dyn Any + Send> = Box::new(String::from("owned boom"));
        let fault = Fault::from_panic(FaultSource::Effect, "A->B", payload);
        assert_eq!(fault.message, "owned boom");

        let payload: Box<dyn Any + Send> = Box::new(42u8);
        let fault = Fault::from_panic(FaultSource::Effect, "A->B", payload);
        assert!(fault.message.contains("non-string"));
    }

    #[test]
    fn fault_display_mentions_origin() {
        let fault = Fault::new(FaultSource::ExitHook, "Idle", "disk full");
        assert_eq!(fault.to_string(), "exit hook 'Idle' failed: disk full");
    }
}
