//! The state machine engine.
//!
//! States and transitions live in an arena owned by the [`Machine`] and refer
//! to each other by [`StateId`] / [`TransitionId`]. Every transition request
//! funnels through one synchronized attempt path, so concurrently firing
//! triggers can never complete more than one hand-off at a time.

mod engine;
mod events;
mod scheduler;
mod source;
mod state;
mod transition;
mod trigger;

pub use engine::{Editor, Machine, Phase, Synchronizer, TransitionInfo};
pub use events::{FailureReason, ListenerId, MachineEvent, TransitionReport};
pub use scheduler::Scheduler;
pub use source::{EventHandler, EventSource, Signal, SubscriptionId};
pub use trigger::{EventTrigger, Trigger};

pub(crate) use engine::Topology;

use crate::core::{BoxError, Trip};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Hook, effect or do-behavior attached to the topology.
pub type Action = Arc<dyn Fn(&Trip) -> Result<(), BoxError> + Send + Sync>;

/// Index of a state in its machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct StateId(pub(crate) usize);

/// Index of a transition in its machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TransitionId(pub(crate) usize);

impl StateId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl TransitionId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

impl fmt::Display for TransitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}
