//! Enum-typed façade over [`Machine`](crate::Machine).
//!
//! An enum implementing [`MachineState`] (usually via
//! [`state_enum!`](crate::state_enum)) maps its variants 1:1 onto state
//! names. One variant is designated "unset": it is reported as the current
//! state before assembly and never becomes a state of the machine.

mod machine;

pub use machine::{TypedEditor, TypedEvent, TypedMachine};

use std::fmt::Debug;
use std::hash::Hash;

/// A closed set of states identified by an enum.
pub trait MachineState: Copy + Eq + Hash + Debug + Send + Sync + 'static {
    /// State name used by the untyped machine.
    fn name(&self) -> &'static str;

    /// Every variant, including the unset one.
    fn all() -> &'static [Self];

    /// Placeholder reported before assembly.
    fn unset() -> Self;

    /// Every variant that is registered as a state.
    fn declared() -> Vec<Self> {
        let unset = Self::unset();
        Self::all().iter().copied().filter(|s| *s != unset).collect()
    }

    fn from_name(name: &str) -> Option<Self> {
        Self::all().iter().copied().find(|s| s.name() == name)
    }
}
