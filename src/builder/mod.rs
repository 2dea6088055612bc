//! Builder API for declaring topologies.
//!
//! [`TransitionBuilder`] describes one transition fluently; the helpers
//! below cover the two shapes most graphs are made of. Higher-level graph
//! DSLs can assemble larger structures from these without knowing anything
//! about the machine's locking.

pub mod macros;
mod transition;
pub(crate) mod validation;

pub use transition::TransitionBuilder;

use crate::core::Guard;

/// A passive, unguarded transition. It fires on `signal` or auto-advance.
///
/// # Example
///
/// ```
/// use turnstile::builder::passive;
/// use turnstile::{Machine, MachineOptions};
///
/// let machine = Machine::new(MachineOptions::named("lamp")).unwrap();
/// let mut editor = machine.begin_edit().unwrap();
/// editor.add_states(["Off", "On"]).unwrap();
/// editor.install(passive("Off", "On")).unwrap();
/// editor.install(passive("On", "Off")).unwrap();
/// editor.set_initial_state("Off").unwrap();
/// editor.complete().unwrap();
///
/// machine.signal("switch").unwrap();
/// assert_eq!(machine.current_state().as_deref(), Some("On"));
/// ```
pub fn passive(from: impl Into<String>, to: impl Into<String>) -> TransitionBuilder {
    TransitionBuilder::new().from(from).to(to)
}

/// A passive transition gated by `guard`.
///
/// # Example
///
/// ```
/// use turnstile::builder::guarded;
/// use turnstile::core::Guard;
///
/// let builder = guarded("Draft", "Published", Guard::new("reviewed", |_| true));
/// # let _ = builder;
/// ```
pub fn guarded(from: impl Into<String>, to: impl Into<String>, guard: Guard) -> TransitionBuilder {
    passive(from, to).guard(guard)
}
