//! Turnstile: an embeddable, thread-safe finite state machine engine
//!
//! States are connected by transitions that may be guarded by named
//! constraints and fired by event triggers. Every transition request funnels
//! through one synchronized attempt path, so concurrently firing events can
//! never complete more than one exit/enter hand-off at a time, and events
//! aimed at a state that has already been left are rejected on delivery.
//!
//! # Core Concepts
//!
//! - **Machine**: owns the states and transitions, the current-state pointer
//!   and the build/run phase
//! - **Transition**: a directed edge with an optional guard, triggers and effect;
//!   a transition without triggers is *passive* and fires on `signal`
//! - **Trigger**: subscribes to an [`EventSource`] while its supplier state is
//!   current and turns each event into a trip
//! - **Visit token**: minted on every entry and revoked on exit; trips that
//!   carry a revoked token are dropped
//! - **Schedulers**: optional worker threads for trigger delivery and for
//!   effects, configured through [`MachineOptions`]
//!
//! # Example
//!
//! ```rust
//! use turnstile::core::Guard;
//! use turnstile::machine::{Signal, Trigger};
//! use turnstile::{Machine, MachineOptions};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! let count = Arc::new(AtomicUsize::new(0));
//! let changed = Arc::new(Signal::<()>::new());
//!
//! let machine = Machine::new(MachineOptions::named("worker")).unwrap();
//! let mut editor = machine.begin_edit().unwrap();
//! editor.add_states(["Idle", "Running", "Done"]).unwrap();
//!
//! let start = editor.add_transition("Idle", "Running").unwrap();
//! let reading = Arc::clone(&count);
//! editor
//!     .set_guard(start, Guard::new("count == 1", move |_| reading.load(Ordering::SeqCst) == 1))
//!     .unwrap();
//! editor.add_trigger(start, Trigger::on("count changed", &changed)).unwrap();
//!
//! let finish = editor.add_transition("Running", "Done").unwrap();
//! let reading = Arc::clone(&count);
//! editor
//!     .set_guard(finish, Guard::new("count == 0", move |_| reading.load(Ordering::SeqCst) == 0))
//!     .unwrap();
//! editor.add_trigger(finish, Trigger::on("count changed", &changed)).unwrap();
//!
//! editor.set_initial_state("Idle").unwrap();
//! editor.complete().unwrap();
//!
//! count.store(1, Ordering::SeqCst);
//! changed.fire();
//! assert_eq!(machine.current_state().as_deref(), Some("Running"));
//!
//! count.store(0, Ordering::SeqCst);
//! changed.fire();
//! assert_eq!(machine.current_state().as_deref(), Some("Done"));
//! ```

pub mod builder;
pub mod config;
pub mod core;
pub mod machine;
pub mod typed;

// Re-export commonly used types
pub use crate::config::MachineOptions;
pub use crate::core::{Constraint, Fault, FaultSource, Guard, MachineError, Result, RouteHistory, Trip};
pub use crate::machine::{
    EventSource, Machine, MachineEvent, Phase, Signal, Synchronizer, TransitionId, Trigger,
};
pub use crate::typed::{MachineState, TypedMachine};
