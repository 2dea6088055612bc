//! Leaf types shared by the engine.
//!
//! This module contains the pieces that know nothing about machines:
//! - Named constraints (guards and trigger filters)
//! - Visit tokens used to cancel stale deliveries
//! - Trip records and route history
//! - Error and fault types

mod constraint;
mod error;
mod history;
mod token;
mod trip;

pub use constraint::{Constraint, Guard};
pub use error::{AssemblyIssue, BoxError, Fault, FaultSource, MachineError, Result};
pub use history::{RouteHistory, RouteRecord};
pub use token::VisitToken;
pub use trip::{Cause, Trip, Waypoint};

pub(crate) use error::panic_message;
