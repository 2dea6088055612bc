//! Assembly checks run by `complete_build`.
//!
//! Every structural problem is reported at once instead of stopping at the
//! first one, so a broken topology can be fixed in a single pass.

use crate::core::{AssemblyIssue, MachineError, Result};
use crate::machine::Topology;
use std::collections::VecDeque;
use stillwater::validation::Validation;
use stillwater::NonEmptyVec;

type Check = Validation<(), NonEmptyVec<AssemblyIssue>>;

/// Validate a draft topology, accumulating ALL issues.
pub(crate) fn check(topology: &Topology) -> Result<()> {
    let checks: Vec<Check> = vec![has_states(topology), has_initial_state(topology)];

    match Validation::all_vec(checks).map(|_| ()) {
        Validation::Success(_) => {
            warn_unreachable(topology);
            Ok(())
        }
        Validation::Failure(issues) => Err(MachineError::AssemblyFailed(
            issues.iter().cloned().collect(),
        )),
    }
}

fn has_states(topology: &Topology) -> Check {
    if topology.states.is_empty() {
        Validation::fail(AssemblyIssue::NoStates)
    } else {
        Validation::success(())
    }
}

fn has_initial_state(topology: &Topology) -> Check {
    if topology.initial.is_none() {
        Validation::fail(AssemblyIssue::MissingInitialState)
    } else {
        Validation::success(())
    }
}

/// States that no chain of transitions from the initial state reaches.
///
/// Not an error: such states can still be entered with `jump_to`.
pub(crate) fn unreachable_states(topology: &Topology) -> Vec<&str> {
    let Some(initial) = topology.initial else {
        return Vec::new();
    };
    let mut seen = vec![false; topology.states.len()];
    let mut queue = VecDeque::from([initial]);
    seen[initial.index()] = true;

    while let Some(id) = queue.pop_front() {
        for transition in &topology.state(id).outbound {
            let next = topology.transition(*transition).consumer;
            if !seen[next.index()] {
                seen[next.index()] = true;
                queue.push_back(next);
            }
        }
    }

    topology
        .states
        .iter()
        .filter(|s| !seen[s.id.index()])
        .map(|s| s.name.as_str())
        .collect()
}

fn warn_unreachable(topology: &Topology) {
    for state in unreachable_states(topology) {
        tracing::warn!(state, "state is unreachable from the initial state");
    }
}
