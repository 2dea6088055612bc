//! Property-based tests for machine invariants.
//!
//! These tests use proptest to drive randomly wired machines through random
//! operation sequences and check the invariants that must hold after every
//! step.

use proptest::prelude::*;
use turnstile::core::Guard;
use turnstile::{Machine, MachineOptions, RouteHistory};

const NAMES: [&str; 6] = ["S0", "S1", "S2", "S3", "S4", "S5"];

#[derive(Clone, Debug)]
struct Edge {
    from: usize,
    to: usize,
    open: bool,
}

#[derive(Clone, Debug)]
enum Op {
    Signal,
    TryTo(usize),
    Jump(usize),
}

prop_compose! {
    fn arbitrary_topology()(states in 2..=NAMES.len())(
        edges in prop::collection::vec((0..states, 0..states, any::<bool>()), 0..12),
        initial in 0..states,
        states in Just(states),
    ) -> (usize, Vec<Edge>, usize) {
        let edges = edges
            .into_iter()
            .map(|(from, to, open)| Edge { from, to, open })
            .collect();
        (states, edges, initial)
    }
}

fn arbitrary_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => Just(Op::Signal),
        2 => (0..NAMES.len()).prop_map(Op::TryTo),
        1 => (0..NAMES.len()).prop_map(Op::Jump),
    ]
}

fn build(states: usize, edges: &[Edge], initial: usize, auto_advance: bool) -> Machine {
    let options = MachineOptions::named("prop")
        .auto_advance(auto_advance)
        .max_auto_advance(16)
        .history_limit(0);
    let machine = Machine::new(options).unwrap();
    let mut editor = machine.begin_edit().unwrap();
    editor.add_states(NAMES[..states].iter().copied()).unwrap();
    for edge in edges {
        let id = editor
            .add_transition(NAMES[edge.from], NAMES[edge.to])
            .unwrap();
        let open = edge.open;
        editor
            .set_guard(id, Guard::new("open", move |_| open))
            .unwrap();
    }
    editor.set_initial_state(NAMES[initial]).unwrap();
    editor.complete().unwrap();
    machine
}

fn assert_single_current(machine: &Machine) -> Result<(), TestCaseError> {
    let current = machine.current_state().unwrap();
    let mut flagged = Vec::new();
    for name in machine.state_names() {
        if machine.is_current(&name).unwrap() {
            flagged.push(name.clone());
        }
        prop_assert_eq!(machine.is_enabled(&name).unwrap(), name == current);
    }
    prop_assert_eq!(flagged, vec![current]);
    Ok(())
}

fn assert_history_is_a_path(history: &RouteHistory, current: &str) -> Result<(), TestCaseError> {
    let records: Vec<_> = history.records().collect();
    prop_assert!(records[0].from.is_none());
    for pair in records.windows(2) {
        prop_assert_eq!(pair[1].from.as_deref(), Some(pair[0].to.as_str()));
    }
    prop_assert_eq!(history.last().map(|r| r.to.as_str()), Some(current));
    Ok(())
}

proptest! {
    #[test]
    fn exactly_one_state_is_current(
        (states, edges, initial) in arbitrary_topology(),
        ops in prop::collection::vec(arbitrary_op(), 0..24),
        auto_advance in any::<bool>(),
    ) {
        let machine = build(states, &edges, initial, auto_advance);
        assert_single_current(&machine)?;

        for op in ops {
            match op {
                Op::Signal => { machine.signal("prop").unwrap(); }
                Op::TryTo(target) if target < states => { machine.try_transition_to(NAMES[target]).unwrap(); }
                Op::Jump(target) if target < states => machine.jump_to(NAMES[target]).unwrap(),
                _ => {}
            }
            assert_single_current(&machine)?;
        }
    }

    #[test]
    fn history_forms_a_connected_path(
        (states, edges, initial) in arbitrary_topology(),
        ops in prop::collection::vec(arbitrary_op(), 0..24),
    ) {
        let machine = build(states, &edges, initial, false);

        for op in ops {
            let before = machine.history().len();
            let moved = match op {
                Op::Signal => machine.signal("prop").unwrap(),
                Op::TryTo(target) if target < states => {
                    let from = machine.current_state().unwrap();
                    let changed = machine.try_transition_to(NAMES[target]).unwrap();
                    prop_assert_eq!(changed, from != machine.current_state().unwrap());
                    machine.history().len() > before
                }
                _ => false,
            };

            let history = machine.history();
            prop_assert_eq!(history.len(), before + usize::from(moved));
            assert_history_is_a_path(&history, &machine.current_state().unwrap())?;
        }
    }

    #[test]
    fn signal_only_follows_open_passive_edges(
        (states, edges, initial) in arbitrary_topology(),
    ) {
        let machine = build(states, &edges, initial, false);
        let expected = edges
            .iter()
            .find(|e| e.from == initial && e.open)
            .map(|e| NAMES[e.to]);

        let moved = machine.signal("prop").unwrap();
        prop_assert_eq!(moved, expected.is_some());
        prop_assert_eq!(
            machine.current_state().unwrap(),
            expected.unwrap_or(NAMES[initial]).to_string()
        );
    }

    #[test]
    fn closed_guards_never_move_the_machine(
        (states, edges, initial) in arbitrary_topology(),
        signals in 1..8usize,
    ) {
        let closed: Vec<Edge> = edges.into_iter().map(|e| Edge { open: false, ..e }).collect();
        let machine = build(states, &closed, initial, true);

        for _ in 0..signals {
            prop_assert!(!machine.signal("prop").unwrap());
        }
        prop_assert_eq!(machine.current_state().unwrap(), NAMES[initial].to_string());
        prop_assert_eq!(machine.history().len(), 1);
    }
}
