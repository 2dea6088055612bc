//! Racing triggers, shared synchronizers and schedulers.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use turnstile::machine::{Signal, Trigger};
use turnstile::{Machine, MachineEvent, MachineOptions, Synchronizer};

/// Idle with one triggered edge per racer, each to its own target.
fn racing_machine(options: MachineOptions, sources: &[Arc<Signal<()>>]) -> Machine {
    let machine = Machine::new(options).unwrap();
    let mut editor = machine.begin_edit().unwrap();
    editor.add_state("Idle").unwrap();
    for (i, source) in sources.iter().enumerate() {
        let target = format!("Won{i}");
        editor.add_state(target.as_str()).unwrap();
        let id = editor.add_transition("Idle", &target).unwrap();
        editor
            .add_trigger(id, Trigger::on(format!("racer{i}"), source))
            .unwrap();
    }
    editor.set_initial_state("Idle").unwrap();
    editor.complete().unwrap();
    machine
}

fn count_changes(machine: &Machine) -> Arc<AtomicUsize> {
    let changes = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&changes);
    machine.subscribe(move |event| {
        if matches!(event, MachineEvent::StateChanged { .. }) {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });
    changes
}

#[test]
fn racing_triggers_complete_exactly_one_transition() {
    for round in 0..50 {
        let sources: Vec<_> = (0..4).map(|_| Arc::new(Signal::<()>::new())).collect();
        let machine = racing_machine(MachineOptions::named(format!("race-{round}")), &sources);
        let changes = count_changes(&machine);
        let barrier = Arc::new(Barrier::new(sources.len()));

        let handles: Vec<_> = sources
            .iter()
            .map(|source| {
                let (source, barrier) = (Arc::clone(source), Arc::clone(&barrier));
                thread::spawn(move || {
                    barrier.wait();
                    source.fire();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let current = machine.current_state().unwrap();
        assert!(current.starts_with("Won"), "round {round}: ended in {current}");
        assert_eq!(changes.load(Ordering::SeqCst), 1, "round {round}");
        assert_eq!(machine.history().len(), 2, "round {round}");

        let flagged: Vec<_> = machine
            .state_names()
            .into_iter()
            .filter(|name| machine.is_current(name).unwrap())
            .collect();
        assert_eq!(flagged, vec![current]);
    }
}

#[test]
fn concurrent_signals_never_skip_or_duplicate_steps() {
    let states: Vec<String> = (0..=64).map(|i| format!("Step{i}")).collect();
    let machine = Machine::new(MachineOptions::named("ladder")).unwrap();
    let mut editor = machine.begin_edit().unwrap();
    editor.add_states(states.iter().cloned()).unwrap();
    for pair in states.windows(2) {
        editor.add_transition(&pair[0], &pair[1]).unwrap();
    }
    editor.set_initial_state("Step0").unwrap();
    editor.complete().unwrap();

    let moved = Arc::new(AtomicUsize::new(0));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let (machine, moved) = (machine.clone(), Arc::clone(&moved));
            thread::spawn(move || {
                for _ in 0..16 {
                    if machine.signal("worker").unwrap() {
                        moved.fetch_add(1, Ordering::SeqCst);
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(moved.load(Ordering::SeqCst), 64);
    assert_eq!(machine.current_state().as_deref(), Some("Step64"));
    let path: Vec<String> = machine
        .history()
        .get_path()
        .into_iter()
        .map(str::to_string)
        .collect();
    assert_eq!(path, states);
}

#[test]
fn shared_synchronizer_serializes_sibling_machines() {
    let sync = Synchronizer::new();
    let inside = Arc::new(AtomicUsize::new(0));
    let overlaps = Arc::new(AtomicUsize::new(0));

    let sibling = |name: &str| {
        let machine =
            Machine::with_synchronizer(MachineOptions::named(name), sync.clone()).unwrap();
        let mut editor = machine.begin_edit().unwrap();
        editor.add_states(["Ping", "Pong"]).unwrap();
        for (from, to) in [("Ping", "Pong"), ("Pong", "Ping")] {
            let id = editor.add_transition(from, to).unwrap();
            let (inside, overlaps) = (Arc::clone(&inside), Arc::clone(&overlaps));
            editor
                .set_effect(id, move |_| {
                    if inside.fetch_add(1, Ordering::SeqCst) > 0 {
                        overlaps.fetch_add(1, Ordering::SeqCst);
                    }
                    thread::yield_now();
                    inside.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                })
                .unwrap();
        }
        editor.set_initial_state("Ping").unwrap();
        editor.complete().unwrap();
        machine
    };

    let left = sibling("left");
    let right = sibling("right");
    assert!(left.synchronizer().is_shared_with(&right.synchronizer()));
    assert!(!left
        .synchronizer()
        .is_shared_with(&Machine::new(MachineOptions::default()).unwrap().synchronizer()));

    let handles: Vec<_> = [left.clone(), right.clone()]
        .into_iter()
        .map(|machine| {
            thread::spawn(move || {
                for _ in 0..200 {
                    assert!(machine.signal("bounce").unwrap());
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    assert_eq!(left.current_state().as_deref(), Some("Ping"));
    assert_eq!(right.current_state().as_deref(), Some("Ping"));
}

#[test]
fn trigger_scheduler_delivers_on_its_worker() {
    let go = Arc::new(Signal::<()>::new());
    let machine = Machine::new(MachineOptions::named("queued").trigger_scheduler(true)).unwrap();
    let entered_on = Arc::new(Mutex::new(None));

    let mut editor = machine.begin_edit().unwrap();
    editor.add_states(["A", "B"]).unwrap();
    let id = editor.add_transition("A", "B").unwrap();
    editor.add_trigger(id, Trigger::on("go", &go)).unwrap();
    let slot = Arc::clone(&entered_on);
    editor
        .on_entry("B", move |_| {
            *slot.lock() = thread::current().name().map(str::to_string);
            Ok(())
        })
        .unwrap();
    editor.set_initial_state("A").unwrap();
    editor.complete().unwrap();

    go.fire();
    machine.settle();

    assert_eq!(machine.current_state().as_deref(), Some("B"));
    assert_eq!(entered_on.lock().as_deref(), Some("queued-triggers"));
}

#[test]
fn queued_trips_from_a_left_state_are_dropped() {
    let first = Arc::new(Signal::<()>::new());
    let second = Arc::new(Signal::<()>::new());
    let machine = racing_machine(
        MachineOptions::named("stale-queue").trigger_scheduler(true),
        &[Arc::clone(&first), Arc::clone(&second)],
    );
    let changes = count_changes(&machine);

    first.fire();
    second.fire();
    machine.settle();

    assert_eq!(machine.current_state().as_deref(), Some("Won0"));
    assert_eq!(changes.load(Ordering::SeqCst), 1);
    assert_eq!(machine.history().len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_tasks_complete_exactly_one_transition() {
    let sources: Vec<_> = (0..8).map(|_| Arc::new(Signal::<()>::new())).collect();
    let machine = racing_machine(MachineOptions::named("tokio-race"), &sources);
    let changes = count_changes(&machine);

    let tasks: Vec<_> = sources
        .iter()
        .map(|source| {
            let source = Arc::clone(source);
            tokio::spawn(async move { source.fire() })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(changes.load(Ordering::SeqCst), 1);
    assert!(machine.current_state().unwrap().starts_with("Won"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn blocking_signals_from_tasks_walk_the_chain() {
    let machine = Machine::new(MachineOptions::named("tokio-chain")).unwrap();
    let mut editor = machine.begin_edit().unwrap();
    editor.add_states(["A", "B", "C", "D"]).unwrap();
    for (from, to) in [("A", "B"), ("B", "C"), ("C", "D")] {
        editor.add_transition(from, to).unwrap();
    }
    editor.set_initial_state("A").unwrap();
    editor.complete().unwrap();

    let tasks: Vec<_> = (0..6)
        .map(|_| {
            let machine = machine.clone();
            tokio::task::spawn_blocking(move || machine.signal("task").unwrap())
        })
        .collect();
    let mut moved = 0;
    for task in tasks {
        if task.await.unwrap() {
            moved += 1;
        }
    }

    assert_eq!(moved, 3);
    assert_eq!(machine.current_state().as_deref(), Some("D"));
}
