//! Coin-Operated Turnstile
//!
//! This example models the classic turnstile with the typed façade.
//!
//! Key concepts:
//! - Event sources feeding triggers (coin slot and push bar)
//! - Guards gating a transition on shared state
//! - Effects and typed state events
//! - A trigger scheduler delivering events on a worker thread
//!
//! Run with: cargo run --example turnstile_gate

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use turnstile::builder::TransitionBuilder;
use turnstile::machine::{Signal, Trigger};
use turnstile::state_enum;
use turnstile::typed::{TypedEvent, TypedMachine};
use turnstile::{EventSource, MachineOptions, MachineState};

state_enum! {
    enum Gate {
        Offline,
        Locked,
        Unlocked,
    }
    unset: Offline
}

const FARE: u32 = 50;

fn main() -> turnstile::Result<()> {
    println!("=== Coin-Operated Turnstile ===\n");

    let coins = Arc::new(Signal::<u32>::new());
    let pushes = Arc::new(Signal::<()>::new());
    let credit = Arc::new(AtomicU32::new(0));

    let gate = TypedMachine::<Gate>::new(MachineOptions::named("gate").trigger_scheduler(true))?;
    println!("Before assembly: {:?}", gate.current_state());

    gate.subscribe(|event| {
        if let TypedEvent::Changed { from, to, report } = event {
            println!(
                "  {} -> {} ({})",
                from.name(),
                to.name(),
                report.trigger.as_deref().unwrap_or("initial")
            );
        }
    });

    let mut editor = gate.edit()?;

    let deposit = Arc::clone(&credit);
    coins.subscribe(Arc::new(move |cents: &u32| {
        deposit.fetch_add(*cents, Ordering::SeqCst);
    }));

    let balance = Arc::clone(&credit);
    editor.install(
        TransitionBuilder::new()
            .from(Gate::Locked.name())
            .to(Gate::Unlocked.name())
            .when("fare paid", move || balance.load(Ordering::SeqCst) >= FARE)
            .on(Trigger::on("coin", &coins)),
    )?;

    let fare = Arc::clone(&credit);
    editor.install(
        TransitionBuilder::new()
            .from(Gate::Unlocked.name())
            .to(Gate::Locked.name())
            .on(Trigger::on("push", &pushes))
            .effect(move |_| {
                fare.fetch_sub(FARE, Ordering::SeqCst);
                Ok(())
            }),
    )?;

    editor.set_initial_state(Gate::Locked)?;
    editor.complete()?;

    println!("\nPushing while locked does nothing:");
    pushes.fire();
    gate.machine().settle();
    println!("  still {:?}", gate.current_state());

    println!("\nInserting two coins:");
    coins.emit(&25);
    coins.emit(&25);
    gate.machine().settle();

    println!("\nWalking through:");
    pushes.fire();
    gate.machine().settle();

    println!("\nCredit left: {}", credit.load(Ordering::SeqCst));
    println!("Route: {:?}", gate.machine().history().get_path());

    println!("\n=== Example Complete ===");
    Ok(())
}
