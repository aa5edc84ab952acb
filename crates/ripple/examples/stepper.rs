//! Stepper example
//!
//! Demonstrates a component assembled from behaviors:
//! - a clamping behavior keeps `value` inside `min..=max`
//! - a label behavior derives `label` from `value`
//! - the host "renders" by printing only what changed
//!
//! A scripted event loop stands in for user input. Each turn issues its
//! changes, then drains the microtask queue, so every turn renders once.
//!
//! Run with `RUST_LOG=debug` to see publications and flushes.

use ripple::{
    changes, Behavior, ChangeSet, Changes, Composed, Defaults, Element, FnEffects, HostError,
    Microtasks, ReactiveError, ReactiveHost, State,
};
use std::cell::Cell;

/// The outermost host: prints changed fields and counts renders
#[derive(Default)]
struct Stepper {
    renders: Cell<usize>,
}

impl Behavior for Stepper {
    fn render(&self, element: &Element, changed: &ChangeSet) -> Result<(), HostError> {
        self.renders.set(self.renders.get() + 1);
        let state = element.state();

        let first = if element.first_render() == Some(true) {
            " (first)"
        } else {
            ""
        };
        println!("render #{}{first}", self.renders.get());
        for field in changed.iter() {
            println!("  {field} = {:?}", state.get(field));
        }
        if element.raise_change_events() && changed.contains("value") {
            println!("  -> value-changed event");
        }
        Ok(())
    }
}

impl ReactiveHost for Stepper {}

/// Keep `value` within `min..=max`, reacting to any of the three
fn clamp(state: &State, changed: &ChangeSet) -> Changes {
    if !changed.any_of(&["value", "min", "max"]) {
        return Changes::new();
    }
    let min = state.get_i64("min").unwrap_or(i64::MIN);
    let max = state.get_i64("max").unwrap_or(i64::MAX).max(min);
    let value = state.get_i64("value").unwrap_or(0);
    changes! { "value" => value.clamp(min, max) }
}

fn label(state: &State, changed: &ChangeSet) -> Changes {
    if !changed.contains("value") {
        return Changes::new();
    }
    let value = state.get_i64("value").unwrap_or(0);
    changes! { "label" => format!("{value} item{}", if value == 1 { "" } else { "s" }) }
}

fn main() -> Result<(), ReactiveError> {
    env_logger::init();

    let queue = Microtasks::new();
    let host = Composed::new(Stepper::default())
        .with(Defaults::new(changes! { "value" => 1, "min" => 0, "max" => 5 }))
        .with(FnEffects::new(clamp))
        .with(FnEffects::new(label));
    let stepper = Element::new(host, queue.spawner())?;

    println!("\nStepper Example");
    queue.run_until_stalled();

    println!("\n-- click + three times in one turn");
    stepper.with_change_events(|stepper| -> Result<(), ReactiveError> {
        for _ in 0..3 {
            let value = stepper.state().get_i64("value").unwrap_or(0);
            let _ = stepper.request_change(changes! { "value" => value + 1 })?;
        }
        Ok(())
    })?;
    queue.run_until_stalled();

    println!("\n-- click + past the maximum");
    let _ = stepper
        .with_change_events(|stepper| stepper.request_change(changes! { "value" => 99 }))?;
    queue.run_until_stalled();

    println!("\n-- programmatic: lower max to 2");
    let task = stepper.request_change(changes! { "max" => 2 })?;
    queue.run_until(task)?;

    println!("\n-- programmatic: set value to current value (no render)");
    let value = stepper.state().get_i64("value").unwrap_or(0);
    let task = stepper.request_change(changes! { "value" => value })?;
    println!("scheduled: {}", task.is_scheduled());
    queue.run_until(task)?;

    println!("\nfinal state: {:?}", stepper.state());
    Ok(())
}
