use chrono::{DateTime, Utc};

use crate::models::{Simulation, SimulationStatus};

/// Outcome of a lifecycle check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleDecision {
    Continue,
    Complete { at: DateTime<Utc> },
}

/// Whether the simulation's configured duration has elapsed at `now`
///
/// Only active simulations can complete. The check runs once per scheduler tick,
/// so completion may lag the nominal end by up to one interval.
pub fn evaluate(simulation: &Simulation, now: DateTime<Utc>) -> LifecycleDecision {
    if simulation.status != SimulationStatus::Active {
        return LifecycleDecision::Continue;
    }

    if now - simulation.start_time >= simulation.timeperiod.duration() {
        LifecycleDecision::Complete { at: now }
    } else {
        LifecycleDecision::Continue
    }
}

/// Apply `evaluate` to the simulation in place. Returns true when it completed.
pub fn apply(simulation: &mut Simulation, now: DateTime<Utc>) -> bool {
    match evaluate(simulation, now) {
        LifecycleDecision::Complete { at } => simulation
            .transition(SimulationStatus::Completed, at)
            .is_ok(),
        LifecycleDecision::Continue => false,
    }
}
