//! One control cycle
//!
//! Order within a cycle is fixed: safety check and state evaluation, engine
//! update, actuator write, watchdog kick, snapshot publication. The kick
//! comes after the outputs are applied so a hang anywhere earlier in the
//! cycle starves the watchdog.

use crate::machine::{CycleReport, SharedMachine};
use crate::safety::SafetyLevel;
use crate::sensors::SensorSample;
use crate::snapshot::SnapshotCell;
use crate::traits::{Actuators, Watchdog};

/// Run one cycle; `None` if the machine has not been installed yet
pub fn run_cycle<A: Actuators, W: Watchdog>(
    machine: &SharedMachine,
    snapshot: &SnapshotCell,
    sample: SensorSample,
    now_ms: u64,
    actuators: &mut A,
    watchdog: &mut W,
) -> Option<CycleReport> {
    let Some(report) = machine.with(|m| m.step(sample, now_ms)) else {
        actuators.all_off();
        return None;
    };

    if report.level == SafetyLevel::Critical {
        actuators.all_off();
    } else {
        actuators.apply(&report.outputs);
    }
    watchdog.feed();

    if let Some(latest) = machine.with(|m| {
        m.kicked(now_ms);
        m.snapshot(now_ms)
    }) {
        snapshot.publish(latest);
    }
    Some(report)
}
