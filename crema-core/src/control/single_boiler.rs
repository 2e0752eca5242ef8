//! Single boiler: one loop whose setpoint follows the mode
//!
//! Switching between the brew and steam setpoint waits out a dwell delay,
//! and a boiler left in steam falls back to brew after a timeout.

use crate::config::settings::SingleBoilerTiming;
use crate::sensors::{x10_to_f32, SensorSample};
use crate::state::MachineMode;

use super::engine::Loops;
use super::Loop;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) enum Phase {
    Brew,
    Steam { since_ms: u64 },
    Switching { to: Loop, since_ms: u64 },
}

#[derive(Debug, Clone)]
pub(crate) struct SingleBoiler {
    pub timing: SingleBoilerTiming,
    pub phase: Phase,
}

impl SingleBoiler {
    pub fn new(timing: SingleBoilerTiming) -> Self {
        Self {
            timing,
            phase: Phase::Brew,
        }
    }

    /// Setpoint the loop should be tracking once any dwell is over
    fn settled(&self) -> Loop {
        match self.phase {
            Phase::Brew => Loop::Brew,
            Phase::Steam { .. } => Loop::Steam,
            Phase::Switching { to, .. } => to,
        }
    }

    /// Heater duty for the boiler, plus whether steam timed out
    pub fn update(
        &mut self,
        loops: &mut Loops,
        setpoints_x10: &[i16; 2],
        sample: &SensorSample,
        mode: MachineMode,
        now_ms: u64,
        dt: f32,
    ) -> (f32, bool) {
        let wanted = if mode == MachineMode::Steam {
            Loop::Steam
        } else {
            Loop::Brew
        };
        let mut timed_out = false;

        if self.settled() != wanted {
            self.phase = Phase::Switching {
                to: wanted,
                since_ms: now_ms,
            };
        }

        match self.phase {
            Phase::Switching { to, since_ms }
                if now_ms.saturating_sub(since_ms) >= self.timing.switch_delay_ms as u64 =>
            {
                loops.brew.set_target(x10_to_f32(setpoints_x10[to as usize]));
                self.phase = match to {
                    Loop::Brew => Phase::Brew,
                    Loop::Steam => Phase::Steam { since_ms: now_ms },
                };
            }
            Phase::Steam { since_ms } if self.timing.steam_timeout_s > 0 => {
                let limit_ms = self.timing.steam_timeout_s as u64 * 1000;
                if now_ms.saturating_sub(since_ms) >= limit_ms {
                    self.phase = Phase::Switching {
                        to: Loop::Brew,
                        since_ms: now_ms,
                    };
                    timed_out = true;
                }
            }
            _ => {}
        }

        let demand = sample.brew_c().map_or(0.0, |t| loops.brew.compute(t, dt));
        (demand, timed_out)
    }

    /// Not heating: drop back to the brew setpoint so no steam timer keeps running
    pub fn rest(&mut self, loops: &mut Loops, setpoints_x10: &[i16; 2]) {
        if self.phase != Phase::Brew {
            self.phase = Phase::Brew;
            loops.brew.set_target(x10_to_f32(setpoints_x10[Loop::Brew as usize]));
        }
    }

    /// A setpoint changed; apply it now if it is the one being tracked
    pub fn setpoint_changed(&self, loops: &mut Loops, target: Loop, temp_x10: i16) {
        let tracking = match self.phase {
            Phase::Brew => Some(Loop::Brew),
            Phase::Steam { .. } => Some(Loop::Steam),
            Phase::Switching { .. } => None,
        };
        if tracking == Some(target) {
            loops.brew.set_target(x10_to_f32(temp_x10));
        }
    }
}
