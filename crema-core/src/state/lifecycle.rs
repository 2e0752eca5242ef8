//! State machine driver
//!
//! Wraps the transition table with the request API used by the link, the
//! per-cycle evaluation used by the control loop, and shot bookkeeping.

use crate::config::settings::PreinfusionConfig;
use crate::safety::SafetyLevel;

use super::brew::Shot;
use super::events::Event;
use super::machine::{MachineMode, MachineState};

/// Within this many degrees of setpoint counts as at temperature
pub const READY_TOLERANCE_C: f32 = 1.0;
/// Falling this far below setpoint drops READY back to HEATING
pub const COLD_THRESHOLD_C: f32 = 5.0;

/// Why a request was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RequestError {
    /// Malformed or out-of-range request
    Invalid,
    /// Well-formed but not allowed in the current state
    Rejected,
}

/// What the rest of the machine says about a heating mode request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeGate {
    pub env_valid: bool,
    /// The control engine can run the mode on this topology
    pub supported: bool,
}

/// A shot that has just ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FinishedShot {
    pub duration_ms: u64,
    pub backflush: bool,
}

/// Per-cycle inputs
#[derive(Debug, Clone, Copy)]
pub struct TickInputs {
    pub now_ms: u64,
    pub level: SafetyLevel,
    /// Setpoint minus measurement of the loop that defines readiness
    pub tracking_error: Option<f32>,
}

/// What changed since the previous tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickReport {
    pub transition: Option<(MachineState, MachineState)>,
    pub finished: Option<FinishedShot>,
}

#[derive(Debug, Clone)]
pub struct StateMachine {
    state: MachineState,
    entered_ms: u64,
    mode: MachineMode,
    shot: Option<Shot>,
    last_shot_start_ms: Option<u64>,
    /// State as of the previous report
    reported: MachineState,
    finished: Option<FinishedShot>,
}

fn at_temperature(error: Option<f32>) -> bool {
    matches!(error, Some(e) if e <= READY_TOLERANCE_C)
}

impl StateMachine {
    pub fn new(now_ms: u64) -> Self {
        Self {
            state: MachineState::Init,
            entered_ms: now_ms,
            mode: MachineMode::Idle,
            shot: None,
            last_shot_start_ms: None,
            reported: MachineState::Init,
            finished: None,
        }
    }

    pub fn state(&self) -> MachineState {
        self.state
    }

    pub fn entered_ms(&self) -> u64 {
        self.entered_ms
    }

    /// Requested mode
    pub fn mode(&self) -> MachineMode {
        self.mode
    }

    /// Mode the heaters should follow right now
    pub fn heating_mode(&self) -> MachineMode {
        if self.state.heater_allowed() {
            self.mode
        } else {
            MachineMode::Idle
        }
    }

    pub fn shot(&self) -> Option<&Shot> {
        self.shot.as_ref()
    }

    pub fn last_shot_start_ms(&self) -> Option<u64> {
        self.last_shot_start_ms
    }

    pub fn pump_duty(&self, now_ms: u64) -> u8 {
        match (&self.shot, self.state.pump_allowed()) {
            (Some(shot), true) => shot.pump_duty(now_ms),
            _ => 0,
        }
    }

    fn go(&mut self, event: Event, now_ms: u64) {
        let next = self.state.transition(event);
        if next == self.state {
            return;
        }
        if self.state == MachineState::Brewing {
            if let Some(shot) = self.shot.take() {
                self.finished = Some(FinishedShot {
                    duration_ms: shot.elapsed_ms(now_ms),
                    backflush: shot.is_backflush(),
                });
            }
        }
        if next == MachineState::Safe {
            // Heating resumes only on a fresh request after reset
            self.mode = MachineMode::Idle;
        }
        self.state = next;
        self.entered_ms = now_ms;
    }

    /// Change the requested mode
    pub fn request_mode(
        &mut self,
        mode: MachineMode,
        gate: ModeGate,
        now_ms: u64,
    ) -> Result<(), RequestError> {
        match self.state {
            MachineState::Brewing | MachineState::Safe | MachineState::Init => {
                return Err(RequestError::Rejected)
            }
            _ => {}
        }
        if mode.heats() && !(gate.env_valid && gate.supported) {
            return Err(RequestError::Rejected);
        }

        let previous = self.mode;
        self.mode = mode;
        if mode.heats() {
            if previous != mode && self.state == MachineState::Ready {
                // Readiness is re-judged against the new loop
                self.go(Event::TemperatureLost, now_ms);
            }
            self.go(Event::HeatRequested, now_ms);
        } else {
            self.go(Event::IdleRequested, now_ms);
        }
        Ok(())
    }

    /// Steam mode timed out on a single boiler; returns whether the mode changed
    pub fn fall_back_to_brew(&mut self, now_ms: u64) -> bool {
        if self.mode != MachineMode::Steam {
            return false;
        }
        self.mode = MachineMode::Brew;
        if self.state == MachineState::Ready {
            self.go(Event::TemperatureLost, now_ms);
        }
        true
    }

    /// Start a shot from READY or HEATING
    pub fn start_brew(
        &mut self,
        preinfusion: PreinfusionConfig,
        now_ms: u64,
    ) -> Result<(), RequestError> {
        match self.state {
            MachineState::Ready | MachineState::Heating => {
                self.shot = Some(Shot::new(now_ms, preinfusion));
                self.last_shot_start_ms = Some(now_ms);
                self.go(Event::BrewStart, now_ms);
                Ok(())
            }
            _ => Err(RequestError::Rejected),
        }
    }

    /// Start a back-flush cycle, READY only
    pub fn start_backflush(&mut self, now_ms: u64) -> Result<(), RequestError> {
        if self.state != MachineState::Ready {
            return Err(RequestError::Rejected);
        }
        self.shot = Some(Shot::backflush(now_ms));
        self.go(Event::BrewStart, now_ms);
        Ok(())
    }

    /// Stop the running shot
    pub fn stop_brew(
        &mut self,
        tracking_error: Option<f32>,
        now_ms: u64,
    ) -> Result<(), RequestError> {
        if self.state != MachineState::Brewing {
            return Err(RequestError::Rejected);
        }
        let at_temperature = at_temperature(tracking_error);
        self.go(Event::BrewEnded { at_temperature }, now_ms);
        Ok(())
    }

    pub fn is_backflushing(&self) -> bool {
        self.state == MachineState::Brewing && self.shot.is_some_and(|s| s.is_backflush())
    }

    /// Force SAFE
    pub fn enter_safe(&mut self, now_ms: u64) {
        self.go(Event::SafeRequested, now_ms);
    }

    /// Leave SAFE after the supervisor accepted a reset
    pub fn reset(&mut self, now_ms: u64) -> bool {
        if self.state != MachineState::Safe {
            return false;
        }
        self.go(Event::Reset, now_ms);
        true
    }

    /// Carry a requested mode across a SAFE hold that was lifted
    pub fn restore_mode(&mut self, mode: MachineMode) {
        if self.state == MachineState::Init {
            self.mode = mode;
        }
    }

    /// One control cycle
    pub fn tick(&mut self, inputs: TickInputs) -> TickReport {
        let now = inputs.now_ms;
        match inputs.level {
            SafetyLevel::Critical => self.go(Event::Critical, now),
            SafetyLevel::Fault => self.go(Event::FaultDetected, now),
            SafetyLevel::Ok | SafetyLevel::Warning => self.evaluate(inputs),
        }

        let transition = (self.reported != self.state).then_some((self.reported, self.state));
        self.reported = self.state;
        TickReport {
            transition,
            finished: self.finished.take(),
        }
    }

    fn evaluate(&mut self, inputs: TickInputs) {
        let now = inputs.now_ms;
        let heats = self.mode.heats();
        match self.state {
            MachineState::Init => self.go(Event::InitComplete, now),
            MachineState::Fault => self.go(Event::FaultCleared, now),
            MachineState::Idle if heats => self.go(Event::HeatRequested, now),
            MachineState::Heating | MachineState::Ready if !heats => {
                self.go(Event::IdleRequested, now)
            }
            MachineState::Heating if at_temperature(inputs.tracking_error) => {
                self.go(Event::TemperatureReached, now)
            }
            MachineState::Ready => {
                if matches!(inputs.tracking_error, Some(e) if e > COLD_THRESHOLD_C) {
                    self.go(Event::TemperatureLost, now);
                }
            }
            MachineState::Brewing => {
                if self.shot.map_or(true, |s| s.expired(now)) {
                    let at_temperature = at_temperature(inputs.tracking_error);
                    self.go(Event::BrewEnded { at_temperature }, now);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::brew::{BACKFLUSH_DURATION_MS, BREW_TIMEOUT_MS};

    const OPEN: ModeGate = ModeGate {
        env_valid: true,
        supported: true,
    };

    fn tick(sm: &mut StateMachine, now_ms: u64, error: f32) -> TickReport {
        sm.tick(TickInputs {
            now_ms,
            level: SafetyLevel::Ok,
            tracking_error: Some(error),
        })
    }

    fn ready_machine() -> StateMachine {
        let mut sm = StateMachine::new(0);
        tick(&mut sm, 0, 50.0);
        sm.request_mode(MachineMode::Brew, OPEN, 10).unwrap();
        tick(&mut sm, 100, 0.5);
        assert_eq!(sm.state(), MachineState::Ready);
        sm
    }

    #[test]
    fn test_boot_to_idle_then_heating() {
        let mut sm = StateMachine::new(0);
        let report = tick(&mut sm, 0, 50.0);
        assert_eq!(report.transition, Some((MachineState::Init, MachineState::Idle)));

        sm.request_mode(MachineMode::Brew, OPEN, 10).unwrap();
        assert_eq!(sm.state(), MachineState::Heating);
        let report = tick(&mut sm, 100, 20.0);
        assert_eq!(
            report.transition,
            Some((MachineState::Idle, MachineState::Heating))
        );
    }

    #[test]
    fn test_mode_gated_by_environment() {
        let mut sm = StateMachine::new(0);
        tick(&mut sm, 0, 0.0);
        let gate = ModeGate {
            env_valid: false,
            supported: true,
        };
        assert_eq!(
            sm.request_mode(MachineMode::Brew, gate, 1),
            Err(RequestError::Rejected)
        );
        assert_eq!(sm.state(), MachineState::Idle);
        // Going idle needs no electrical limits
        assert_eq!(sm.request_mode(MachineMode::Idle, gate, 2), Ok(()));
    }

    #[test]
    fn test_brew_from_ready_and_second_start_rejected() {
        let mut sm = ready_machine();
        assert_eq!(sm.start_brew(PreinfusionConfig::default(), 200), Ok(()));
        assert_eq!(sm.state(), MachineState::Brewing);
        assert_eq!(
            sm.start_brew(PreinfusionConfig::default(), 300),
            Err(RequestError::Rejected)
        );
    }

    #[test]
    fn test_brew_rejected_when_idle() {
        let mut sm = StateMachine::new(0);
        tick(&mut sm, 0, 0.0);
        assert_eq!(
            sm.start_brew(PreinfusionConfig::default(), 1),
            Err(RequestError::Rejected)
        );
    }

    #[test]
    fn test_mode_change_rejected_while_brewing() {
        let mut sm = ready_machine();
        sm.start_brew(PreinfusionConfig::default(), 200).unwrap();
        assert_eq!(
            sm.request_mode(MachineMode::Steam, OPEN, 300),
            Err(RequestError::Rejected)
        );
        assert_eq!(sm.mode(), MachineMode::Brew);
    }

    #[test]
    fn test_brew_times_out() {
        let mut sm = ready_machine();
        sm.start_brew(PreinfusionConfig::default(), 1000).unwrap();
        assert_eq!(sm.pump_duty(1500), 100);

        let report = tick(&mut sm, 1000 + BREW_TIMEOUT_MS, 3.0);
        assert_eq!(sm.state(), MachineState::Heating);
        assert_eq!(
            report.finished,
            Some(FinishedShot {
                duration_ms: BREW_TIMEOUT_MS,
                backflush: false
            })
        );
        assert_eq!(sm.pump_duty(1000 + BREW_TIMEOUT_MS), 0);
    }

    #[test]
    fn test_stop_returns_to_ready_at_temperature() {
        let mut sm = ready_machine();
        sm.start_brew(PreinfusionConfig::default(), 200).unwrap();
        assert_eq!(sm.stop_brew(Some(0.2), 25_200), Ok(()));
        assert_eq!(sm.state(), MachineState::Ready);
        assert_eq!(sm.stop_brew(Some(0.2), 25_300), Err(RequestError::Rejected));
        let report = tick(&mut sm, 25_300, 0.2);
        assert_eq!(report.finished.map(|f| f.duration_ms), Some(25_000));
    }

    #[test]
    fn test_ready_drops_to_heating_when_cold() {
        let mut sm = ready_machine();
        tick(&mut sm, 200, 3.0);
        assert_eq!(sm.state(), MachineState::Ready);
        tick(&mut sm, 300, 5.5);
        assert_eq!(sm.state(), MachineState::Heating);
    }

    #[test]
    fn test_critical_forces_safe_until_reset() {
        let mut sm = ready_machine();
        sm.start_brew(PreinfusionConfig::default(), 200).unwrap();
        let report = sm.tick(TickInputs {
            now_ms: 300,
            level: SafetyLevel::Critical,
            tracking_error: Some(0.0),
        });
        assert_eq!(sm.state(), MachineState::Safe);
        assert!(report.finished.is_some());
        assert_eq!(sm.pump_duty(300), 0);
        assert_eq!(sm.heating_mode(), MachineMode::Idle);

        tick(&mut sm, 400, 0.0);
        assert_eq!(sm.state(), MachineState::Safe);
        assert!(sm.reset(500));
        assert_eq!(sm.state(), MachineState::Init);
        tick(&mut sm, 600, 0.0);
        assert_eq!(sm.state(), MachineState::Idle);
    }

    #[test]
    fn test_fault_clears_to_idle_then_reheats() {
        let mut sm = ready_machine();
        sm.tick(TickInputs {
            now_ms: 200,
            level: SafetyLevel::Fault,
            tracking_error: Some(0.0),
        });
        assert_eq!(sm.state(), MachineState::Fault);
        tick(&mut sm, 300, 0.0);
        assert_eq!(sm.state(), MachineState::Idle);
        tick(&mut sm, 400, 0.0);
        assert_eq!(sm.state(), MachineState::Heating);
    }

    #[test]
    fn test_backflush_only_from_ready() {
        let mut sm = StateMachine::new(0);
        tick(&mut sm, 0, 0.0);
        assert_eq!(sm.start_backflush(1), Err(RequestError::Rejected));

        let mut sm = ready_machine();
        sm.start_backflush(1000).unwrap();
        assert!(sm.is_backflushing());
        let report = tick(&mut sm, 1000 + BACKFLUSH_DURATION_MS, 0.0);
        assert_eq!(report.finished.map(|f| f.backflush), Some(true));
        assert_eq!(sm.state(), MachineState::Ready);
    }

    #[test]
    fn test_switching_loops_rejudges_readiness() {
        let mut sm = ready_machine();
        sm.request_mode(MachineMode::Steam, OPEN, 200).unwrap();
        assert_eq!(sm.state(), MachineState::Heating);
    }

    #[test]
    fn test_fall_back_to_brew_only_from_steam() {
        let mut sm = ready_machine();
        assert!(!sm.fall_back_to_brew(150));
        sm.request_mode(MachineMode::Steam, OPEN, 200).unwrap();
        tick(&mut sm, 300, 0.0);
        assert_eq!(sm.state(), MachineState::Ready);
        assert!(sm.fall_back_to_brew(400));
        assert_eq!(sm.mode(), MachineMode::Brew);
        assert_eq!(sm.state(), MachineState::Heating);
    }
}
