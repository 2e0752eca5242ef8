//! Topology-polymorphic control engine
//!
//! The topology is fixed when the engine is built from the board profile
//! and never changes afterwards.

use crate::config::profile::{MachineProfile, SensorFit, Topology};
use crate::config::settings::{
    HxControlMode, HxSettings, Settings, SingleBoilerTiming, HX_PRESSURE_MAX_X100,
};
use crate::safety::monitor::{BREW_MAX_TEMP_X10, STEAM_MAX_TEMP_X10, WARNING_MARGIN_X10};
use crate::sensors::{x10_to_f32, SensorSample};
use crate::state::MachineMode;

use super::dual_boiler::DualBoiler;
use super::electrical::{ElectricalBudget, EnvironmentalConfig, HeaterRatings, MAX_HEATER_DUTY};
use super::heat_exchanger::HeatExchanger;
use super::pid::{Pid, PidGains};
use super::single_boiler::SingleBoiler;
use super::strategy::HeatingStrategy;
use super::{ControlError, ControlOutputs, Loop};

/// Highest brew setpoint accepted
pub const BREW_SETPOINT_MAX_X10: i16 = BREW_MAX_TEMP_X10 - WARNING_MARGIN_X10;
/// Highest steam setpoint accepted
pub const STEAM_SETPOINT_MAX_X10: i16 = STEAM_MAX_TEMP_X10 - WARNING_MARGIN_X10;

/// The two PID loops
#[derive(Debug, Clone)]
pub(crate) struct Loops {
    pub brew: Pid,
    pub steam: Pid,
}

#[derive(Debug, Clone)]
enum TopologyControl {
    Dual(DualBoiler),
    Single(SingleBoiler),
    HeatExchanger(HeatExchanger),
}

/// Per-cycle inputs
#[derive(Debug, Clone, Copy)]
pub struct EngineInputs<'a> {
    pub sample: &'a SensorSample,
    /// Mode the heaters follow; IDLE keeps them off
    pub mode: MachineMode,
    /// Pump duty decided by the state machine
    pub pump_duty: u8,
    pub now_ms: u64,
    pub dt_s: f32,
}

/// Side effects of one update the machine has to act on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EngineReport {
    /// Single boiler left steam mode on its own
    pub returned_to_brew: bool,
}

#[derive(Debug, Clone)]
pub struct ControlEngine {
    control: TopologyControl,
    loops: Loops,
    /// Commanded setpoints, indexed by [`Loop`]
    setpoints_x10: [i16; 2],
    ratings: HeaterRatings,
    sensors: SensorFit,
    env: EnvironmentalConfig,
    budget: Option<ElectricalBudget>,
    outputs: ControlOutputs,
}

impl ControlEngine {
    pub fn new(profile: &MachineProfile, settings: &Settings) -> Self {
        let setpoints_x10 = [settings.brew_setpoint_x10, settings.steam_setpoint_x10];
        let mut loops = Loops {
            brew: Pid::new(settings.brew_pid, x10_to_f32(setpoints_x10[0])),
            steam: Pid::new(settings.steam_pid, x10_to_f32(setpoints_x10[1])),
        };

        let control = match profile.topology {
            Topology::DualBoiler => TopologyControl::Dual(DualBoiler::new(settings.strategy)),
            Topology::SingleBoiler => {
                TopologyControl::Single(SingleBoiler::new(settings.single_boiler))
            }
            Topology::HeatExchanger => {
                let hx = HeatExchanger::new(settings.hx);
                if hx.settings.mode == HxControlMode::Pressure {
                    loops.steam.jump_to(hx.pressure_setpoint_bar());
                }
                TopologyControl::HeatExchanger(hx)
            }
        };

        Self {
            control,
            loops,
            setpoints_x10,
            ratings: profile.heaters,
            sensors: profile.sensors,
            env: settings.env,
            budget: ElectricalBudget::new(&settings.env, &profile.heaters),
            outputs: ControlOutputs::OFF,
        }
    }

    pub fn topology(&self) -> Topology {
        match self.control {
            TopologyControl::Dual(_) => Topology::DualBoiler,
            TopologyControl::Single(_) => Topology::SingleBoiler,
            TopologyControl::HeatExchanger(_) => Topology::HeatExchanger,
        }
    }

    /// Command a setpoint (0.1 °C)
    pub fn set_setpoint(&mut self, target: Loop, temp_x10: i16) -> Result<(), ControlError> {
        let max = match target {
            Loop::Brew => BREW_SETPOINT_MAX_X10,
            Loop::Steam => STEAM_SETPOINT_MAX_X10,
        };
        if !(0..=max).contains(&temp_x10) {
            return Err(ControlError::SetpointOutOfRange);
        }
        self.setpoints_x10[target as usize] = temp_x10;

        let temp = x10_to_f32(temp_x10);
        match &self.control {
            TopologyControl::Dual(_) => match target {
                Loop::Brew => self.loops.brew.set_target(temp),
                Loop::Steam => self.loops.steam.set_target(temp),
            },
            TopologyControl::Single(sb) => sb.setpoint_changed(&mut self.loops, target, temp_x10),
            TopologyControl::HeatExchanger(hx) => {
                // Brew setpoint is the group target and drives nothing
                if target == Loop::Steam && hx.settings.mode == HxControlMode::Temperature {
                    self.loops.steam.set_target(temp);
                }
            }
        }
        Ok(())
    }

    /// Commanded setpoint (0.1 °C), independent of ramping
    pub fn get_setpoint(&self, target: Loop) -> i16 {
        self.setpoints_x10[target as usize]
    }

    pub fn set_pid(&mut self, target: Loop, gains: PidGains) -> Result<(), ControlError> {
        if !gains.is_valid() {
            return Err(ControlError::GainOutOfRange);
        }
        match target {
            Loop::Brew => self.loops.brew.set_gains(gains),
            Loop::Steam => self.loops.steam.set_gains(gains),
        }
        Ok(())
    }

    pub fn pid(&self, target: Loop) -> PidGains {
        match target {
            Loop::Brew => self.loops.brew.gains(),
            Loop::Steam => self.loops.steam.gains(),
        }
    }

    pub fn environment(&self) -> EnvironmentalConfig {
        self.env
    }

    pub fn budget(&self) -> Option<ElectricalBudget> {
        self.budget
    }

    pub fn ratings(&self) -> HeaterRatings {
        self.ratings
    }

    /// Install new site limits
    pub fn set_environment(&mut self, env: EnvironmentalConfig) -> Result<(), ControlError> {
        let budget =
            ElectricalBudget::new(&env, &self.ratings).ok_or(ControlError::InvalidEnvironment)?;
        self.env = env;
        self.budget = Some(budget);
        Ok(())
    }

    pub fn strategy(&self) -> HeatingStrategy {
        match &self.control {
            TopologyControl::Dual(dual) => dual.allocator.strategy(),
            _ => HeatingStrategy::BrewOnly,
        }
    }

    /// Select a heating strategy, checked against the current budget
    pub fn set_strategy(&mut self, strategy: HeatingStrategy) -> Result<(), ControlError> {
        let budget = self.budget.ok_or(ControlError::InvalidEnvironment)?;
        match &mut self.control {
            TopologyControl::Dual(dual) => {
                if !strategy.is_feasible(&budget) {
                    return Err(ControlError::StrategyInfeasible);
                }
                dual.allocator.set_strategy(strategy);
                Ok(())
            }
            _ if strategy == HeatingStrategy::BrewOnly => Ok(()),
            _ => Err(ControlError::Unsupported),
        }
    }

    pub fn set_single_boiler_timing(
        &mut self,
        timing: SingleBoilerTiming,
    ) -> Result<(), ControlError> {
        match &mut self.control {
            TopologyControl::Single(sb) => {
                sb.timing = timing;
                Ok(())
            }
            _ => Err(ControlError::Unsupported),
        }
    }

    pub fn set_heat_exchanger(&mut self, settings: HxSettings) -> Result<(), ControlError> {
        if settings.pressure_x100 > HX_PRESSURE_MAX_X100 {
            return Err(ControlError::OutOfRange);
        }
        if settings.mode == HxControlMode::Pressure && !self.sensors.pressure {
            return Err(ControlError::Unsupported);
        }
        let TopologyControl::HeatExchanger(hx) = &mut self.control else {
            return Err(ControlError::Unsupported);
        };
        hx.settings = settings;
        match settings.mode {
            HxControlMode::Temperature => self
                .loops
                .steam
                .jump_to(x10_to_f32(self.setpoints_x10[Loop::Steam as usize])),
            HxControlMode::Pressure => self.loops.steam.jump_to(hx.pressure_setpoint_bar()),
            HxControlMode::Pressurestat => {}
        }
        self.loops.steam.reset();
        Ok(())
    }

    /// Whether this machine can run `mode` with the sensors it has
    pub fn supports_mode(&self, mode: MachineMode) -> bool {
        let s = self.sensors;
        match (&self.control, mode) {
            (_, MachineMode::Idle) => true,
            (TopologyControl::Dual(_), MachineMode::Brew) => s.brew_ntc,
            (TopologyControl::Dual(_), MachineMode::Steam) => s.steam_ntc,
            (TopologyControl::Single(_), _) => s.brew_ntc,
            (TopologyControl::HeatExchanger(_), MachineMode::Brew) => s.group_thermocouple,
            (TopologyControl::HeatExchanger(hx), MachineMode::Steam) => match hx.settings.mode {
                HxControlMode::Temperature => s.steam_ntc,
                HxControlMode::Pressure => s.pressure,
                HxControlMode::Pressurestat => true,
            },
        }
    }

    /// Setpoint minus measurement (°C) of the loop that decides readiness
    pub fn tracking_error(&self, sample: &SensorSample, mode: MachineMode) -> Option<f32> {
        let (setpoint, measured) = match (&self.control, mode) {
            (_, MachineMode::Idle) => return None,
            (TopologyControl::HeatExchanger(_), _) => {
                (self.setpoints_x10[Loop::Brew as usize], sample.group_temp_x10?)
            }
            // One boiler, one probe
            (TopologyControl::Single(_), MachineMode::Steam) => {
                (self.setpoints_x10[Loop::Steam as usize], sample.brew_temp_x10?)
            }
            (TopologyControl::Dual(_), MachineMode::Steam) => {
                (self.setpoints_x10[Loop::Steam as usize], sample.steam_temp_x10?)
            }
            (_, MachineMode::Brew) => {
                (self.setpoints_x10[Loop::Brew as usize], sample.brew_temp_x10?)
            }
        };
        Some(x10_to_f32(setpoint) - x10_to_f32(measured))
    }

    /// One control step
    pub fn update(&mut self, inputs: &EngineInputs<'_>) -> EngineReport {
        let mut report = EngineReport::default();
        let heaters = match self.budget {
            Some(budget) if inputs.mode.heats() => self.heater_duties(inputs, &budget, &mut report),
            _ => {
                self.rest();
                (0.0, 0.0)
            }
        };

        // Truncate so rounding never lifts a duty over its budgeted share
        let brew_heater = heaters.0.clamp(0.0, MAX_HEATER_DUTY) as u8;
        let steam_heater = heaters.1.clamp(0.0, MAX_HEATER_DUTY) as u8;
        self.outputs = ControlOutputs {
            brew_heater,
            steam_heater,
            pump: inputs.pump_duty.min(100),
            power_watts: self.ratings.power_watts(brew_heater, steam_heater),
        };
        report
    }

    fn heater_duties(
        &mut self,
        inputs: &EngineInputs<'_>,
        budget: &ElectricalBudget,
        report: &mut EngineReport,
    ) -> (f32, f32) {
        let dt = inputs.dt_s;
        match &mut self.control {
            TopologyControl::Dual(dual) => dual.update(&mut self.loops, inputs.sample, dt, budget),
            TopologyControl::Single(sb) => {
                let (demand, timed_out) = sb.update(
                    &mut self.loops,
                    &self.setpoints_x10,
                    inputs.sample,
                    inputs.mode,
                    inputs.now_ms,
                    dt,
                );
                report.returned_to_brew = timed_out;
                let cap = ElectricalBudget::duty_within(budget.brew_current, budget.budget);
                (demand.min(cap), 0.0)
            }
            TopologyControl::HeatExchanger(hx) => {
                let demand = hx.update(&mut self.loops, inputs.sample, dt);
                let cap = ElectricalBudget::duty_within(budget.steam_current, budget.budget);
                (0.0, demand.min(cap))
            }
        }
    }

    pub fn outputs(&self) -> ControlOutputs {
        self.outputs
    }

    /// Zero every output, bypassing the loops
    pub fn force_off(&mut self) {
        self.rest();
        self.outputs = ControlOutputs::OFF;
    }

    fn rest(&mut self) {
        if let TopologyControl::Single(sb) = &mut self.control {
            sb.rest(&mut self.loops, &self.setpoints_x10);
        }
    }
}
