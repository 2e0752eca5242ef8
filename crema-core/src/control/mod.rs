//! Control engine
//!
//! Turns sensor samples and setpoints into actuator duties. The engine is
//! the only writer of [`ControlOutputs`].

mod dual_boiler;
pub mod electrical;
pub mod engine;
mod heat_exchanger;
pub mod pid;
mod single_boiler;
pub mod strategy;

pub use electrical::{ElectricalBudget, EnvironmentalConfig, HeaterRatings};
pub use engine::{ControlEngine, EngineInputs, EngineReport};
pub use pid::{Pid, PidGains};
pub use strategy::HeatingStrategy;

/// Nominal control period
pub const CONTROL_PERIOD_MS: u64 = 100;

/// Which boiler loop a request addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Loop {
    Brew = 0,
    Steam = 1,
}

impl Loop {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Loop::Brew),
            1 => Some(Loop::Steam),
            _ => None,
        }
    }
}

/// Actuator command state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ControlOutputs {
    /// Brew heater duty, percent
    pub brew_heater: u8,
    /// Steam heater duty, percent
    pub steam_heater: u8,
    /// Pump duty, percent
    pub pump: u8,
    /// Estimated draw
    pub power_watts: u16,
}

impl ControlOutputs {
    pub const OFF: Self = Self {
        brew_heater: 0,
        steam_heater: 0,
        pump: 0,
        power_watts: 0,
    };

    pub fn is_off(&self) -> bool {
        self.brew_heater == 0 && self.steam_heater == 0 && self.pump == 0
    }

    pub fn heating(&self) -> bool {
        self.brew_heater > 0 || self.steam_heater > 0
    }
}

/// Control request errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ControlError {
    SetpointOutOfRange,
    GainOutOfRange,
    /// Electrical limits missing or out of range
    InvalidEnvironment,
    /// The site budget cannot run this strategy
    StrategyInfeasible,
    /// Not available on this machine topology
    Unsupported,
    /// Some other field out of range
    OutOfRange,
}
