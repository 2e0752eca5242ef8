//! Persisted machine settings
//!
//! Everything the operator can change over the link and expects to survive
//! a power cycle. Stored as one postcard-encoded blob, see
//! [`super::persistence`].

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::profile::MachineProfile;
use crate::control::electrical::EnvironmentalConfig;
use crate::control::pid::PidGains;
use crate::control::strategy::HeatingStrategy;

pub const PREINFUSION_ON_MS_DEFAULT: u16 = 3000;
pub const PREINFUSION_PAUSE_MS_DEFAULT: u16 = 5000;
pub const SWITCH_DELAY_MS_DEFAULT: u16 = 5000;
pub const STEAM_TIMEOUT_S_DEFAULT: u16 = 300;
pub const CLEANING_THRESHOLD_DEFAULT: u16 = 100;
pub const CLEANING_THRESHOLD_MIN: u16 = 10;
pub const CLEANING_THRESHOLD_MAX: u16 = 1000;
/// 16.00 bar
pub const HX_PRESSURE_MAX_X100: u16 = 1600;
/// 1.20 bar
pub const HX_PRESSURE_DEFAULT_X100: u16 = 120;

/// Pre-infusion timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PreinfusionConfig {
    pub enabled: bool,
    /// Pump on before the pause
    pub on_ms: u16,
    /// Soak with the pump off
    pub pause_ms: u16,
}

impl Default for PreinfusionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            on_ms: PREINFUSION_ON_MS_DEFAULT,
            pause_ms: PREINFUSION_PAUSE_MS_DEFAULT,
        }
    }
}

/// Single-boiler mode switching
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SingleBoilerTiming {
    /// Dwell before a new brew/steam setpoint takes effect
    pub switch_delay_ms: u16,
    /// Steam mode falls back to brew after this long; 0 disables
    pub steam_timeout_s: u16,
}

impl Default for SingleBoilerTiming {
    fn default() -> Self {
        Self {
            switch_delay_ms: SWITCH_DELAY_MS_DEFAULT,
            steam_timeout_s: STEAM_TIMEOUT_S_DEFAULT,
        }
    }
}

/// Control reference of a heat-exchanger machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(u8)]
pub enum HxControlMode {
    /// PID on the steam boiler probe
    #[default]
    Temperature = 0,
    /// PID on the boiler pressure transducer
    Pressure = 1,
    /// External pressurestat drives the heater; monitor only
    Pressurestat = 2,
}

impl HxControlMode {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(HxControlMode::Temperature),
            1 => Some(HxControlMode::Pressure),
            2 => Some(HxControlMode::Pressurestat),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HxSettings {
    pub mode: HxControlMode,
    /// Pressure setpoint for [`HxControlMode::Pressure`], 0.01 bar
    pub pressure_x100: u16,
}

impl Default for HxSettings {
    fn default() -> Self {
        Self {
            mode: HxControlMode::Temperature,
            pressure_x100: HX_PRESSURE_DEFAULT_X100,
        }
    }
}

/// All persisted settings
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Settings {
    pub env: EnvironmentalConfig,
    pub brew_setpoint_x10: i16,
    pub steam_setpoint_x10: i16,
    pub brew_pid: PidGains,
    pub steam_pid: PidGains,
    pub strategy: HeatingStrategy,
    pub preinfusion: PreinfusionConfig,
    pub single_boiler: SingleBoilerTiming,
    pub hx: HxSettings,
    pub cleaning_threshold: u16,
    pub cleaning_count: u16,
}

impl Settings {
    /// Factory settings for a board; electrical limits left unset
    pub fn defaults(profile: &MachineProfile) -> Self {
        Self {
            env: EnvironmentalConfig::default(),
            brew_setpoint_x10: profile.default_brew_x10,
            steam_setpoint_x10: profile.default_steam_x10,
            brew_pid: PidGains::default(),
            steam_pid: PidGains::default(),
            strategy: HeatingStrategy::default(),
            preinfusion: PreinfusionConfig::default(),
            single_boiler: SingleBoilerTiming::default(),
            hx: HxSettings::default(),
            cleaning_threshold: CLEANING_THRESHOLD_DEFAULT,
            cleaning_count: 0,
        }
    }

    /// Field ranges that must hold for a stored blob to be used
    ///
    /// Electrical limits are checked separately: a blob with unset limits is
    /// still a valid blob.
    pub fn validate(&self) -> bool {
        self.brew_pid.is_valid()
            && self.steam_pid.is_valid()
            && (CLEANING_THRESHOLD_MIN..=CLEANING_THRESHOLD_MAX).contains(&self.cleaning_threshold)
            && self.hx.pressure_x100 <= HX_PRESSURE_MAX_X100
    }
}
