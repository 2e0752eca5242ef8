//! Board profile
//!
//! Fixed at build time from the machine description; identifies the
//! topology and the hardware fitted to this board.

use crate::control::electrical::HeaterRatings;
use crate::safety::monitor::{BREW_MAX_TEMP_X10, STEAM_MAX_TEMP_X10};
use crate::safety::{SensorRequirements, SupervisorConfig};

/// Machine plumbing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Topology {
    /// Separate brew and steam boilers, each with its own heater
    DualBoiler = 0,
    /// One boiler serving both brew and steam
    SingleBoiler = 1,
    /// Steam boiler with a heat exchanger feeding the group
    HeatExchanger = 2,
}

impl Topology {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Topology::DualBoiler),
            1 => Some(Topology::SingleBoiler),
            2 => Some(Topology::HeatExchanger),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Sensors wired on this board
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SensorFit {
    pub brew_ntc: bool,
    pub steam_ntc: bool,
    pub group_thermocouple: bool,
    pub pressure: bool,
    pub water_level: bool,
}

/// Everything the firmware knows about the machine at build time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MachineProfile {
    pub name: &'static str,
    pub topology: Topology,
    pub heaters: HeaterRatings,
    pub sensors: SensorFit,
    pub default_brew_x10: i16,
    pub default_steam_x10: i16,
}

impl MachineProfile {
    /// Sensors the supervisor treats as mandatory
    pub fn required_sensors(&self) -> SensorRequirements {
        match self.topology {
            Topology::DualBoiler => SensorRequirements {
                brew: true,
                steam: true,
                ..Default::default()
            },
            Topology::SingleBoiler => SensorRequirements {
                brew: true,
                ..Default::default()
            },
            Topology::HeatExchanger => SensorRequirements {
                steam: self.sensors.steam_ntc,
                group: self.sensors.group_thermocouple,
                ..Default::default()
            },
        }
    }

    /// Limits per fitted probe
    ///
    /// A single boiler reaches steam temperature through its brew probe, so
    /// that probe gets the steam limit.
    pub fn supervisor_config(&self) -> SupervisorConfig {
        let brew_limit_x10 = match self.topology {
            Topology::SingleBoiler => STEAM_MAX_TEMP_X10,
            _ => BREW_MAX_TEMP_X10,
        };
        SupervisorConfig {
            required: self.required_sensors(),
            brew_limit_x10,
            steam_limit_x10: STEAM_MAX_TEMP_X10,
            group_limit_x10: BREW_MAX_TEMP_X10,
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub const DUAL: MachineProfile = MachineProfile {
        name: "test dual boiler",
        topology: Topology::DualBoiler,
        heaters: HeaterRatings {
            brew_watts: 1000,
            steam_watts: 1400,
        },
        sensors: SensorFit {
            brew_ntc: true,
            steam_ntc: true,
            group_thermocouple: false,
            pressure: true,
            water_level: true,
        },
        default_brew_x10: 930,
        default_steam_x10: 1400,
    };

    pub const SINGLE: MachineProfile = MachineProfile {
        name: "test single boiler",
        topology: Topology::SingleBoiler,
        heaters: HeaterRatings {
            brew_watts: 1100,
            steam_watts: 0,
        },
        sensors: SensorFit {
            brew_ntc: true,
            steam_ntc: false,
            group_thermocouple: false,
            pressure: false,
            water_level: true,
        },
        default_brew_x10: 930,
        default_steam_x10: 1400,
    };

    pub const HX: MachineProfile = MachineProfile {
        name: "test heat exchanger",
        topology: Topology::HeatExchanger,
        heaters: HeaterRatings {
            brew_watts: 0,
            steam_watts: 1400,
        },
        sensors: SensorFit {
            brew_ntc: false,
            steam_ntc: true,
            group_thermocouple: true,
            pressure: true,
            water_level: true,
        },
        default_brew_x10: 930,
        default_steam_x10: 1250,
    };
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_topology_codes() {
        for t in [Topology::DualBoiler, Topology::SingleBoiler, Topology::HeatExchanger] {
            assert_eq!(Topology::from_u8(t.as_u8()), Some(t));
        }
        assert_eq!(Topology::from_u8(3), None);
    }

    #[test]
    fn test_required_sensors_follow_topology() {
        assert!(DUAL.required_sensors().steam);
        assert!(!SINGLE.required_sensors().steam);
        let hx = HX.required_sensors();
        assert!(hx.group && hx.steam && !hx.brew);
    }

    #[test]
    fn test_single_boiler_brew_probe_uses_steam_limit() {
        assert_eq!(SINGLE.supervisor_config().brew_limit_x10, STEAM_MAX_TEMP_X10);
        assert_eq!(DUAL.supervisor_config().brew_limit_x10, BREW_MAX_TEMP_X10);
    }
}
