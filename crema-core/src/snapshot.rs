//! Published status snapshot
//!
//! The control context writes one [`StatusSnapshot`] per cycle; the
//! communication context copies the latest one whenever a STATUS is due.
//! Both sides move the whole value under a critical section, so a reader
//! never sees half of one cycle and half of the next.

use core::cell::Cell;

use crema_protocol::messages::{
    StatusReport, STATUS_ALARM, STATUS_BREWING, STATUS_CLEANING_DUE, STATUS_HEATING,
    STATUS_PUMP_ON, STATUS_WATER_LOW, TEMP_INVALID,
};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;

use crate::config::profile::Topology;
use crate::control::{ControlOutputs, HeatingStrategy};
use crate::safety::{SafetyFlags, SafetyLevel};
use crate::sensors::SensorSample;
use crate::state::{MachineMode, MachineState};

/// Most recent safety alarm
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Alarm {
    /// Bumped for every new alarm
    pub seq: u16,
    /// The flag that rose
    pub code: u8,
    pub level: SafetyLevel,
    /// Reading behind the alarm, 0.1 °C or percent
    pub value: i16,
}

/// Temperatures as reported, after topology mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ReportedTemps {
    pub brew_x10: Option<i16>,
    pub steam_x10: Option<i16>,
    pub group_x10: Option<i16>,
}

impl ReportedTemps {
    /// Map probe readings onto the brew/steam fields the UI shows
    ///
    /// A heat exchanger has no brew boiler, so the group probe stands in for
    /// it. A single boiler is both the brew and the steam boiler.
    pub fn for_topology(topology: Topology, sample: &SensorSample) -> Self {
        match topology {
            Topology::DualBoiler => Self {
                brew_x10: sample.brew_temp_x10,
                steam_x10: sample.steam_temp_x10,
                group_x10: sample.group_temp_x10,
            },
            Topology::SingleBoiler => Self {
                brew_x10: sample.brew_temp_x10,
                steam_x10: sample.brew_temp_x10,
                group_x10: sample.group_temp_x10,
            },
            Topology::HeatExchanger => Self {
                brew_x10: sample.group_temp_x10,
                steam_x10: sample.steam_temp_x10,
                group_x10: sample.group_temp_x10,
            },
        }
    }
}

/// Everything the link reports about the machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StatusSnapshot {
    pub temps: ReportedTemps,
    pub pressure_x100: Option<u16>,
    pub water_level: Option<u8>,
    pub brew_setpoint_x10: i16,
    pub steam_setpoint_x10: i16,
    pub outputs: ControlOutputs,
    pub state: MachineState,
    pub mode: MachineMode,
    pub safety_level: SafetyLevel,
    pub safety_flags: SafetyFlags,
    pub strategy: HeatingStrategy,
    pub uptime_ms: u64,
    pub shot_start_ms: Option<u64>,
    pub cleaning_count: u16,
    pub cleaning_due: bool,
    pub alarm: Option<Alarm>,
}

impl StatusSnapshot {
    pub const fn initial() -> Self {
        Self {
            temps: ReportedTemps {
                brew_x10: None,
                steam_x10: None,
                group_x10: None,
            },
            pressure_x100: None,
            water_level: None,
            brew_setpoint_x10: 0,
            steam_setpoint_x10: 0,
            outputs: ControlOutputs::OFF,
            state: MachineState::Init,
            mode: MachineMode::Idle,
            safety_level: SafetyLevel::Ok,
            safety_flags: SafetyFlags::empty(),
            strategy: HeatingStrategy::Sequential,
            uptime_ms: 0,
            shot_start_ms: None,
            cleaning_count: 0,
            cleaning_due: false,
            alarm: None,
        }
    }

    /// STATUS flag byte
    pub fn status_flags(&self) -> u8 {
        let mut flags = 0;
        if self.state == MachineState::Brewing {
            flags |= STATUS_BREWING;
        }
        if self.outputs.pump > 0 {
            flags |= STATUS_PUMP_ON;
        }
        if self.outputs.heating() {
            flags |= STATUS_HEATING;
        }
        if self.safety_flags.contains(SafetyFlags::WATER_LOW) {
            flags |= STATUS_WATER_LOW;
        }
        if self.safety_level >= SafetyLevel::Fault {
            flags |= STATUS_ALARM;
        }
        if self.cleaning_due {
            flags |= STATUS_CLEANING_DUE;
        }
        flags
    }

    pub fn to_report(&self) -> StatusReport {
        let temp = |t: Option<i16>| t.unwrap_or(TEMP_INVALID);
        StatusReport {
            brew_temp_x10: temp(self.temps.brew_x10),
            steam_temp_x10: temp(self.temps.steam_x10),
            group_temp_x10: temp(self.temps.group_x10),
            pressure_x100: self.pressure_x100.unwrap_or(0),
            brew_setpoint_x10: self.brew_setpoint_x10,
            steam_setpoint_x10: self.steam_setpoint_x10,
            brew_duty: self.outputs.brew_heater,
            steam_duty: self.outputs.steam_heater,
            pump_duty: self.outputs.pump,
            state: self.state as u8,
            mode: self.mode as u8,
            flags: self.status_flags(),
            water_level: self.water_level.unwrap_or(0),
            safety_level: self.safety_level as u8,
            safety_flags: self.safety_flags.bits(),
            strategy: self.strategy.as_u8(),
            power_watts: self.outputs.power_watts,
            uptime_ms: wire_ms(self.uptime_ms),
            shot_start_ms: self.shot_start_ms.map_or(0, wire_ms),
            cleaning_count: self.cleaning_count,
        }
    }
}

/// Milliseconds for a 32-bit wire field, pinned at `u32::MAX` after ~49 days
pub fn wire_ms(ms: u64) -> u32 {
    u32::try_from(ms).unwrap_or(u32::MAX)
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self::initial()
    }
}

/// Single-writer, single-reader publication point
pub struct SnapshotCell {
    inner: Mutex<CriticalSectionRawMutex, Cell<StatusSnapshot>>,
}

impl SnapshotCell {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(Cell::new(StatusSnapshot::initial())),
        }
    }

    /// Replace the published snapshot
    pub fn publish(&self, snapshot: StatusSnapshot) {
        self.inner.lock(|cell| cell.set(snapshot));
    }

    /// Copy of the latest snapshot
    pub fn latest(&self) -> StatusSnapshot {
        self.inner.lock(|cell| cell.get())
    }
}

impl Default for SnapshotCell {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SensorSample {
        SensorSample {
            brew_temp_x10: Some(931),
            steam_temp_x10: Some(1402),
            group_temp_x10: Some(905),
            pressure_x100: Some(110),
            water_level: Some(70),
        }
    }

    #[test]
    fn test_heat_exchanger_reports_group_as_brew() {
        let temps = ReportedTemps::for_topology(Topology::HeatExchanger, &sample());
        assert_eq!(temps.brew_x10, Some(905));
        assert_eq!(temps.steam_x10, Some(1402));
    }

    #[test]
    fn test_single_boiler_reports_one_temperature() {
        let temps = ReportedTemps::for_topology(Topology::SingleBoiler, &sample());
        assert_eq!(temps.brew_x10, Some(931));
        assert_eq!(temps.steam_x10, Some(931));
    }

    #[test]
    fn test_report_flags_and_missing_sensor() {
        let snapshot = StatusSnapshot {
            state: MachineState::Brewing,
            outputs: ControlOutputs {
                brew_heater: 40,
                steam_heater: 0,
                pump: 100,
                power_watts: 400,
            },
            safety_flags: SafetyFlags::WATER_LOW,
            safety_level: SafetyLevel::Fault,
            cleaning_due: true,
            ..StatusSnapshot::initial()
        };
        let report = snapshot.to_report();
        assert_eq!(
            report.flags,
            STATUS_BREWING
                | STATUS_PUMP_ON
                | STATUS_HEATING
                | STATUS_WATER_LOW
                | STATUS_ALARM
                | STATUS_CLEANING_DUE
        );
        assert_eq!(report.brew_temp_x10, TEMP_INVALID);
        assert_eq!(report.power_watts, 400);
    }

    #[test]
    fn test_long_uptime_saturates() {
        let snapshot = StatusSnapshot {
            uptime_ms: u32::MAX as u64 + 5_000,
            shot_start_ms: Some(u32::MAX as u64 + 1),
            ..StatusSnapshot::initial()
        };
        let report = snapshot.to_report();
        assert_eq!(report.uptime_ms, u32::MAX);
        assert_eq!(report.shot_start_ms, u32::MAX);
        assert_eq!(wire_ms(1234), 1234);
    }

    #[test]
    fn test_cell_publishes_whole_value() {
        let cell = SnapshotCell::new();
        assert_eq!(cell.latest(), StatusSnapshot::initial());
        let snapshot = StatusSnapshot {
            uptime_ms: 1234,
            brew_setpoint_x10: 930,
            ..StatusSnapshot::initial()
        };
        cell.publish(snapshot);
        assert_eq!(cell.latest(), snapshot);
    }
}
