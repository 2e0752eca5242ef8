//! Heat exchanger: only the steam boiler is driven
//!
//! Brew water is heated passively through the exchanger and watched on the
//! group probe.

use crate::config::settings::{HxControlMode, HxSettings};
use crate::sensors::SensorSample;

use super::engine::Loops;

/// Pressure readings outside this window are ignored
pub const PRESSURE_VALID_BAR: core::ops::RangeInclusive<f32> = 0.0..=16.0;

#[derive(Debug, Clone)]
pub(crate) struct HeatExchanger {
    pub settings: HxSettings,
}

impl HeatExchanger {
    pub fn new(settings: HxSettings) -> Self {
        Self { settings }
    }

    pub fn pressure_setpoint_bar(&self) -> f32 {
        self.settings.pressure_x100 as f32 / 100.0
    }

    /// Steam heater demand
    pub fn update(&mut self, loops: &mut Loops, sample: &SensorSample, dt: f32) -> f32 {
        match self.settings.mode {
            HxControlMode::Temperature => {
                sample.steam_c().map_or(0.0, |t| loops.steam.compute(t, dt))
            }
            HxControlMode::Pressure => match sample.pressure_bar() {
                Some(bar) if PRESSURE_VALID_BAR.contains(&bar) => loops.steam.compute(bar, dt),
                _ => 0.0,
            },
            // Heater wired through the pressurestat
            HxControlMode::Pressurestat => 0.0,
        }
    }
}
