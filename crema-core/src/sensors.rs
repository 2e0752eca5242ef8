//! Sensor readings
//!
//! The sensor task produces one [`SensorSample`] per poll; everything
//! downstream consumes it by value. Drivers are responsible for
//! calibration, so values here are already in engineering units.

/// One read of all physical sensors
///
/// `None` means the sensor is absent or its last read failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SensorSample {
    /// Brew boiler temperature, 0.1 °C
    pub brew_temp_x10: Option<i16>,
    /// Steam boiler temperature, 0.1 °C
    pub steam_temp_x10: Option<i16>,
    /// Group head temperature, 0.1 °C
    pub group_temp_x10: Option<i16>,
    /// Boiler pressure, 0.01 bar
    pub pressure_x100: Option<u16>,
    /// Reservoir level, 0–100 %
    pub water_level: Option<u8>,
}

impl SensorSample {
    pub fn brew_c(&self) -> Option<f32> {
        self.brew_temp_x10.map(x10_to_f32)
    }

    pub fn steam_c(&self) -> Option<f32> {
        self.steam_temp_x10.map(x10_to_f32)
    }

    pub fn group_c(&self) -> Option<f32> {
        self.group_temp_x10.map(x10_to_f32)
    }

    pub fn pressure_bar(&self) -> Option<f32> {
        self.pressure_x100.map(|p| p as f32 / 100.0)
    }
}

/// Tenths of a degree to degrees
pub fn x10_to_f32(v: i16) -> f32 {
    v as f32 / 10.0
}

/// Degrees to tenths of a degree, rounded and saturated
pub fn f32_to_x10(v: f32) -> i16 {
    let scaled = libm::roundf(v * 10.0);
    if scaled >= i16::MAX as f32 {
        i16::MAX
    } else if scaled <= i16::MIN as f32 {
        i16::MIN
    } else {
        scaled as i16
    }
}
