//! Sensor drivers
//!
//! Temperature probes implement [`crema_core::traits::TemperatureSensor`];
//! the pressure transducer and level switches have their own read methods
//! since they report different units.

pub mod filter;
pub mod max31855;
pub mod ntc;
pub mod pressure;
pub mod water;

pub use filter::MovingAverage;
pub use max31855::Max31855;
pub use ntc::{NtcParams, NtcSensor};
pub use pressure::PressureTransducer;
pub use water::WaterSwitches;

/// ADC full scale for the 12-bit converter
pub const ADC_MAX: u16 = 4095;

/// ADC reading trait for platform abstraction
pub trait AdcReader {
    /// Read ADC value (12-bit, 0-4095)
    #[allow(clippy::result_unit_err)]
    fn read(&mut self) -> Result<u16, ()>;
}

/// Fixed ADC value for tests
#[cfg(test)]
pub struct DummyAdc(pub u16);

#[cfg(test)]
impl AdcReader for DummyAdc {
    fn read(&mut self) -> Result<u16, ()> {
        Ok(self.0)
    }
}
