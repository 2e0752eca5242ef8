//! Temperature sensor trait

/// Errors that can occur with temperature sensing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SensorError {
    /// Sensor disconnected (open circuit)
    OpenCircuit,
    /// Sensor shorted to ground or supply
    ShortCircuit,
    /// Reading out of the sensor's range
    OutOfRange,
    /// ADC or bus transfer failed
    ConversionError,
}

/// A probe returning calibrated temperatures
pub trait TemperatureSensor {
    /// Current temperature in 0.1 °C (45.5 °C is 455)
    ///
    /// Takes `&mut self` because reads go through an ADC or a bus.
    fn read_celsius_x10(&mut self) -> Result<i16, SensorError>;

    /// Sample form: failed reads become `None`
    fn read_x10(&mut self) -> Option<i16> {
        self.read_celsius_x10().ok()
    }
}
