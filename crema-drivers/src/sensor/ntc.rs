//! NTC boiler thermistor
//!
//! Circuit: VREF -- series resistor -- ADC_PIN -- NTC -- GND. Temperature
//! comes from the beta equation rather than a table since the probes on
//! these boilers span 0–200 °C.

use crema_core::sensors::f32_to_x10;
use crema_core::traits::{SensorError, TemperatureSensor};

use super::{AdcReader, ADC_MAX};

const T25_KELVIN: f32 = 298.15;

/// Readings outside this window are treated as a failed probe
const MIN_VALID_C: f32 = -20.0;
const MAX_VALID_C: f32 = 200.0;

/// Thermistor and divider parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NtcParams {
    /// Resistance at 25 °C
    pub r25_ohms: f32,
    /// Beta coefficient, K
    pub beta: f32,
    pub series_ohms: f32,
}

impl NtcParams {
    /// 3.3 kΩ / B3950 boiler probe behind a 3.3 kΩ divider
    pub const BOILER_3K3: Self = Self {
        r25_ohms: 3300.0,
        beta: 3950.0,
        series_ohms: 3300.0,
    };
}

pub struct NtcSensor<ADC> {
    adc: ADC,
    params: NtcParams,
}

impl<ADC> NtcSensor<ADC> {
    pub fn new(adc: ADC, params: NtcParams) -> Self {
        Self { adc, params }
    }

    /// Divider output to thermistor resistance
    pub fn adc_to_resistance(&self, adc_value: u16) -> Result<f32, SensorError> {
        if adc_value >= ADC_MAX - 10 {
            return Err(SensorError::OpenCircuit);
        }
        if adc_value < 10 {
            return Err(SensorError::ShortCircuit);
        }
        let adc = adc_value as f32;
        Ok(self.params.series_ohms * adc / (ADC_MAX as f32 - adc))
    }

    /// Beta equation: 1/T = 1/T25 + ln(R/R25)/B
    pub fn resistance_to_celsius(&self, ohms: f32) -> Result<f32, SensorError> {
        let inv_t = 1.0 / T25_KELVIN + libm::logf(ohms / self.params.r25_ohms) / self.params.beta;
        if inv_t.is_nan() || inv_t <= 0.0 {
            return Err(SensorError::OutOfRange);
        }
        let celsius = 1.0 / inv_t - 273.15;
        if !(MIN_VALID_C..=MAX_VALID_C).contains(&celsius) {
            return Err(SensorError::OutOfRange);
        }
        Ok(celsius)
    }
}

impl<ADC: AdcReader> TemperatureSensor for NtcSensor<ADC> {
    fn read_celsius_x10(&mut self) -> Result<i16, SensorError> {
        let raw = self.adc.read().map_err(|_| SensorError::ConversionError)?;
        let ohms = self.adc_to_resistance(raw)?;
        self.resistance_to_celsius(ohms).map(f32_to_x10)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::DummyAdc;

    fn probe(adc: u16) -> NtcSensor<DummyAdc> {
        NtcSensor::new(DummyAdc(adc), NtcParams::BOILER_3K3)
    }

    #[test]
    fn test_midscale_is_25c() {
        let t = probe(2048).read_celsius_x10().unwrap();
        assert!((t - 250).abs() <= 2, "got {t}");
    }

    #[test]
    fn test_brew_temperature() {
        // R ≈ 281.6 Ω
        let t = probe(322).read_celsius_x10().unwrap();
        assert!((t - 930).abs() <= 5, "got {t}");
    }

    #[test]
    fn test_wiring_faults() {
        assert_eq!(probe(4095).read_celsius_x10(), Err(SensorError::OpenCircuit));
        assert_eq!(probe(3).read_celsius_x10(), Err(SensorError::ShortCircuit));
    }

    #[test]
    fn test_implausible_reading() {
        // ~20 Ω is far above 200 °C
        assert_eq!(probe(25).read_celsius_x10(), Err(SensorError::OutOfRange));
    }
}
