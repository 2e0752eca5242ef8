//! Ratiometric 0.5–4.5 V pressure transducer
//!
//! The transducer output reaches the ADC through a 10k/15k divider.

use crema_core::traits::SensorError;

use super::{AdcReader, ADC_MAX};

const VREF: f32 = 3.3;
const DIVIDER: f32 = 0.6;
const V_ZERO: f32 = 0.5;
const V_SPAN: f32 = 4.0;

pub struct PressureTransducer<ADC> {
    adc: ADC,
    full_scale_bar: f32,
}

impl<ADC: AdcReader> PressureTransducer<ADC> {
    pub fn new(adc: ADC, full_scale_bar: f32) -> Self {
        Self {
            adc,
            full_scale_bar,
        }
    }

    /// Pressure in 0.01 bar
    pub fn read_x100(&mut self) -> Result<u16, SensorError> {
        let raw = self.adc.read().map_err(|_| SensorError::ConversionError)?;
        let v_adc = raw as f32 * VREF / ADC_MAX as f32;
        // A disconnected transducer floats to either rail
        if !(0.2..=3.0).contains(&v_adc) {
            return Err(SensorError::OutOfRange);
        }
        let v = v_adc / DIVIDER;
        if !(0.3..=4.7).contains(&v) {
            return Err(SensorError::OutOfRange);
        }
        let bar = ((v - V_ZERO) * self.full_scale_bar / V_SPAN).clamp(0.0, self.full_scale_bar);
        Ok(libm::roundf(bar * 100.0) as u16)
    }
}
