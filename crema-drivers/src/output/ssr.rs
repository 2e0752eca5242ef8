//! Heater SSRs and the pump relay
//!
//! Heater SSRs are zero-crossing types driven by a slow hardware PWM
//! (about 7.5 Hz at 125 MHz), so duty maps directly to the share of mains
//! half-cycles.

use embedded_hal::digital::OutputPin;
use embedded_hal::pwm::SetDutyCycle;

/// Integer clock divider for the SSR PWM slices
pub const SSR_PWM_DIVIDER: u8 = 255;
/// Counter wrap for the SSR PWM slices
pub const SSR_PWM_TOP: u16 = u16::MAX;

/// SSR window frequency for a given system clock
pub fn ssr_pwm_hz(sys_clk_hz: u32) -> f32 {
    sys_clk_hz as f32 / (SSR_PWM_DIVIDER as f32 * (SSR_PWM_TOP as f32 + 1.0))
}

/// Heater behind a PWM-driven solid-state relay
pub struct SsrHeater<P> {
    pub(crate) pwm: P,
    duty: u8,
}

impl<P: SetDutyCycle> SsrHeater<P> {
    /// Takes the channel and drives it to zero
    pub fn new(mut pwm: P) -> Self {
        let _ = pwm.set_duty_cycle_fully_off();
        Self { pwm, duty: 0 }
    }

    /// Set duty in percent, clamped to 100
    pub fn set_duty(&mut self, percent: u8) -> Result<(), P::Error> {
        let percent = percent.min(100);
        if percent == 0 {
            self.pwm.set_duty_cycle_fully_off()?;
        } else {
            self.pwm.set_duty_cycle_percent(percent)?;
        }
        self.duty = percent;
        Ok(())
    }

    pub fn duty(&self) -> u8 {
        self.duty
    }
}

/// Pump on a relay or triac; any non-zero duty runs it
pub struct PumpRelay<P> {
    pub(crate) pin: P,
    on: bool,
}

impl<P: OutputPin> PumpRelay<P> {
    pub fn new(mut pin: P) -> Self {
        let _ = pin.set_low();
        Self { pin, on: false }
    }

    pub fn set_on(&mut self, on: bool) -> Result<(), P::Error> {
        if on {
            self.pin.set_high()?;
        } else {
            self.pin.set_low()?;
        }
        self.on = on;
        Ok(())
    }

    pub fn is_on(&self) -> bool {
        self.on
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ssr_window_is_slow_enough_for_zero_cross() {
        let hz = ssr_pwm_hz(125_000_000);
        assert!((hz - 7.48).abs() < 0.01, "{hz}");
        // At least a few mains half-cycles per window at 50 Hz
        assert!(100.0 / hz > 10.0);
    }
}
