//! All actuators of one board behind [`Actuators`]

use embedded_hal::digital::OutputPin;
use embedded_hal::pwm::SetDutyCycle;

use crema_core::control::ControlOutputs;
use crema_core::traits::Actuators;

use super::ssr::{PumpRelay, SsrHeater};

/// Heater SSRs and pump relay
///
/// Topologies without a brew or steam element leave that slot empty.
/// Write failures are counted rather than returned, because the control
/// cycle cannot do anything with them beyond what the supervisor already
/// does with the resulting temperatures.
pub struct BoardOutputs<H, R> {
    brew: Option<SsrHeater<H>>,
    steam: Option<SsrHeater<H>>,
    pump: PumpRelay<R>,
    write_errors: u32,
}

impl<H: SetDutyCycle, R: OutputPin> BoardOutputs<H, R> {
    pub fn new(brew: Option<H>, steam: Option<H>, pump: R) -> Self {
        Self {
            brew: brew.map(SsrHeater::new),
            steam: steam.map(SsrHeater::new),
            pump: PumpRelay::new(pump),
            write_errors: 0,
        }
    }

    /// Duties as last written, for diagnostics
    pub fn current(&self) -> (u8, u8, bool) {
        (
            self.brew.as_ref().map_or(0, |h| h.duty()),
            self.steam.as_ref().map_or(0, |h| h.duty()),
            self.pump.is_on(),
        )
    }

    pub fn write_errors(&self) -> u32 {
        self.write_errors
    }

    fn write(&mut self, brew: u8, steam: u8, pump: bool) {
        let mut failed = 0;
        if let Some(h) = self.brew.as_mut() {
            failed += h.set_duty(brew).is_err() as u32;
        }
        if let Some(h) = self.steam.as_mut() {
            failed += h.set_duty(steam).is_err() as u32;
        }
        failed += self.pump.set_on(pump).is_err() as u32;
        self.write_errors = self.write_errors.saturating_add(failed);
    }
}

impl<H: SetDutyCycle, R: OutputPin> Actuators for BoardOutputs<H, R> {
    fn apply(&mut self, outputs: &ControlOutputs) {
        self.write(outputs.brew_heater, outputs.steam_heater, outputs.pump > 0);
    }

    fn all_off(&mut self) {
        self.write(0, 0, false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::convert::Infallible;

    struct Pwm {
        duty: u16,
    }

    impl embedded_hal::pwm::ErrorType for Pwm {
        type Error = Infallible;
    }

    impl SetDutyCycle for Pwm {
        fn max_duty_cycle(&self) -> u16 {
            1000
        }
        fn set_duty_cycle(&mut self, duty: u16) -> Result<(), Infallible> {
            self.duty = duty;
            Ok(())
        }
    }

    struct Pin(bool);

    impl embedded_hal::digital::ErrorType for Pin {
        type Error = Infallible;
    }

    impl OutputPin for Pin {
        fn set_low(&mut self) -> Result<(), Infallible> {
            self.0 = false;
            Ok(())
        }
        fn set_high(&mut self) -> Result<(), Infallible> {
            self.0 = true;
            Ok(())
        }
    }

    fn board() -> BoardOutputs<Pwm, Pin> {
        BoardOutputs::new(Some(Pwm { duty: 500 }), Some(Pwm { duty: 500 }), Pin(true))
    }

    #[test]
    fn test_construction_starts_off() {
        let b = board();
        assert_eq!(b.current(), (0, 0, false));
        assert_eq!(b.brew.as_ref().unwrap().pwm.duty, 0);
    }

    #[test]
    fn test_apply_and_all_off() {
        let mut b = board();
        b.apply(&ControlOutputs {
            brew_heater: 60,
            steam_heater: 120,
            pump: 100,
            power_watts: 0,
        });
        assert_eq!(b.current(), (60, 100, true));
        assert_eq!(b.brew.as_ref().unwrap().pwm.duty, 600);

        b.all_off();
        assert_eq!(b.current(), (0, 0, false));
        assert!(!b.pump.pin.0);
        assert_eq!(b.write_errors(), 0);
    }

    #[test]
    fn test_missing_element_ignored() {
        let mut b: BoardOutputs<Pwm, Pin> = BoardOutputs::new(None, Some(Pwm { duty: 0 }), Pin(false));
        b.apply(&ControlOutputs {
            brew_heater: 80,
            steam_heater: 40,
            pump: 0,
            power_watts: 0,
        });
        assert_eq!(b.current(), (0, 40, false));
    }
}
