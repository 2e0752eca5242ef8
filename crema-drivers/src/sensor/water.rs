//! Float switches
//!
//! Each switch reads high while water covers it. Missing switches are
//! assumed satisfied.

use embedded_hal::digital::InputPin;

use crema_core::traits::SensorError;

pub struct WaterSwitches<P> {
    reservoir: Option<P>,
    tank: Option<P>,
    steam_boiler: Option<P>,
}

impl<P: InputPin> WaterSwitches<P> {
    pub fn new(reservoir: Option<P>, tank: Option<P>, steam_boiler: Option<P>) -> Self {
        Self {
            reservoir,
            tank,
            steam_boiler,
        }
    }

    /// Coarse level in percent
    ///
    /// Empty reservoir reads 0, low tank 20, low steam boiler 50, else 100.
    pub fn read_percent(&mut self) -> Result<u8, SensorError> {
        if !covered(&mut self.reservoir)? {
            return Ok(0);
        }
        if !covered(&mut self.tank)? {
            return Ok(20);
        }
        if !covered(&mut self.steam_boiler)? {
            return Ok(50);
        }
        Ok(100)
    }
}

fn covered<P: InputPin>(pin: &mut Option<P>) -> Result<bool, SensorError> {
    match pin {
        Some(p) => p.is_high().map_err(|_| SensorError::ConversionError),
        None => Ok(true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::convert::Infallible;

    struct Switch(bool);

    impl embedded_hal::digital::ErrorType for Switch {
        type Error = Infallible;
    }

    impl InputPin for Switch {
        fn is_high(&mut self) -> Result<bool, Infallible> {
            Ok(self.0)
        }
        fn is_low(&mut self) -> Result<bool, Infallible> {
            Ok(!self.0)
        }
    }

    #[test]
    fn test_levels() {
        let level = |r, t, s| {
            WaterSwitches::new(Some(Switch(r)), Some(Switch(t)), Some(Switch(s)))
                .read_percent()
                .unwrap()
        };
        assert_eq!(level(true, true, true), 100);
        assert_eq!(level(true, true, false), 50);
        assert_eq!(level(true, false, true), 20);
        assert_eq!(level(false, true, true), 0);
    }

    #[test]
    fn test_missing_switches_read_full() {
        let mut w: WaterSwitches<Switch> = WaterSwitches::new(None, None, None);
        assert_eq!(w.read_percent(), Ok(100));
    }
}
