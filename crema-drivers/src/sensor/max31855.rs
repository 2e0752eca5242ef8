//! MAX31855 thermocouple converter on the group head
//!
//! Read-only SPI device: 32 bits per conversion, MSB first.
//!
//! ```text
//! D31..D18  thermocouple temperature, signed, 0.25 °C
//! D16       fault
//! D2        short to VCC
//! D1        short to GND
//! D0        open circuit
//! ```

use embedded_hal::digital::OutputPin;
use embedded_hal::spi::SpiBus;

use crema_core::traits::{SensorError, TemperatureSensor};

const FAULT: u32 = 1 << 16;
const OPEN_CIRCUIT: u32 = 1 << 0;

const MIN_VALID_X10: i16 = -500;
const MAX_VALID_X10: i16 = 2000;

/// Converter with its own chip select on an otherwise unshared bus
pub struct Max31855<SPI, CS> {
    spi: SPI,
    cs: CS,
}

impl<SPI: SpiBus, CS: OutputPin> Max31855<SPI, CS> {
    pub fn new(spi: SPI, mut cs: CS) -> Self {
        let _ = cs.set_high();
        Self { spi, cs }
    }

    fn read_raw(&mut self) -> Result<u32, SensorError> {
        let mut buf = [0u8; 4];
        self.cs.set_low().map_err(|_| SensorError::ConversionError)?;
        let result = self.spi.read(&mut buf).and_then(|_| self.spi.flush());
        self.cs.set_high().map_err(|_| SensorError::ConversionError)?;
        result.map_err(|_| SensorError::ConversionError)?;
        Ok(u32::from_be_bytes(buf))
    }
}

/// Decode one 32-bit frame to 0.1 °C
pub fn decode(raw: u32) -> Result<i16, SensorError> {
    if raw & FAULT != 0 {
        return Err(if raw & OPEN_CIRCUIT != 0 {
            SensorError::OpenCircuit
        } else {
            SensorError::ShortCircuit
        });
    }
    // Arithmetic shift keeps the sign of the 14-bit field
    let quarters = (raw as i32) >> 18;
    let x10 = (quarters * 10 / 4) as i16;
    if !(MIN_VALID_X10..=MAX_VALID_X10).contains(&x10) {
        return Err(SensorError::OutOfRange);
    }
    Ok(x10)
}

impl<SPI: SpiBus, CS: OutputPin> TemperatureSensor for Max31855<SPI, CS> {
    fn read_celsius_x10(&mut self) -> Result<i16, SensorError> {
        decode(self.read_raw()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::convert::Infallible;

    fn frame(quarters: i32) -> u32 {
        (quarters << 18) as u32
    }

    #[test]
    fn test_decode_temperatures() {
        assert_eq!(decode(frame(400)), Ok(1000));
        assert_eq!(decode(frame(373)), Ok(932));
        assert_eq!(decode(frame(-40)), Ok(-100));
    }

    #[test]
    fn test_decode_faults() {
        assert_eq!(decode(FAULT | OPEN_CIRCUIT), Err(SensorError::OpenCircuit));
        assert_eq!(decode(FAULT | 0b010), Err(SensorError::ShortCircuit));
        assert_eq!(decode(frame(1000)), Err(SensorError::OutOfRange));
    }

    struct FakeBus([u8; 4]);
    struct FakeCs(bool);

    impl embedded_hal::spi::ErrorType for FakeBus {
        type Error = Infallible;
    }

    impl SpiBus for FakeBus {
        fn read(&mut self, words: &mut [u8]) -> Result<(), Infallible> {
            words.copy_from_slice(&self.0[..words.len()]);
            Ok(())
        }
        fn write(&mut self, _: &[u8]) -> Result<(), Infallible> {
            Ok(())
        }
        fn transfer(&mut self, read: &mut [u8], _: &[u8]) -> Result<(), Infallible> {
            self.read(read)
        }
        fn transfer_in_place(&mut self, words: &mut [u8]) -> Result<(), Infallible> {
            self.read(words)
        }
        fn flush(&mut self) -> Result<(), Infallible> {
            Ok(())
        }
    }

    impl embedded_hal::digital::ErrorType for FakeCs {
        type Error = Infallible;
    }

    impl OutputPin for FakeCs {
        fn set_low(&mut self) -> Result<(), Infallible> {
            self.0 = false;
            Ok(())
        }
        fn set_high(&mut self) -> Result<(), Infallible> {
            self.0 = true;
            Ok(())
        }
    }

    #[test]
    fn test_reads_over_spi() {
        let raw = frame(372).to_be_bytes();
        let mut tc = Max31855::new(FakeBus(raw), FakeCs(false));
        assert_eq!(tc.read_celsius_x10(), Ok(930));
        assert!(tc.cs.0, "chip select released");
    }
}
