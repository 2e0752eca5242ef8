//! ADC channels shared between sensor drivers
//!
//! RP2040 has a single converter; every analog sensor holds an
//! [`AdcInput`] that borrows it for the duration of one conversion.

use core::cell::RefCell;

use embassy_rp::adc::{Adc, Blocking, Channel};

use crema_drivers::sensor::AdcReader;

pub struct SharedAdc<'d> {
    adc: RefCell<Adc<'d, Blocking>>,
}

impl<'d> SharedAdc<'d> {
    pub fn new(adc: Adc<'d, Blocking>) -> Self {
        Self {
            adc: RefCell::new(adc),
        }
    }

    pub fn input<'a>(&'a self, channel: Channel<'d>) -> AdcInput<'a, 'd> {
        AdcInput { adc: self, channel }
    }
}

pub struct AdcInput<'a, 'd> {
    adc: &'a SharedAdc<'d>,
    channel: Channel<'d>,
}

impl AdcReader for AdcInput<'_, '_> {
    fn read(&mut self) -> Result<u16, ()> {
        let mut adc = self.adc.adc.try_borrow_mut().map_err(|_| ())?;
        adc.blocking_read(&mut self.channel).map_err(|_| ())
    }
}
