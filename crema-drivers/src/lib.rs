//! Hardware driver implementations
//!
//! Concrete implementations of the crema-core traits for the parts found
//! on the control board:
//!
//! - Boiler temperature probes (NTC thermistor, MAX31855 thermocouple)
//! - Pressure transducer and water-level float switches
//! - Heater SSRs and pump relay, combined behind `Actuators`

#![no_std]
#![deny(unsafe_code)]

pub mod output;
pub mod sensor;
