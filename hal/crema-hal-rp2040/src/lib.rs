//! RP2040 support for the Crema control board
//!
//! Implementations of the `crema-hal` and `crema-core` traits on top of
//! embassy-rp:
//!
//! - Flash: settings store and staging-region programming
//! - Polled UART link for the bootloader
//! - Boot-ROM installer that replaces the running image
//! - Hardware watchdog and shared ADC inputs

#![no_std]
#![deny(unsafe_code)]

pub mod adc;
pub mod flash;
#[allow(unsafe_code)]
pub mod installer;
pub mod link;
pub mod watchdog;

pub use flash::{Rp2040Flash, LAYOUT};
pub use installer::RomInstaller;
pub use link::PolledLink;
pub use watchdog::BoardWatchdog;
