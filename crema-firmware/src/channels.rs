//! State shared between the two cores
//!
//! Everything here is a static behind a critical-section mutex, so either
//! core can touch it without an executor in common.

use core::cell::Cell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::signal::Signal;

use crema_core::sensors::SensorSample;
use crema_core::{SharedMachine, SnapshotCell};

/// The machine; installed by `main` before either context starts
pub static MACHINE: SharedMachine = SharedMachine::new();

/// Latest status, written by control once per cycle
pub static SNAPSHOT: SnapshotCell = SnapshotCell::new();

/// Latest filtered sensor read, written by the sensor task
pub static SAMPLE: Mutex<CriticalSectionRawMutex, Cell<SensorSample>> =
    Mutex::new(Cell::new(SensorSample {
        brew_temp_x10: None,
        steam_temp_x10: None,
        group_temp_x10: None,
        pressure_x100: None,
        water_level: None,
    }));

/// Control asks comms to write settings to flash
pub static PERSIST_REQUEST: Signal<CriticalSectionRawMutex, ()> = Signal::new();

pub fn latest_sample() -> SensorSample {
    SAMPLE.lock(|cell| cell.get())
}

pub fn publish_sample(sample: SensorSample) {
    SAMPLE.lock(|cell| cell.set(sample));
}
