//! Board-agnostic core logic for the Crema control board
//!
//! Everything here runs on the host as well as on target:
//!
//! - Safety supervisor and its latched/live flags
//! - Machine state machine and brew lifecycle
//! - Control engine: PID loops, boiler topologies, current budget
//! - Command dispatch from link packets to the machine
//! - Serial bootloader receive loop and install plan
//! - Settings and board profile types
//!
//! Hardware is reached only through the traits in [`traits`] and
//! `crema-hal`.

#![no_std]
#![deny(unsafe_code)]

pub mod bootloader;
pub mod cleaning;
pub mod config;
pub mod control;
pub mod cycle;
pub mod dispatch;
pub mod machine;
pub mod safety;
pub mod sensors;
pub mod snapshot;
pub mod state;
pub mod traits;

pub use cycle::run_cycle;
pub use machine::{CycleReport, Machine, SharedMachine, UpdateHold};
pub use snapshot::{SnapshotCell, StatusSnapshot};
