//! Board profile and persisted settings
//!
//! The profile is generated from machine.toml at build time; settings live
//! in flash and fall back to the profile's defaults.

pub mod loader;

pub use loader::SettingsStore;

use crema_core::config::profile::{MachineProfile, SensorFit, Topology};
use crema_core::control::HeaterRatings;

include!(concat!(env!("OUT_DIR"), "/profile.rs"));
