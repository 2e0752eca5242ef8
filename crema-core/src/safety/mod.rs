//! Safety supervision
//!
//! Detects fault conditions and decides when the machine must be forced
//! into SAFE.

pub mod flags;
pub mod monitor;

pub use flags::{SafetyFlags, SafetyLevel};
pub use monitor::{
    ResetError, SafetyInputs, SafetyReport, SafetySupervisor, SensorRequirements,
    SupervisorConfig, RESET_KEY,
};
