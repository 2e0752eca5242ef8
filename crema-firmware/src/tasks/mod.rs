//! Embassy tasks
//!
//! Core 0 runs [`comms_task`]; core 1 runs [`control_task`] and
//! [`sensor_task`]. They meet only through [`crate::channels`].

pub mod bootloader;
pub mod comms;
pub mod control;
pub mod sensors;

pub use comms::comms_task;
pub use control::control_task;
pub use sensors::{sensor_task, BoardSensors};
