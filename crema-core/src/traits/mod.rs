//! Hardware abstraction traits
//!
//! The seams between the control cycle and the board: sensors feed it,
//! actuators and the watchdog are driven by it.

pub mod actuator;
pub mod sensor;
pub mod watchdog;

pub use actuator::Actuators;
pub use sensor::{SensorError, TemperatureSensor};
pub use watchdog::Watchdog;
