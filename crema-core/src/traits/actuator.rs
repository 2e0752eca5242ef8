//! Actuator outputs

use crate::control::ControlOutputs;

/// Heater and pump drivers
///
/// Only the control cycle calls this, and only with outputs produced by
/// the control engine.
pub trait Actuators {
    /// Drive heaters and pump to the given duties
    fn apply(&mut self, outputs: &ControlOutputs);

    /// Everything off, regardless of the last applied outputs
    fn all_off(&mut self);
}
