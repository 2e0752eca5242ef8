//! Events that trigger state transitions

/// Events that can trigger state transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    // Lifecycle
    /// Subsystems initialized
    InitComplete,
    /// Operator reset accepted by the supervisor
    Reset,

    // Mode requests
    /// BREW or STEAM mode requested
    HeatRequested,
    /// IDLE mode requested
    IdleRequested,

    // Temperature
    /// Active loop within tolerance of its setpoint
    TemperatureReached,
    /// Active loop fell well below its setpoint
    TemperatureLost,

    // Brew
    BrewStart,
    /// Shot stopped by request or by its time limit
    BrewEnded { at_temperature: bool },

    // Safety
    /// Supervisor reported FAULT
    FaultDetected,
    /// Supervisor level back below FAULT
    FaultCleared,
    /// Supervisor reported CRITICAL
    Critical,
    /// SAFE requested over the link
    SafeRequested,
}
