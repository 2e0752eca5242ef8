//! Machine state
//!
//! The lattice of machine states, the shot sequencer and the driver that
//! arbitrates link requests against safety and readiness.

pub mod brew;
pub mod events;
pub mod lifecycle;
pub mod machine;

pub use brew::{BrewPhase, Shot};
pub use events::Event;
pub use lifecycle::{FinishedShot, ModeGate, RequestError, StateMachine, TickInputs, TickReport};
pub use machine::{MachineMode, MachineState};
