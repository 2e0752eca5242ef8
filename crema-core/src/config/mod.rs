//! Machine configuration
//!
//! [`profile`] is fixed per board and baked in at build time; [`settings`]
//! is what the link can change and what survives a power cycle, stored as
//! a postcard blob framed by [`persistence`].

#[cfg(feature = "serde")]
pub mod persistence;
pub mod profile;
pub mod settings;

pub use profile::{MachineProfile, Topology};
pub use settings::Settings;
