//! Crema Hardware Abstraction Layer
//!
//! Traits that chip-specific HALs implement so the control logic and the
//! bootloader can run against real peripherals on target and against
//! in-memory fakes on the host.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  crema-firmware / crema-core            │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  crema-hal (this crate - traits)        │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//!             ┌───────────────┐
//!             │ crema-hal-    │
//!             │    rp2040     │
//!             └───────────────┘
//! ```
//!
//! # Traits
//!
//! - [`flash::FlashStorage`] - Persistent key/value settings store
//! - [`flash::ProgramFlash`] - Raw erase/program access to program memory
//! - [`uart::TimedLink`] - Byte link with bounded reads

#![no_std]
#![deny(unsafe_code)]

pub mod flash;
pub mod uart;

// Re-export key traits at crate root for convenience
pub use flash::{FlashError, FlashStorage, FlashLayout, ProgramFlash, StorageKey};
pub use uart::{LinkError, TimedLink};
