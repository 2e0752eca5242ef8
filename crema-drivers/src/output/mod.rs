//! Actuator drivers

pub mod board;
pub mod ssr;

pub use board::BoardOutputs;
pub use ssr::{ssr_pwm_hz, PumpRelay, SsrHeater, SSR_PWM_DIVIDER, SSR_PWM_TOP};
