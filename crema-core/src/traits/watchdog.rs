//! Hardware watchdog

pub trait Watchdog {
    /// Restart the countdown
    fn feed(&mut self);
}
