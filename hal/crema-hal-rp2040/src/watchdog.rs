//! Hardware watchdog

use embassy_rp::peripherals::WATCHDOG;
use embassy_rp::watchdog::{ResetReason, Watchdog};
use embassy_rp::Peri;
use embassy_time::Duration;

/// Hardware timeout; several control periods
pub const WATCHDOG_TIMEOUT: Duration = Duration::from_millis(1500);

pub struct BoardWatchdog {
    inner: Watchdog,
}

impl BoardWatchdog {
    pub fn new(peripheral: Peri<'static, WATCHDOG>) -> Self {
        Self {
            inner: Watchdog::new(peripheral),
        }
    }

    /// Whether the last reset was a watchdog timeout
    pub fn caused_last_reset(&self) -> bool {
        matches!(self.inner.reset_reason(), Some(ResetReason::TimedOut))
    }

    pub fn start(&mut self) {
        self.inner.start(WATCHDOG_TIMEOUT);
    }
}

impl crema_core::traits::Watchdog for BoardWatchdog {
    fn feed(&mut self) {
        self.inner.feed();
    }
}
