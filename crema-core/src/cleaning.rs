//! Back-flush reminder counter

use crate::config::settings::{CLEANING_THRESHOLD_MAX, CLEANING_THRESHOLD_MIN};
use crate::state::{FinishedShot, RequestError};

/// Shorter shots do not count
pub const MIN_COUNTED_BREW_MS: u64 = 15_000;
/// Counted brews between saves
pub const PERSIST_EVERY: u16 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CleaningCounter {
    count: u16,
    threshold: u16,
}

impl CleaningCounter {
    pub fn new(count: u16, threshold: u16) -> Self {
        Self { count, threshold }
    }

    pub fn count(&self) -> u16 {
        self.count
    }

    pub fn threshold(&self) -> u16 {
        self.threshold
    }

    pub fn is_due(&self) -> bool {
        self.count >= self.threshold
    }

    /// Account for a finished shot; true when the counter should be saved
    pub fn record(&mut self, shot: FinishedShot) -> bool {
        if shot.backflush || shot.duration_ms < MIN_COUNTED_BREW_MS {
            return false;
        }
        self.count = self.count.saturating_add(1);
        self.count % PERSIST_EVERY == 0
    }

    pub fn reset(&mut self) {
        self.count = 0;
    }

    pub fn set_threshold(&mut self, threshold: u16) -> Result<(), RequestError> {
        if !(CLEANING_THRESHOLD_MIN..=CLEANING_THRESHOLD_MAX).contains(&threshold) {
            return Err(RequestError::Invalid);
        }
        self.threshold = threshold;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shot(duration_ms: u64) -> FinishedShot {
        FinishedShot {
            duration_ms,
            backflush: false,
        }
    }

    #[test]
    fn test_short_shots_and_backflush_not_counted() {
        let mut counter = CleaningCounter::new(0, 100);
        assert!(!counter.record(shot(14_999)));
        assert!(!counter.record(FinishedShot {
            duration_ms: 30_000,
            backflush: true,
        }));
        assert_eq!(counter.count(), 0);
        counter.record(shot(15_000));
        assert_eq!(counter.count(), 1);
    }

    #[test]
    fn test_persist_every_tenth_brew() {
        let mut counter = CleaningCounter::new(8, 100);
        assert!(!counter.record(shot(25_000)));
        assert!(counter.record(shot(25_000)));
        assert_eq!(counter.count(), 10);
    }

    #[test]
    fn test_due_at_threshold() {
        let mut counter = CleaningCounter::new(9, 10);
        assert!(!counter.is_due());
        counter.record(shot(20_000));
        assert!(counter.is_due());
        counter.reset();
        assert!(!counter.is_due());
    }

    #[test]
    fn test_threshold_range() {
        let mut counter = CleaningCounter::new(0, 100);
        assert_eq!(counter.set_threshold(9), Err(RequestError::Invalid));
        assert_eq!(counter.set_threshold(1001), Err(RequestError::Invalid));
        assert_eq!(counter.set_threshold(10), Ok(()));
        assert_eq!(counter.threshold(), 10);
    }
}
