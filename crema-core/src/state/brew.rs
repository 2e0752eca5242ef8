//! Shot timing
//!
//! A [`Shot`] is armed when BREWING is entered and decides the pump duty for
//! every cycle until it ends.

use crate::config::settings::PreinfusionConfig;

/// A shot stops by itself after this long
pub const BREW_TIMEOUT_MS: u64 = 60_000;
/// Back-flush cycle length
pub const BACKFLUSH_DURATION_MS: u64 = 10_000;
pub const PUMP_FULL: u8 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BrewPhase {
    /// Pump on at low flow before the soak
    Preinfusion,
    /// Pump off, puck soaking
    Soak,
    /// Full pump
    Extraction,
    /// Cleaning cycle against a blind basket
    Backflush,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Shot {
    pub started_ms: u64,
    preinfusion: Option<PreinfusionConfig>,
    backflush: bool,
}

impl Shot {
    pub fn new(started_ms: u64, preinfusion: PreinfusionConfig) -> Self {
        Self {
            started_ms,
            preinfusion: preinfusion.enabled.then_some(preinfusion),
            backflush: false,
        }
    }

    pub fn backflush(started_ms: u64) -> Self {
        Self {
            started_ms,
            preinfusion: None,
            backflush: true,
        }
    }

    pub fn is_backflush(&self) -> bool {
        self.backflush
    }

    pub fn elapsed_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.started_ms)
    }

    pub fn phase(&self, now_ms: u64) -> BrewPhase {
        if self.backflush {
            return BrewPhase::Backflush;
        }
        let Some(pi) = self.preinfusion else {
            return BrewPhase::Extraction;
        };
        let elapsed = self.elapsed_ms(now_ms);
        let on = pi.on_ms as u64;
        if elapsed < on {
            BrewPhase::Preinfusion
        } else if elapsed < on + pi.pause_ms as u64 {
            BrewPhase::Soak
        } else {
            BrewPhase::Extraction
        }
    }

    pub fn pump_duty(&self, now_ms: u64) -> u8 {
        match self.phase(now_ms) {
            BrewPhase::Soak => 0,
            _ => PUMP_FULL,
        }
    }

    /// Time limit reached
    pub fn expired(&self, now_ms: u64) -> bool {
        let limit = if self.backflush {
            BACKFLUSH_DURATION_MS
        } else {
            BREW_TIMEOUT_MS
        };
        self.elapsed_ms(now_ms) >= limit
    }
}
