//! Safety supervisor implementation
//!
//! Evaluated once per control cycle, before any actuator write. Monitors
//! boiler temperatures, sensor health, reservoir level, link liveness,
//! electrical configuration and the control loop's own watchdog kicks.
//!
//! CRITICAL conditions latch: they stay set until an authorized reset
//! succeeds. FAULT conditions are recomputed every check and clear by
//! themselves.

use crate::sensors::SensorSample;

use super::flags::{SafetyFlags, SafetyLevel};

/// Safety thresholds
pub const BREW_MAX_TEMP_X10: i16 = 1300;
pub const STEAM_MAX_TEMP_X10: i16 = 1650;
pub const WARNING_MARGIN_X10: i16 = 50;
/// Readings outside this window are treated as a failed read
pub const PLAUSIBLE_MIN_X10: i16 = -200;
pub const PLAUSIBLE_MAX_X10: i16 = 2500;
pub const SENSOR_FAIL_CONFIRM_COUNT: u8 = 3;
pub const WATER_LOW_PERCENT: u8 = 10;
pub const COMM_TIMEOUT_MS: u64 = 5000;
pub const WATCHDOG_LAPSE_MS: u64 = 1000;

/// Key the operator's reset request must carry
pub const RESET_KEY: u16 = 0x5AFE;

/// Which sensors the fitted topology cannot run without
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SensorRequirements {
    pub brew: bool,
    pub steam: bool,
    pub group: bool,
    pub pressure: bool,
}

/// Per-machine supervisor limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SupervisorConfig {
    pub required: SensorRequirements,
    pub brew_limit_x10: i16,
    pub steam_limit_x10: i16,
    pub group_limit_x10: i16,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            required: SensorRequirements::default(),
            brew_limit_x10: BREW_MAX_TEMP_X10,
            steam_limit_x10: STEAM_MAX_TEMP_X10,
            group_limit_x10: BREW_MAX_TEMP_X10,
        }
    }
}

/// Everything one check looks at
#[derive(Debug, Clone, Copy)]
pub struct SafetyInputs<'a> {
    pub sample: &'a SensorSample,
    pub now_ms: u64,
    /// Time of the last valid packet from the connectivity board
    pub last_link_ms: Option<u64>,
    pub env_valid: bool,
    /// Time of the last watchdog kick by the control loop
    pub last_kick_ms: u64,
}

/// Result of one check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SafetyReport {
    pub level: SafetyLevel,
    pub flags: SafetyFlags,
    /// Flags set now that were clear on the previous check
    pub raised: SafetyFlags,
    /// Reading behind the most severe raised flag
    pub value: i16,
}

/// Why a reset was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ResetError {
    /// Wrong reset key
    Unauthorized,
    /// A fault condition still holds
    ConditionPresent(SafetyFlags),
}

// Indexes into the consecutive-failure counters
const BREW: usize = 0;
const STEAM: usize = 1;
const GROUP: usize = 2;
const PRESSURE: usize = 3;

/// Safety supervisor
#[derive(Debug, Clone)]
pub struct SafetySupervisor {
    config: SupervisorConfig,
    /// Critical flags held until reset
    latched: SafetyFlags,
    /// Conditions present on the latest check
    live: SafetyFlags,
    /// Flags reported by the latest check
    flags: SafetyFlags,
    level: SafetyLevel,
    fail_counts: [u8; 4],
}

impl SafetySupervisor {
    /// Create a supervisor
    ///
    /// `watchdog_reset` latches WATCHDOG from the start when the last reset
    /// was caused by the hardware watchdog.
    pub fn new(config: SupervisorConfig, watchdog_reset: bool) -> Self {
        let latched = if watchdog_reset {
            SafetyFlags::WATCHDOG
        } else {
            SafetyFlags::empty()
        };
        Self {
            config,
            latched,
            live: SafetyFlags::empty(),
            flags: latched,
            level: SafetyLevel::from_flags(latched),
            fail_counts: [0; 4],
        }
    }

    pub fn level(&self) -> SafetyLevel {
        self.level
    }

    pub fn flags(&self) -> SafetyFlags {
        self.flags
    }

    /// Evaluate all conditions for this cycle
    pub fn check(&mut self, inputs: &SafetyInputs<'_>) -> SafetyReport {
        let sample = inputs.sample;
        let mut live = SafetyFlags::empty();
        let mut warning = false;
        let mut value = 0i16;

        // Sensor health, confirmed over consecutive failed reads
        let required = self.config.required;
        let reads = [
            (BREW, required.brew, sample.brew_temp_x10),
            (STEAM, required.steam, sample.steam_temp_x10),
            (GROUP, required.group, sample.group_temp_x10),
        ];
        for (idx, needed, reading) in reads {
            let ok = matches!(reading, Some(t) if (PLAUSIBLE_MIN_X10..=PLAUSIBLE_MAX_X10).contains(&t));
            self.count_read(idx, needed, ok);
        }
        self.count_read(PRESSURE, required.pressure, sample.pressure_x100.is_some());
        if self
            .fail_counts
            .iter()
            .any(|&n| n >= SENSOR_FAIL_CONFIRM_COUNT)
        {
            live |= SafetyFlags::SENSOR_FAIL;
        }

        // Over-temperature on any fitted probe
        let limits = [
            (sample.brew_temp_x10, self.config.brew_limit_x10),
            (sample.steam_temp_x10, self.config.steam_limit_x10),
            (sample.group_temp_x10, self.config.group_limit_x10),
        ];
        for (reading, limit) in limits {
            if let Some(t) = reading {
                if t >= limit {
                    live |= SafetyFlags::OVER_TEMP;
                    value = value.max(t);
                } else if t >= limit - WARNING_MARGIN_X10 {
                    warning = true;
                }
            }
        }

        if let Some(level) = sample.water_level {
            if level < WATER_LOW_PERCENT {
                live |= SafetyFlags::WATER_LOW;
                if !live.contains(SafetyFlags::OVER_TEMP) {
                    value = level as i16;
                }
            }
        }

        // Link liveness only counts once the peer has spoken
        if let Some(last) = inputs.last_link_ms {
            if inputs.now_ms.saturating_sub(last) > COMM_TIMEOUT_MS {
                live |= SafetyFlags::COMM_TIMEOUT;
            }
        }

        if inputs.now_ms.saturating_sub(inputs.last_kick_ms) > WATCHDOG_LAPSE_MS {
            live |= SafetyFlags::WATCHDOG;
        }

        if !inputs.env_valid {
            live |= SafetyFlags::ENV_CONFIG_INVALID;
        }

        self.latched |= live & SafetyFlags::CRITICAL_MASK;
        let flags = self.latched | (live - SafetyFlags::CRITICAL_MASK);
        let raised = flags - self.flags;

        let mut level = SafetyLevel::from_flags(flags);
        if level == SafetyLevel::Ok && warning {
            level = SafetyLevel::Warning;
        }

        self.live = live;
        self.flags = flags;
        self.level = level;

        SafetyReport {
            level,
            flags,
            raised,
            value,
        }
    }

    fn count_read(&mut self, idx: usize, needed: bool, ok: bool) {
        self.fail_counts[idx] = if needed && !ok {
            self.fail_counts[idx].saturating_add(1)
        } else {
            0
        };
    }

    /// Clear latched critical flags after operator action
    ///
    /// Fails when the key is wrong or when the latest check still saw a
    /// condition at FAULT level or above.
    pub fn reset(&mut self, key: u16) -> Result<(), ResetError> {
        if key != RESET_KEY {
            return Err(ResetError::Unauthorized);
        }
        if !self.live.is_empty() {
            return Err(ResetError::ConditionPresent(self.live));
        }
        self.latched = SafetyFlags::empty();
        self.flags = self.live;
        self.level = SafetyLevel::from_flags(self.flags);
        Ok(())
    }
}
