//! Safety flag and level types.
//!
//! CRITICAL flags force the machine into SAFE; the rest raise FAULT.

use bitflags::bitflags;

bitflags! {
    /// Fault conditions seen by the supervisor.
    ///
    /// CRITICAL flags (→ SAFE): OVER_TEMP, SENSOR_FAIL, WATCHDOG, ENV_CONFIG_INVALID.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SafetyFlags: u8 {
        /// A boiler or the group exceeded its limit. **CRITICAL**.
        const OVER_TEMP          = 1 << 0;
        /// Reservoir below minimum level.
        const WATER_LOW          = 1 << 1;
        /// A required sensor failed repeatedly. **CRITICAL**.
        const SENSOR_FAIL        = 1 << 2;
        /// Watchdog reset or control loop overrun. **CRITICAL**.
        const WATCHDOG           = 1 << 3;
        /// Connectivity board silent for too long.
        const COMM_TIMEOUT       = 1 << 4;
        /// No valid electrical limits configured. **CRITICAL**.
        const ENV_CONFIG_INVALID = 1 << 5;
    }
}

impl SafetyFlags {
    /// Mask of all CRITICAL flags.
    pub const CRITICAL_MASK: Self = Self::from_bits_truncate(
        Self::OVER_TEMP.bits()
            | Self::SENSOR_FAIL.bits()
            | Self::WATCHDOG.bits()
            | Self::ENV_CONFIG_INVALID.bits(),
    );

    /// Returns true if any CRITICAL flag is set.
    #[inline]
    pub const fn has_critical(&self) -> bool {
        self.intersects(Self::CRITICAL_MASK)
    }

    /// Lowest set flag, used as the alarm code
    pub fn primary(&self) -> Option<SafetyFlags> {
        self.iter().next()
    }
}

impl Default for SafetyFlags {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for SafetyFlags {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "SafetyFlags({=u8:#04x})", self.bits())
    }
}

/// Supervisor verdict, ordered by severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum SafetyLevel {
    #[default]
    Ok = 0,
    /// Approaching a limit; informational
    Warning = 1,
    /// Recoverable condition; heaters off until it clears
    Fault = 2,
    /// Outputs forced off, machine held in SAFE
    Critical = 3,
}

impl SafetyLevel {
    /// Level implied by a flag set (WARNING is not flag-backed)
    pub fn from_flags(flags: SafetyFlags) -> Self {
        if flags.has_critical() {
            SafetyLevel::Critical
        } else if flags.is_empty() {
            SafetyLevel::Ok
        } else {
            SafetyLevel::Fault
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_critical_mask() {
        assert!(SafetyFlags::OVER_TEMP.has_critical());
        assert!(SafetyFlags::ENV_CONFIG_INVALID.has_critical());
        assert!(!(SafetyFlags::WATER_LOW | SafetyFlags::COMM_TIMEOUT).has_critical());
    }

    #[test]
    fn test_level_from_flags() {
        assert_eq!(SafetyLevel::from_flags(SafetyFlags::empty()), SafetyLevel::Ok);
        assert_eq!(
            SafetyLevel::from_flags(SafetyFlags::WATER_LOW),
            SafetyLevel::Fault
        );
        assert_eq!(
            SafetyLevel::from_flags(SafetyFlags::WATER_LOW | SafetyFlags::SENSOR_FAIL),
            SafetyLevel::Critical
        );
    }

    #[test]
    fn test_levels_ordered() {
        assert!(SafetyLevel::Critical > SafetyLevel::Fault);
        assert!(SafetyLevel::Fault > SafetyLevel::Warning);
        assert!(SafetyLevel::Warning > SafetyLevel::Ok);
    }

    #[test]
    fn test_primary_flag() {
        let flags = SafetyFlags::COMM_TIMEOUT | SafetyFlags::WATER_LOW;
        assert_eq!(flags.primary(), Some(SafetyFlags::WATER_LOW));
        assert_eq!(SafetyFlags::empty().primary(), None);
    }
}
