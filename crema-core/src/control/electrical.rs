//! Electrical site limits and heater current budget

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Share of the site limit the heaters may use
pub const BUDGET_FACTOR: f32 = 0.95;
/// Highest duty any heater is driven at
pub const MAX_HEATER_DUTY: f32 = 95.0;

pub const VOLTAGE_MIN: u16 = 100;
pub const VOLTAGE_MAX: u16 = 250;
/// 50.0 A
pub const MAX_CURRENT_LIMIT_X10: u16 = 500;

/// Electrical site limits
///
/// Must be valid before any heater is driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EnvironmentalConfig {
    /// Nominal mains voltage
    pub voltage: u16,
    /// Maximum current the machine may draw, 0.1 A
    pub max_current_x10: u16,
}

impl EnvironmentalConfig {
    pub const fn new(voltage: u16, max_current_x10: u16) -> Self {
        Self {
            voltage,
            max_current_x10,
        }
    }

    pub fn is_valid(&self) -> bool {
        (VOLTAGE_MIN..=VOLTAGE_MAX).contains(&self.voltage)
            && self.max_current_x10 > 0
            && self.max_current_x10 <= MAX_CURRENT_LIMIT_X10
    }

    pub fn max_current(&self) -> f32 {
        self.max_current_x10 as f32 / 10.0
    }
}

/// Heater element ratings from the board profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HeaterRatings {
    pub brew_watts: u16,
    pub steam_watts: u16,
}

impl HeaterRatings {
    /// Estimated draw for the given duties
    pub fn power_watts(&self, brew_duty: u8, steam_duty: u8) -> u16 {
        let brew = self.brew_watts as u32 * brew_duty as u32 / 100;
        let steam = self.steam_watts as u32 * steam_duty as u32 / 100;
        (brew + steam).min(u16::MAX as u32) as u16
    }
}

/// Current available to the heaters and what each draws at full duty
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ElectricalBudget {
    /// Brew heater current at 100 % duty, amps
    pub brew_current: f32,
    /// Steam heater current at 100 % duty, amps
    pub steam_current: f32,
    /// Current the heaters may share, amps
    pub budget: f32,
}

impl ElectricalBudget {
    /// Budget for a site, `None` when the site limits are not valid
    pub fn new(env: &EnvironmentalConfig, ratings: &HeaterRatings) -> Option<Self> {
        if !env.is_valid() {
            return None;
        }
        let volts = env.voltage as f32;
        Some(Self {
            brew_current: ratings.brew_watts as f32 / volts,
            steam_current: ratings.steam_watts as f32 / volts,
            budget: env.max_current() * BUDGET_FACTOR,
        })
    }

    /// Current drawn at the given duties (percent)
    pub fn current(&self, brew_duty: f32, steam_duty: f32) -> f32 {
        self.brew_current * brew_duty / 100.0 + self.steam_current * steam_duty / 100.0
    }

    /// Highest duty a heater rated `rated` amps can run at within `available` amps
    pub fn duty_within(rated: f32, available: f32) -> f32 {
        if rated <= 0.0 {
            return MAX_HEATER_DUTY;
        }
        (available / rated * 100.0).clamp(0.0, MAX_HEATER_DUTY)
    }

    /// Values in 0.1 A for reporting
    pub fn report_x10(&self) -> (u16, u16, u16) {
        let x10 = |a: f32| libm::roundf(a * 10.0).clamp(0.0, u16::MAX as f32) as u16;
        (x10(self.brew_current), x10(self.steam_current), x10(self.budget))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATINGS: HeaterRatings = HeaterRatings {
        brew_watts: 1000,
        steam_watts: 1400,
    };

    #[test]
    fn test_env_validation() {
        assert!(EnvironmentalConfig::new(230, 160).is_valid());
        assert!(!EnvironmentalConfig::default().is_valid());
        assert!(!EnvironmentalConfig::new(230, 0).is_valid());
        assert!(!EnvironmentalConfig::new(50, 100).is_valid());
        assert!(!EnvironmentalConfig::new(230, 501).is_valid());
    }

    #[test]
    fn test_budget_from_site() {
        let budget = ElectricalBudget::new(&EnvironmentalConfig::new(200, 100), &RATINGS).unwrap();
        assert!((budget.brew_current - 5.0).abs() < 1e-4);
        assert!((budget.steam_current - 7.0).abs() < 1e-4);
        assert!((budget.budget - 9.5).abs() < 1e-4);
        assert!((budget.current(100.0, 50.0) - 8.5).abs() < 1e-4);
        assert_eq!(budget.report_x10(), (50, 70, 95));
    }

    #[test]
    fn test_no_budget_without_site_limits() {
        assert!(ElectricalBudget::new(&EnvironmentalConfig::default(), &RATINGS).is_none());
    }

    #[test]
    fn test_duty_within() {
        assert_eq!(ElectricalBudget::duty_within(10.0, 5.0), 50.0);
        assert_eq!(ElectricalBudget::duty_within(10.0, 50.0), MAX_HEATER_DUTY);
        assert_eq!(ElectricalBudget::duty_within(10.0, -1.0), 0.0);
    }

    #[test]
    fn test_power_estimate() {
        assert_eq!(RATINGS.power_watts(50, 100), 1900);
        assert_eq!(RATINGS.power_watts(0, 0), 0);
    }
}
