//! Dual-boiler heating strategies
//!
//! A strategy turns the two loops' raw demands into heater duties that fit
//! the electrical budget on every cycle.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::electrical::{ElectricalBudget, MAX_HEATER_DUTY};

/// Smart-stagger period in control cycles
pub const STAGGER_PERIOD_CYCLES: u8 = 10;
/// Sequential waits for the brew boiler to reach this share of its setpoint
pub const SEQUENTIAL_THRESHOLD: f32 = 0.8;

/// How the two heaters share the current budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(u8)]
pub enum HeatingStrategy {
    /// Brew heater only
    BrewOnly = 0,
    /// Brew first, steam once brew is close to setpoint
    #[default]
    Sequential = 1,
    /// Steam first, brew gets what is left
    SteamPriority = 2,
    /// Both at once, scaled down together when over budget
    Parallel = 3,
    /// Time-divide the budget between the loops by demand
    SmartStagger = 4,
}

impl HeatingStrategy {
    pub const ALL: [HeatingStrategy; 5] = [
        HeatingStrategy::BrewOnly,
        HeatingStrategy::Sequential,
        HeatingStrategy::SteamPriority,
        HeatingStrategy::Parallel,
        HeatingStrategy::SmartStagger,
    ];

    pub fn from_u8(value: u8) -> Option<Self> {
        Self::ALL.get(value as usize).copied()
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Whether the site can run this strategy at all
    pub fn is_feasible(self, budget: &ElectricalBudget) -> bool {
        let larger = budget.brew_current.max(budget.steam_current);
        match self {
            HeatingStrategy::BrewOnly => budget.brew_current <= budget.budget,
            HeatingStrategy::Sequential
            | HeatingStrategy::SteamPriority
            | HeatingStrategy::SmartStagger => larger <= budget.budget,
            HeatingStrategy::Parallel => {
                budget.brew_current + budget.steam_current <= budget.budget
            }
        }
    }
}

/// Inputs for one allocation
#[derive(Debug, Clone, Copy)]
pub struct Demand {
    /// Brew loop output, percent
    pub brew: f32,
    /// Steam loop output, percent
    pub steam: f32,
    pub brew_temp: Option<f32>,
    pub brew_setpoint: f32,
}

/// Applies a strategy cycle by cycle
#[derive(Debug, Clone)]
pub struct Allocator {
    strategy: HeatingStrategy,
    cycle: u8,
}

impl Allocator {
    pub fn new(strategy: HeatingStrategy) -> Self {
        Self { strategy, cycle: 0 }
    }

    pub fn strategy(&self) -> HeatingStrategy {
        self.strategy
    }

    pub fn set_strategy(&mut self, strategy: HeatingStrategy) {
        self.strategy = strategy;
        self.cycle = 0;
    }

    /// Heater duties (brew, steam) for this cycle
    pub fn allocate(&mut self, demand: Demand, budget: &ElectricalBudget) -> (f32, f32) {
        let brew = demand.brew.clamp(0.0, MAX_HEATER_DUTY);
        let steam = demand.steam.clamp(0.0, MAX_HEATER_DUTY);

        let (brew, steam) = match self.strategy {
            HeatingStrategy::BrewOnly => (brew, 0.0),
            HeatingStrategy::Sequential => {
                let brew_close = match demand.brew_temp {
                    Some(t) if demand.brew_setpoint > 0.0 => {
                        t >= demand.brew_setpoint * SEQUENTIAL_THRESHOLD
                    }
                    _ => false,
                };
                let steam = if brew_close { steam } else { 0.0 };
                brew_first(brew, steam, budget)
            }
            HeatingStrategy::SteamPriority => {
                let (steam, brew) = lead_first(steam, budget.steam_current, brew, budget.brew_current, budget.budget);
                (brew, steam)
            }
            HeatingStrategy::Parallel => {
                let total = budget.current(brew, steam);
                if total > budget.budget && total > 0.0 {
                    let scale = budget.budget / total;
                    (brew * scale, steam * scale)
                } else {
                    (brew, steam)
                }
            }
            HeatingStrategy::SmartStagger => self.stagger(brew, steam, budget),
        };

        enforce_budget(brew, steam, budget)
    }

    fn stagger(&mut self, brew: f32, steam: f32, budget: &ElectricalBudget) -> (f32, f32) {
        let slot = self.cycle;
        self.cycle = (self.cycle + 1) % STAGGER_PERIOD_CYCLES;

        if budget.current(brew, steam) <= budget.budget {
            return (brew, steam);
        }

        // Brew leads for a demand-proportional share of the period
        let total = brew + steam;
        let brew_slots = if total > 0.0 {
            libm::roundf(STAGGER_PERIOD_CYCLES as f32 * brew / total) as u8
        } else {
            0
        };
        if slot < brew_slots {
            brew_first(brew, steam, budget)
        } else {
            let (steam, brew) = lead_first(steam, budget.steam_current, brew, budget.brew_current, budget.budget);
            (brew, steam)
        }
    }
}

fn brew_first(brew: f32, steam: f32, budget: &ElectricalBudget) -> (f32, f32) {
    lead_first(brew, budget.brew_current, steam, budget.steam_current, budget.budget)
}

/// Serve `lead` first, give `other` whatever current remains
fn lead_first(lead: f32, lead_rated: f32, other: f32, other_rated: f32, available: f32) -> (f32, f32) {
    let lead = lead.min(ElectricalBudget::duty_within(lead_rated, available));
    let remaining = available - lead_rated * lead / 100.0;
    let other = other.min(ElectricalBudget::duty_within(other_rated, remaining));
    (lead, other)
}

/// Final guard: scale both duties down if the pair would exceed the budget
fn enforce_budget(brew: f32, steam: f32, budget: &ElectricalBudget) -> (f32, f32) {
    let brew = brew.clamp(0.0, MAX_HEATER_DUTY);
    let steam = steam.clamp(0.0, MAX_HEATER_DUTY);
    let total = budget.current(brew, steam);
    if total > budget.budget && total > 0.0 {
        let scale = budget.budget / total;
        (brew * scale, steam * scale)
    } else {
        (brew, steam)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::electrical::{EnvironmentalConfig, HeaterRatings};
    use proptest::prelude::*;

    fn budget(voltage: u16, max_current_x10: u16) -> ElectricalBudget {
        let ratings = HeaterRatings {
            brew_watts: 1000,
            steam_watts: 1400,
        };
        ElectricalBudget::new(&EnvironmentalConfig::new(voltage, max_current_x10), &ratings).unwrap()
    }

    fn demand(brew: f32, steam: f32) -> Demand {
        Demand {
            brew,
            steam,
            brew_temp: Some(90.0),
            brew_setpoint: 93.0,
        }
    }

    #[test]
    fn test_from_u8() {
        assert_eq!(HeatingStrategy::from_u8(4), Some(HeatingStrategy::SmartStagger));
        assert_eq!(HeatingStrategy::from_u8(5), None);
    }

    #[test]
    fn test_feasibility() {
        // 200 V: brew 5 A, steam 7 A
        let tight = budget(200, 80); // 7.6 A
        assert!(HeatingStrategy::BrewOnly.is_feasible(&tight));
        assert!(HeatingStrategy::Sequential.is_feasible(&tight));
        assert!(!HeatingStrategy::Parallel.is_feasible(&tight));

        let roomy = budget(200, 130); // 12.35 A
        assert!(HeatingStrategy::Parallel.is_feasible(&roomy));

        let tiny = budget(200, 40); // 3.8 A
        assert!(!HeatingStrategy::BrewOnly.is_feasible(&tiny));
        assert!(!HeatingStrategy::SmartStagger.is_feasible(&tiny));
    }

    #[test]
    fn test_brew_only_ignores_steam() {
        let mut alloc = Allocator::new(HeatingStrategy::BrewOnly);
        let (brew, steam) = alloc.allocate(demand(60.0, 80.0), &budget(200, 160));
        assert_eq!(brew, 60.0);
        assert_eq!(steam, 0.0);
    }

    #[test]
    fn test_sequential_holds_steam_until_brew_close() {
        let b = budget(200, 160);
        let mut alloc = Allocator::new(HeatingStrategy::Sequential);
        let cold = Demand {
            brew_temp: Some(50.0),
            ..demand(95.0, 95.0)
        };
        assert_eq!(alloc.allocate(cold, &b).1, 0.0);

        let warm = Demand {
            brew_temp: Some(80.0),
            ..demand(20.0, 95.0)
        };
        assert!(alloc.allocate(warm, &b).1 > 0.0);
    }

    #[test]
    fn test_steam_priority_serves_steam_first() {
        let b = budget(200, 80); // 7.6 A, steam alone at 95 % is 6.65 A
        let mut alloc = Allocator::new(HeatingStrategy::SteamPriority);
        let (brew, steam) = alloc.allocate(demand(95.0, 95.0), &b);
        assert!(steam > 94.9);
        assert!(brew < 95.0);
        assert!(b.current(brew, steam) <= b.budget + 1e-3);
    }

    #[test]
    fn test_parallel_scales_both() {
        let b = budget(200, 80);
        let mut alloc = Allocator::new(HeatingStrategy::Parallel);
        let (brew, steam) = alloc.allocate(demand(90.0, 90.0), &b);
        assert!((brew - steam).abs() < 1e-3);
        assert!((b.current(brew, steam) - b.budget).abs() < 1e-3);
    }

    #[test]
    fn test_stagger_alternates_lead() {
        let b = budget(200, 80);
        let mut alloc = Allocator::new(HeatingStrategy::SmartStagger);
        let mut brew_led = 0;
        let mut steam_led = 0;
        for _ in 0..STAGGER_PERIOD_CYCLES {
            let (brew, steam) = alloc.allocate(demand(90.0, 90.0), &b);
            if brew > 85.0 {
                brew_led += 1;
            }
            if steam > 85.0 {
                steam_led += 1;
            }
        }
        assert_eq!(brew_led, 5);
        assert_eq!(steam_led, 5);
    }

    #[test]
    fn test_under_budget_passes_through() {
        let b = budget(230, 300);
        for strategy in [HeatingStrategy::Parallel, HeatingStrategy::SmartStagger] {
            let mut alloc = Allocator::new(strategy);
            assert_eq!(alloc.allocate(demand(40.0, 30.0), &b), (40.0, 30.0));
        }
    }

    proptest! {
        #[test]
        fn prop_every_strategy_stays_within_budget(
            strategy in 0u8..5,
            voltage in 100u16..=250,
            max_current_x10 in 1u16..=500,
            brew_watts in 0u16..=3000,
            steam_watts in 0u16..=3000,
            demands in proptest::collection::vec((0.0f32..=100.0, 0.0f32..=100.0), STAGGER_PERIOD_CYCLES as usize),
            brew_temp in 0.0f32..=130.0,
        ) {
            let ratings = HeaterRatings { brew_watts, steam_watts };
            let env = EnvironmentalConfig::new(voltage, max_current_x10);
            let b = ElectricalBudget::new(&env, &ratings).unwrap();
            let mut alloc = Allocator::new(HeatingStrategy::from_u8(strategy).unwrap());

            let mut total = 0.0;
            for (brew, steam) in demands {
                let d = Demand { brew, steam, brew_temp: Some(brew_temp), brew_setpoint: 93.0 };
                let (bd, sd) = alloc.allocate(d, &b);
                prop_assert!((0.0..=MAX_HEATER_DUTY).contains(&bd));
                prop_assert!((0.0..=MAX_HEATER_DUTY).contains(&sd));
                let current = b.current(bd, sd);
                prop_assert!(current <= b.budget * 1.0001 + 1e-4);
                total += current;
            }
            let average = total / STAGGER_PERIOD_CYCLES as f32;
            prop_assert!(average <= b.budget * 1.0001 + 1e-4);
        }
    }
}
