//! Dual boiler: independent brew and steam loops sharing one budget

use crate::sensors::SensorSample;

use super::electrical::ElectricalBudget;
use super::engine::Loops;
use super::strategy::{Allocator, Demand, HeatingStrategy};

#[derive(Debug, Clone)]
pub(crate) struct DualBoiler {
    pub allocator: Allocator,
}

impl DualBoiler {
    pub fn new(strategy: HeatingStrategy) -> Self {
        Self {
            allocator: Allocator::new(strategy),
        }
    }

    /// Heater duties (brew, steam); both loops run in every heating mode
    pub fn update(
        &mut self,
        loops: &mut Loops,
        sample: &SensorSample,
        dt: f32,
        budget: &ElectricalBudget,
    ) -> (f32, f32) {
        let brew_temp = sample.brew_c();
        let brew = brew_temp.map_or(0.0, |t| loops.brew.compute(t, dt));
        let steam = sample.steam_c().map_or(0.0, |t| loops.steam.compute(t, dt));

        let demand = Demand {
            brew,
            steam,
            brew_temp,
            brew_setpoint: loops.brew.setpoint(),
        };
        self.allocator.allocate(demand, budget)
    }
}
