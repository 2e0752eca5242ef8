//! State lattice
//!
//! Every actuator decision is a function of the current state. The
//! transition table below is the only place a state changes.

use super::events::Event;

/// Machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum MachineState {
    /// Power-on, subsystems initializing
    Init = 0,
    /// On but not heating
    Idle = 1,
    /// Heating toward the active setpoint
    Heating = 2,
    /// At temperature
    Ready = 3,
    /// Shot (or back-flush) in progress
    Brewing = 4,
    /// Recoverable fault, heaters off until it clears
    Fault = 5,
    /// Outputs forced off until an operator reset
    Safe = 6,
}

/// Operating mode requested over the link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum MachineMode {
    #[default]
    Idle = 0,
    Brew = 1,
    Steam = 2,
}

impl MachineMode {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(MachineMode::Idle),
            1 => Some(MachineMode::Brew),
            2 => Some(MachineMode::Steam),
            _ => None,
        }
    }

    /// Modes that run the heaters
    pub fn heats(self) -> bool {
        !matches!(self, MachineMode::Idle)
    }
}

impl MachineState {
    /// Heaters may be driven
    pub fn heater_allowed(&self) -> bool {
        matches!(
            self,
            MachineState::Heating | MachineState::Ready | MachineState::Brewing
        )
    }

    /// Pump may run
    pub fn pump_allowed(&self) -> bool {
        matches!(self, MachineState::Brewing)
    }

    pub fn is_fault(&self) -> bool {
        matches!(self, MachineState::Fault | MachineState::Safe)
    }

    /// Process an event and return the next state
    pub fn transition(self, event: Event) -> Self {
        use Event::*;
        use MachineState::*;

        match (self, event) {
            // SAFE wins from anywhere and only a reset leaves it
            (_, Critical) | (_, SafeRequested) => Safe,
            (Safe, Reset) => Init,
            (Safe, _) => Safe,

            (_, FaultDetected) => Fault,
            (Fault, FaultCleared) => Idle,

            (Init, InitComplete) => Idle,

            (Idle, HeatRequested) => Heating,
            (Heating, IdleRequested) | (Ready, IdleRequested) => Idle,

            (Heating, TemperatureReached) => Ready,
            (Ready, TemperatureLost) => Heating,

            (Heating, BrewStart) | (Ready, BrewStart) => Brewing,
            (Brewing, BrewEnded { at_temperature: true }) => Ready,
            (Brewing, BrewEnded { at_temperature: false }) => Heating,

            _ => self,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        use MachineState::*;
        [Init, Idle, Heating, Ready, Brewing, Fault, Safe]
            .get(value as usize)
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [MachineState; 7] = [
        MachineState::Init,
        MachineState::Idle,
        MachineState::Heating,
        MachineState::Ready,
        MachineState::Brewing,
        MachineState::Fault,
        MachineState::Safe,
    ];

    #[test]
    fn test_boot_to_idle() {
        assert_eq!(
            MachineState::Init.transition(Event::InitComplete),
            MachineState::Idle
        );
    }

    #[test]
    fn test_safe_from_every_state() {
        for state in ALL {
            assert_eq!(state.transition(Event::Critical), MachineState::Safe);
            assert_eq!(state.transition(Event::SafeRequested), MachineState::Safe);
        }
    }

    #[test]
    fn test_safe_only_exits_through_reset() {
        let events = [
            Event::InitComplete,
            Event::HeatRequested,
            Event::FaultCleared,
            Event::BrewStart,
            Event::FaultDetected,
            Event::TemperatureReached,
        ];
        for event in events {
            assert_eq!(MachineState::Safe.transition(event), MachineState::Safe);
        }
        assert_eq!(
            MachineState::Safe.transition(Event::Reset),
            MachineState::Init
        );
    }

    #[test]
    fn test_brewing_only_from_ready_or_heating() {
        for state in ALL {
            let next = state.transition(Event::BrewStart);
            let allowed = matches!(state, MachineState::Ready | MachineState::Heating);
            assert_eq!(next == MachineState::Brewing, allowed || state == MachineState::Brewing);
        }
    }

    #[test]
    fn test_heating_cycle() {
        let heating = MachineState::Idle.transition(Event::HeatRequested);
        assert_eq!(heating, MachineState::Heating);
        let ready = heating.transition(Event::TemperatureReached);
        assert_eq!(ready, MachineState::Ready);
        assert_eq!(ready.transition(Event::TemperatureLost), MachineState::Heating);
        assert_eq!(ready.transition(Event::IdleRequested), MachineState::Idle);
    }

    #[test]
    fn test_brew_end_depends_on_temperature() {
        let brewing = MachineState::Brewing;
        assert_eq!(
            brewing.transition(Event::BrewEnded {
                at_temperature: true
            }),
            MachineState::Ready
        );
        assert_eq!(
            brewing.transition(Event::BrewEnded {
                at_temperature: false
            }),
            MachineState::Heating
        );
    }

    #[test]
    fn test_fault_clears_to_idle() {
        let fault = MachineState::Brewing.transition(Event::FaultDetected);
        assert_eq!(fault, MachineState::Fault);
        assert_eq!(fault.transition(Event::FaultCleared), MachineState::Idle);
    }

    #[test]
    fn test_permissions() {
        assert!(MachineState::Ready.heater_allowed());
        assert!(!MachineState::Safe.heater_allowed());
        assert!(!MachineState::Fault.heater_allowed());
        assert!(MachineState::Brewing.pump_allowed());
        assert!(!MachineState::Ready.pump_allowed());
    }

    #[test]
    fn test_codes() {
        for state in ALL {
            assert_eq!(MachineState::from_u8(state as u8), Some(state));
        }
        assert_eq!(MachineMode::from_u8(2), Some(MachineMode::Steam));
        assert_eq!(MachineMode::from_u8(3), None);
    }
}
