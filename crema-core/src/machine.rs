//! Machine orchestration
//!
//! [`Machine`] owns the supervisor, the state machine, the control engine
//! and the settings they were built from. The control context drives it
//! with [`Machine::step`] once per cycle; the communication context applies
//! link commands through the request methods. Both reach it through
//! [`SharedMachine`].

use core::cell::RefCell;

use crema_protocol::messages::{ConfigReport, EnvConfigReport};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;

use crate::cleaning::CleaningCounter;
use crate::config::profile::MachineProfile;
use crate::config::settings::{HxSettings, PreinfusionConfig, Settings, SingleBoilerTiming};
use crate::control::{
    ControlEngine, ControlError, ControlOutputs, EngineInputs, EnvironmentalConfig,
    HeatingStrategy, Loop, PidGains, CONTROL_PERIOD_MS,
};
use crate::safety::{ResetError, SafetyFlags, SafetyInputs, SafetyLevel, SafetySupervisor};
use crate::sensors::SensorSample;
use crate::snapshot::{Alarm, ReportedTemps, StatusSnapshot};
use crate::state::{
    FinishedShot, MachineMode, MachineState, ModeGate, RequestError, StateMachine, TickInputs,
};

/// What one control cycle did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CycleReport {
    pub outputs: ControlOutputs,
    pub level: SafetyLevel,
    /// Safety flags that rose this cycle
    pub raised: SafetyFlags,
    pub transition: Option<(MachineState, MachineState)>,
    pub finished: Option<FinishedShot>,
    /// Single boiler gave up on steam
    pub returned_to_brew: bool,
    /// Settings changed in a way that should reach flash
    pub persist: bool,
}

/// What [`Machine::hold_for_update`] interrupted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UpdateHold {
    was_safe: bool,
    mode: MachineMode,
}

pub struct Machine {
    profile: MachineProfile,
    settings: Settings,
    supervisor: SafetySupervisor,
    state: StateMachine,
    engine: ControlEngine,
    cleaning: CleaningCounter,
    sample: SensorSample,
    last_link_ms: Option<u64>,
    last_kick_ms: u64,
    last_step_ms: Option<u64>,
    alarm: Option<Alarm>,
    alarm_seq: u16,
}

impl Machine {
    /// Build the machine for this board from loaded settings
    pub fn new(
        profile: MachineProfile,
        settings: Settings,
        watchdog_reset: bool,
        now_ms: u64,
    ) -> Self {
        Self {
            supervisor: SafetySupervisor::new(profile.supervisor_config(), watchdog_reset),
            state: StateMachine::new(now_ms),
            engine: ControlEngine::new(&profile, &settings),
            cleaning: CleaningCounter::new(settings.cleaning_count, settings.cleaning_threshold),
            profile,
            settings,
            sample: SensorSample::default(),
            last_link_ms: None,
            last_kick_ms: now_ms,
            last_step_ms: None,
            alarm: None,
            alarm_seq: 0,
        }
    }

    pub fn profile(&self) -> &MachineProfile {
        &self.profile
    }

    pub fn state(&self) -> MachineState {
        self.state.state()
    }

    pub fn mode(&self) -> MachineMode {
        self.state.mode()
    }

    pub fn outputs(&self) -> ControlOutputs {
        self.engine.outputs()
    }

    pub fn safety_level(&self) -> SafetyLevel {
        self.supervisor.level()
    }

    pub fn safety_flags(&self) -> SafetyFlags {
        self.supervisor.flags()
    }

    pub fn env_valid(&self) -> bool {
        self.engine.budget().is_some()
    }

    /// One control cycle: safety check, state evaluation, engine update
    pub fn step(&mut self, sample: SensorSample, now_ms: u64) -> CycleReport {
        self.sample = sample;
        let dt_s = match self.last_step_ms {
            Some(last) if now_ms > last => (now_ms - last) as f32 / 1000.0,
            _ => CONTROL_PERIOD_MS as f32 / 1000.0,
        };
        self.last_step_ms = Some(now_ms);

        let safety = self.supervisor.check(&SafetyInputs {
            sample: &self.sample,
            now_ms,
            last_link_ms: self.last_link_ms,
            env_valid: self.env_valid(),
            last_kick_ms: self.last_kick_ms,
        });
        if let Some(flag) = safety.raised.primary() {
            self.alarm_seq = self.alarm_seq.wrapping_add(1);
            self.alarm = Some(Alarm {
                seq: self.alarm_seq,
                code: flag.bits(),
                level: safety.level,
                value: safety.value,
            });
        }

        let tick = self.state.tick(TickInputs {
            now_ms,
            level: safety.level,
            tracking_error: self.engine.tracking_error(&self.sample, self.state.mode()),
        });

        let mut persist = false;
        if let Some(shot) = tick.finished {
            if self.cleaning.record(shot) {
                self.settings.cleaning_count = self.cleaning.count();
                persist = true;
            }
        }

        let mut returned_to_brew = false;
        if safety.level == SafetyLevel::Critical || self.state.state() == MachineState::Safe {
            self.engine.force_off();
        } else {
            let report = self.engine.update(&EngineInputs {
                sample: &self.sample,
                mode: self.state.heating_mode(),
                pump_duty: self.state.pump_duty(now_ms),
                now_ms,
                dt_s,
            });
            if report.returned_to_brew {
                returned_to_brew = self.state.fall_back_to_brew(now_ms);
            }
        }

        CycleReport {
            outputs: self.engine.outputs(),
            level: safety.level,
            raised: safety.raised,
            transition: tick.transition,
            finished: tick.finished,
            returned_to_brew,
            persist,
        }
    }

    /// The control loop fed the hardware watchdog
    pub fn kicked(&mut self, now_ms: u64) {
        self.last_kick_ms = now_ms;
    }

    /// A valid packet arrived from the connectivity board
    pub fn link_seen(&mut self, now_ms: u64) {
        self.last_link_ms = Some(now_ms);
    }

    pub fn snapshot(&self, now_ms: u64) -> StatusSnapshot {
        StatusSnapshot {
            temps: ReportedTemps::for_topology(self.profile.topology, &self.sample),
            pressure_x100: self.sample.pressure_x100,
            water_level: self.sample.water_level,
            brew_setpoint_x10: self.engine.get_setpoint(Loop::Brew),
            steam_setpoint_x10: self.engine.get_setpoint(Loop::Steam),
            outputs: self.engine.outputs(),
            state: self.state.state(),
            mode: self.state.mode(),
            safety_level: self.supervisor.level(),
            safety_flags: self.supervisor.flags(),
            strategy: self.engine.strategy(),
            uptime_ms: now_ms,
            shot_start_ms: self.state.last_shot_start_ms(),
            cleaning_count: self.cleaning.count(),
            cleaning_due: self.cleaning.is_due(),
            alarm: self.alarm,
        }
    }

    // Requests from the link

    pub fn set_setpoint(&mut self, target: Loop, temp_x10: i16) -> Result<(), ControlError> {
        self.engine.set_setpoint(target, temp_x10)?;
        match target {
            Loop::Brew => self.settings.brew_setpoint_x10 = temp_x10,
            Loop::Steam => self.settings.steam_setpoint_x10 = temp_x10,
        }
        Ok(())
    }

    pub fn setpoint(&self, target: Loop) -> i16 {
        self.engine.get_setpoint(target)
    }

    pub fn set_pid(&mut self, target: Loop, gains: PidGains) -> Result<(), ControlError> {
        self.engine.set_pid(target, gains)?;
        match target {
            Loop::Brew => self.settings.brew_pid = gains,
            Loop::Steam => self.settings.steam_pid = gains,
        }
        Ok(())
    }

    pub fn request_mode(&mut self, mode: MachineMode, now_ms: u64) -> Result<(), RequestError> {
        let gate = ModeGate {
            env_valid: self.env_valid(),
            supported: self.engine.supports_mode(mode),
        };
        self.state.request_mode(mode, gate, now_ms)
    }

    pub fn start_brew(&mut self, now_ms: u64) -> Result<(), RequestError> {
        if self.state.is_backflushing() {
            return Err(RequestError::Rejected);
        }
        self.state.start_brew(self.settings.preinfusion, now_ms)
    }

    pub fn stop_brew(&mut self, now_ms: u64) -> Result<(), RequestError> {
        if self.state.is_backflushing() {
            return Err(RequestError::Rejected);
        }
        let error = self.engine.tracking_error(&self.sample, self.state.mode());
        self.state.stop_brew(error, now_ms)
    }

    pub fn start_cleaning(&mut self, now_ms: u64) -> Result<(), RequestError> {
        self.state.start_backflush(now_ms)
    }

    /// Stop a back-flush; a no-op when none is running
    pub fn stop_cleaning(&mut self, now_ms: u64) {
        if self.state.is_backflushing() {
            let error = self.engine.tracking_error(&self.sample, self.state.mode());
            // Only fails outside BREWING, which is_backflushing excludes
            let _ = self.state.stop_brew(error, now_ms);
        }
    }

    pub fn reset_cleaning(&mut self) {
        self.cleaning.reset();
        self.settings.cleaning_count = 0;
    }

    pub fn set_cleaning_threshold(&mut self, threshold: u16) -> Result<(), RequestError> {
        self.cleaning.set_threshold(threshold)?;
        self.settings.cleaning_threshold = threshold;
        Ok(())
    }

    pub fn set_environment(&mut self, env: EnvironmentalConfig) -> Result<(), ControlError> {
        self.engine.set_environment(env)?;
        self.settings.env = env;
        Ok(())
    }

    pub fn set_strategy(&mut self, strategy: HeatingStrategy) -> Result<(), ControlError> {
        self.engine.set_strategy(strategy)?;
        self.settings.strategy = strategy;
        Ok(())
    }

    pub fn set_preinfusion(&mut self, preinfusion: PreinfusionConfig) {
        self.settings.preinfusion = preinfusion;
    }

    pub fn set_single_boiler(&mut self, timing: SingleBoilerTiming) -> Result<(), ControlError> {
        self.engine.set_single_boiler_timing(timing)?;
        self.settings.single_boiler = timing;
        Ok(())
    }

    pub fn set_heat_exchanger(&mut self, hx: HxSettings) -> Result<(), ControlError> {
        self.engine.set_heat_exchanger(hx)?;
        self.settings.hx = hx;
        Ok(())
    }

    /// Operator or bootloader asked for SAFE
    pub fn enter_safe(&mut self, now_ms: u64) {
        self.state.enter_safe(now_ms);
        self.engine.force_off();
    }

    /// Park in SAFE for a firmware install
    pub fn hold_for_update(&mut self, now_ms: u64) -> UpdateHold {
        let hold = UpdateHold {
            was_safe: self.state() == MachineState::Safe,
            mode: self.mode(),
        };
        self.enter_safe(now_ms);
        hold
    }

    /// The install did not happen; resume what the hold interrupted
    ///
    /// A machine that was already in SAFE, or that went CRITICAL meanwhile,
    /// stays in SAFE.
    pub fn release_update(&mut self, hold: UpdateHold, now_ms: u64) {
        if hold.was_safe || self.supervisor.level() == SafetyLevel::Critical {
            return;
        }
        if self.state.reset(now_ms) {
            self.state.restore_mode(hold.mode);
        }
    }

    /// Authorized exit from SAFE
    pub fn reset_safety(&mut self, key: u16, now_ms: u64) -> Result<(), ResetError> {
        self.supervisor.reset(key)?;
        self.state.reset(now_ms);
        Ok(())
    }

    /// Current settings, as they would be persisted
    pub fn settings(&self) -> Settings {
        self.settings
    }

    pub fn config_report(&self) -> ConfigReport {
        let s = &self.settings;
        ConfigReport {
            brew_setpoint_x10: self.engine.get_setpoint(Loop::Brew),
            steam_setpoint_x10: self.engine.get_setpoint(Loop::Steam),
            brew_pid_x100: self.engine.pid(Loop::Brew).to_x100(),
            steam_pid_x100: self.engine.pid(Loop::Steam).to_x100(),
            strategy: self.engine.strategy().as_u8(),
            preinfusion_enabled: s.preinfusion.enabled,
            preinfusion_on_ms: s.preinfusion.on_ms,
            preinfusion_pause_ms: s.preinfusion.pause_ms,
            voltage: s.env.voltage,
            max_current_x10: s.env.max_current_x10,
            cleaning_threshold: self.cleaning.threshold(),
            cleaning_count: self.cleaning.count(),
            topology: self.profile.topology.as_u8(),
            switch_delay_ms: s.single_boiler.switch_delay_ms,
            steam_timeout_s: s.single_boiler.steam_timeout_s,
            hx_mode: s.hx.mode as u8,
            hx_pressure_x100: s.hx.pressure_x100,
        }
    }

    pub fn env_report(&self) -> EnvConfigReport {
        let env = self.engine.environment();
        let (brew_current_x10, steam_current_x10, budget_x10) =
            self.engine.budget().map_or((0, 0, 0), |b| b.report_x10());
        EnvConfigReport {
            voltage: env.voltage,
            max_current_x10: env.max_current_x10,
            brew_current_x10,
            steam_current_x10,
            budget_x10,
            valid: self.env_valid(),
        }
    }
}

/// The machine as shared between the two execution contexts
pub struct SharedMachine {
    inner: Mutex<CriticalSectionRawMutex, RefCell<Option<Machine>>>,
}

impl SharedMachine {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(None)),
        }
    }

    /// Install the machine built at boot
    pub fn install(&self, machine: Machine) {
        self.inner.lock(|cell| *cell.borrow_mut() = Some(machine));
    }

    /// Run `f` with exclusive access; `None` before [`Self::install`]
    pub fn with<R>(&self, f: impl FnOnce(&mut Machine) -> R) -> Option<R> {
        self.inner.lock(|cell| cell.borrow_mut().as_mut().map(f))
    }
}

impl Default for SharedMachine {
    fn default() -> Self {
        Self::new()
    }
}
