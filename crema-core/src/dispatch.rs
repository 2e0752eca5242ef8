//! Link command dispatch
//!
//! Turns one received packet into machine requests and the replies the
//! communication context sends back. Replies reuse the command's sequence
//! number.

use crema_protocol::frame::{Packet, ParserStats};
use crema_protocol::messages::{
    AckResult, Command, ConfigItem, DiagnosticsReport, MessageError, Response, SAFETY_ENTER_SAFE,
    SAFETY_RESET,
};
use heapless::Vec;

use crate::config::settings::{HxControlMode, HxSettings, PreinfusionConfig, SingleBoilerTiming};
use crate::control::{ControlError, EnvironmentalConfig, HeatingStrategy, Loop, PidGains};
use crate::machine::Machine;
use crate::safety::ResetError;
use crate::snapshot::wire_ms;
use crate::state::{MachineMode, RequestError};

/// Replies one command can produce
pub const MAX_REPLIES: usize = 2;

/// Link-side facts the machine does not own
#[derive(Debug, Clone, Copy, Default)]
pub struct LinkContext {
    pub now_ms: u64,
    pub stats: ParserStats,
    pub reset_reason: u8,
}

/// Result of handling one packet
#[derive(Debug, Default)]
pub struct Outcome {
    /// Send in order, each with the command's sequence number
    pub replies: Vec<Response<'static>, MAX_REPLIES>,
    /// Settings changed; save them
    pub persist: bool,
    /// Hand the link to the bootloader once the replies are out
    pub enter_bootloader: bool,
    /// The payload could not be decoded
    pub error: Option<MessageError>,
}

impl Outcome {
    fn reply(&mut self, response: Response<'static>) {
        // Capacity covers every command's replies
        let _ = self.replies.push(response);
    }

    fn ack(&mut self, cmd: u8, result: AckResult) {
        self.reply(Response::Ack { cmd, result });
    }
}

impl From<ControlError> for AckResult {
    fn from(e: ControlError) -> Self {
        match e {
            ControlError::SetpointOutOfRange
            | ControlError::GainOutOfRange
            | ControlError::InvalidEnvironment
            | ControlError::OutOfRange => AckResult::Invalid,
            ControlError::StrategyInfeasible | ControlError::Unsupported => AckResult::Rejected,
        }
    }
}

impl From<RequestError> for AckResult {
    fn from(e: RequestError) -> Self {
        match e {
            RequestError::Invalid => AckResult::Invalid,
            RequestError::Rejected => AckResult::Rejected,
        }
    }
}

impl From<ResetError> for AckResult {
    fn from(e: ResetError) -> Self {
        match e {
            ResetError::Unauthorized => AckResult::Invalid,
            ResetError::ConditionPresent(_) => AckResult::Rejected,
        }
    }
}

fn result_of<E: Into<AckResult>>(r: Result<(), E>) -> AckResult {
    match r {
        Ok(()) => AckResult::Success,
        Err(e) => e.into(),
    }
}

/// Handle one valid packet from the connectivity board
pub fn handle_command(machine: &mut Machine, packet: &Packet, link: &LinkContext) -> Outcome {
    let mut out = Outcome::default();
    let now = link.now_ms;
    machine.link_seen(now);

    let cmd = match Command::from_packet(packet) {
        Ok(cmd) => cmd,
        Err(e) => {
            // Unknown types get no reply; a known type with a bad body is invalid
            if !matches!(e, MessageError::UnknownType(_)) {
                out.ack(packet.msg_type, AckResult::Invalid);
            }
            out.error = Some(e);
            return out;
        }
    };
    let code = cmd.msg_type();

    let result = match cmd {
        Command::Ping => AckResult::Success,
        Command::SetTemp { target, temp_x10 } => match Loop::from_u8(target) {
            Some(target) => result_of(machine.set_setpoint(target, temp_x10)),
            None => AckResult::Invalid,
        },
        Command::SetPid {
            target,
            kp_x100,
            ki_x100,
            kd_x100,
        } => match Loop::from_u8(target) {
            Some(target) => {
                let gains = PidGains::from_x100(kp_x100, ki_x100, kd_x100);
                result_of(machine.set_pid(target, gains))
            }
            None => AckResult::Invalid,
        },
        Command::Brew { action } => match action {
            0 => result_of(machine.stop_brew(now)),
            1 => result_of(machine.start_brew(now)),
            _ => AckResult::Invalid,
        },
        Command::Mode { mode } => match MachineMode::from_u8(mode) {
            Some(mode) => result_of(machine.request_mode(mode, now)),
            None => AckResult::Invalid,
        },
        Command::GetConfig => {
            out.reply(Response::Config(machine.config_report()));
            return out;
        }
        Command::GetEnvConfig => {
            out.reply(Response::EnvConfig(machine.env_report()));
            return out;
        }
        Command::Diagnostics => {
            out.reply(Response::Diagnostics(DiagnosticsReport {
                packets: link.stats.packets,
                crc_errors: link.stats.crc_errors,
                length_errors: link.stats.length_errors,
                safety_level: machine.safety_level() as u8,
                safety_flags: machine.safety_flags().bits(),
                reset_reason: link.reset_reason,
                uptime_ms: wire_ms(now),
            }));
            return out;
        }
        Command::SetConfig(item) => {
            let result = apply_config(machine, item);
            out.ack(code, result);
            if result == AckResult::Success {
                out.persist = true;
                if matches!(item, ConfigItem::Environmental { .. }) {
                    out.reply(Response::EnvConfig(machine.env_report()));
                }
            }
            return out;
        }
        Command::Safety { action, key } => match action {
            SAFETY_ENTER_SAFE => {
                machine.enter_safe(now);
                AckResult::Success
            }
            SAFETY_RESET => result_of(machine.reset_safety(key, now)),
            _ => AckResult::Invalid,
        },
        Command::CleaningStart => result_of(machine.start_cleaning(now)),
        Command::CleaningStop => {
            machine.stop_cleaning(now);
            AckResult::Success
        }
        Command::CleaningReset => {
            machine.reset_cleaning();
            AckResult::Success
        }
        Command::CleaningSetThreshold { threshold } => {
            result_of(machine.set_cleaning_threshold(threshold))
        }
        Command::EnterBootloader => {
            out.enter_bootloader = true;
            AckResult::Success
        }
    };

    let persists = matches!(
        cmd,
        Command::SetTemp { .. }
            | Command::SetPid { .. }
            | Command::CleaningReset
            | Command::CleaningSetThreshold { .. }
    );
    out.persist = persists && result == AckResult::Success;
    out.ack(code, result);
    out
}

fn apply_config(machine: &mut Machine, item: ConfigItem) -> AckResult {
    match item {
        ConfigItem::Environmental {
            voltage,
            max_current_x10,
        } => result_of(machine.set_environment(EnvironmentalConfig::new(voltage, max_current_x10))),
        ConfigItem::HeatingStrategy { strategy } => match HeatingStrategy::from_u8(strategy) {
            Some(strategy) => result_of(machine.set_strategy(strategy)),
            None => AckResult::Invalid,
        },
        ConfigItem::Preinfusion {
            enabled,
            on_ms,
            pause_ms,
        } => {
            if enabled && on_ms == 0 {
                return AckResult::Invalid;
            }
            machine.set_preinfusion(PreinfusionConfig {
                enabled,
                on_ms,
                pause_ms,
            });
            AckResult::Success
        }
        ConfigItem::SingleBoiler {
            switch_delay_ms,
            steam_timeout_s,
        } => result_of(machine.set_single_boiler(SingleBoilerTiming {
            switch_delay_ms,
            steam_timeout_s,
        })),
        ConfigItem::HeatExchanger {
            mode,
            pressure_x100,
        } => match HxControlMode::from_u8(mode) {
            Some(mode) => result_of(machine.set_heat_exchanger(HxSettings {
                mode,
                pressure_x100,
            })),
            None => AckResult::Invalid,
        },
    }
}
