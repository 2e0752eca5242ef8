//! Message types for the control-board link
//!
//! Message types are divided into two categories:
//! - Connectivity board → control board: commands, each acknowledged
//! - Control board → connectivity board: acks, periodic status and reports
//!
//! All multi-byte fields are little-endian.

use heapless::Vec;

use crate::frame::{FrameError, Packet, MAX_PAYLOAD_SIZE};

// Message type IDs: connectivity → control board
pub const MSG_PING: u8 = 0x01;
pub const MSG_CMD_SET_TEMP: u8 = 0x10;
pub const MSG_CMD_SET_PID: u8 = 0x11;
pub const MSG_CMD_BREW: u8 = 0x12;
pub const MSG_CMD_MODE: u8 = 0x13;
pub const MSG_CMD_GET_CONFIG: u8 = 0x14;
pub const MSG_CMD_SET_CONFIG: u8 = 0x15;
pub const MSG_CMD_GET_ENV_CONFIG: u8 = 0x16;
pub const MSG_CMD_SAFETY: u8 = 0x17;
pub const MSG_CMD_DIAGNOSTICS: u8 = 0x18;
pub const MSG_CMD_BOOTLOADER: u8 = 0x1F;
pub const MSG_CMD_CLEANING_START: u8 = 0x20;
pub const MSG_CMD_CLEANING_STOP: u8 = 0x21;
pub const MSG_CMD_CLEANING_RESET: u8 = 0x22;
pub const MSG_CMD_CLEANING_SET_THRESHOLD: u8 = 0x23;

// Message type IDs: control board → connectivity
pub const MSG_ACK: u8 = 0x80;
pub const MSG_STATUS: u8 = 0x81;
pub const MSG_BOOT: u8 = 0x82;
pub const MSG_ENV_CONFIG: u8 = 0x83;
pub const MSG_CONFIG: u8 = 0x84;
pub const MSG_DEBUG: u8 = 0x85;
pub const MSG_ALARM: u8 = 0x86;
pub const MSG_DIAGNOSTICS: u8 = 0x87;

// SET_CONFIG item identifiers
pub const CONFIG_ENVIRONMENTAL: u8 = 1;
pub const CONFIG_HEATING_STRATEGY: u8 = 2;
pub const CONFIG_PREINFUSION: u8 = 3;
pub const CONFIG_SINGLE_BOILER: u8 = 4;
pub const CONFIG_HEAT_EXCHANGER: u8 = 5;

// SAFETY actions
pub const SAFETY_ENTER_SAFE: u8 = 0;
pub const SAFETY_RESET: u8 = 1;

/// Temperature field value for a missing or failed sensor
pub const TEMP_INVALID: i16 = i16::MIN;

/// Errors decoding a message payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MessageError {
    /// Unknown message type
    UnknownType(u8),
    /// Unknown SET_CONFIG item
    UnknownConfigItem(u8),
    /// Payload shorter than the message requires
    PayloadTooShort,
    /// Encoded message would not fit a packet
    PayloadTooLarge,
}

impl From<FrameError> for MessageError {
    fn from(_: FrameError) -> Self {
        MessageError::PayloadTooLarge
    }
}

/// One-byte result carried by every ACK
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum AckResult {
    Success = 0,
    /// Malformed or out-of-range request
    Invalid = 1,
    /// Well-formed but refused in the current state
    Rejected = 2,
    Timeout = 3,
    /// Accepted but the operation failed
    Failed = 4,
}

impl AckResult {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(AckResult::Success),
            1 => Some(AckResult::Invalid),
            2 => Some(AckResult::Rejected),
            3 => Some(AckResult::Timeout),
            4 => Some(AckResult::Failed),
            _ => None,
        }
    }
}

/// Little-endian field reader over a payload
pub struct PayloadReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> PayloadReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], MessageError> {
        let end = self.pos + N;
        let bytes = self
            .data
            .get(self.pos..end)
            .ok_or(MessageError::PayloadTooShort)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        self.pos = end;
        Ok(out)
    }

    pub fn u8(&mut self) -> Result<u8, MessageError> {
        Ok(self.take::<1>()?[0])
    }

    pub fn u16(&mut self) -> Result<u16, MessageError> {
        Ok(u16::from_le_bytes(self.take()?))
    }

    pub fn i16(&mut self) -> Result<i16, MessageError> {
        Ok(i16::from_le_bytes(self.take()?))
    }

    pub fn u32(&mut self) -> Result<u32, MessageError> {
        Ok(u32::from_le_bytes(self.take()?))
    }
}

/// Little-endian field writer into a packet payload
#[derive(Default)]
pub struct PayloadWriter {
    buf: Vec<u8, MAX_PAYLOAD_SIZE>,
}

impl PayloadWriter {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn bytes(&mut self, data: &[u8]) -> Result<&mut Self, MessageError> {
        self.buf
            .extend_from_slice(data)
            .map_err(|_| MessageError::PayloadTooLarge)?;
        Ok(self)
    }

    pub fn u8(&mut self, v: u8) -> Result<&mut Self, MessageError> {
        self.bytes(&[v])
    }

    pub fn u16(&mut self, v: u16) -> Result<&mut Self, MessageError> {
        self.bytes(&v.to_le_bytes())
    }

    pub fn i16(&mut self, v: i16) -> Result<&mut Self, MessageError> {
        self.bytes(&v.to_le_bytes())
    }

    pub fn u32(&mut self, v: u32) -> Result<&mut Self, MessageError> {
        self.bytes(&v.to_le_bytes())
    }

    pub fn finish(self, msg_type: u8, seq: u8) -> Packet {
        Packet {
            msg_type,
            seq,
            payload: self.buf,
        }
    }
}

/// SET_CONFIG body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigItem {
    Environmental { voltage: u16, max_current_x10: u16 },
    HeatingStrategy { strategy: u8 },
    Preinfusion { enabled: bool, on_ms: u16, pause_ms: u16 },
    SingleBoiler { switch_delay_ms: u16, steam_timeout_s: u16 },
    HeatExchanger { mode: u8, pressure_x100: u16 },
}

/// Commands parsed from connectivity-board packets
///
/// Enumerated fields stay raw; their meaning is validated by the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    Ping,
    SetTemp { target: u8, temp_x10: i16 },
    SetPid { target: u8, kp_x100: i16, ki_x100: i16, kd_x100: i16 },
    Brew { action: u8 },
    Mode { mode: u8 },
    GetConfig,
    SetConfig(ConfigItem),
    GetEnvConfig,
    Safety { action: u8, key: u16 },
    Diagnostics,
    CleaningStart,
    CleaningStop,
    CleaningReset,
    CleaningSetThreshold { threshold: u16 },
    EnterBootloader,
}

impl Command {
    /// Parse a command from a packet
    pub fn from_packet(packet: &Packet) -> Result<Self, MessageError> {
        let mut r = PayloadReader::new(&packet.payload);
        let cmd = match packet.msg_type {
            MSG_PING => Command::Ping,
            MSG_CMD_SET_TEMP => Command::SetTemp {
                target: r.u8()?,
                temp_x10: r.i16()?,
            },
            MSG_CMD_SET_PID => Command::SetPid {
                target: r.u8()?,
                kp_x100: r.i16()?,
                ki_x100: r.i16()?,
                kd_x100: r.i16()?,
            },
            MSG_CMD_BREW => Command::Brew { action: r.u8()? },
            MSG_CMD_MODE => Command::Mode { mode: r.u8()? },
            MSG_CMD_GET_CONFIG => Command::GetConfig,
            MSG_CMD_SET_CONFIG => Command::SetConfig(Self::config_item(&mut r)?),
            MSG_CMD_GET_ENV_CONFIG => Command::GetEnvConfig,
            MSG_CMD_SAFETY => {
                let action = r.u8()?;
                // The key only travels with a reset
                let key = if action == SAFETY_RESET { r.u16()? } else { 0 };
                Command::Safety { action, key }
            }
            MSG_CMD_DIAGNOSTICS => Command::Diagnostics,
            MSG_CMD_BOOTLOADER => Command::EnterBootloader,
            MSG_CMD_CLEANING_START => Command::CleaningStart,
            MSG_CMD_CLEANING_STOP => Command::CleaningStop,
            MSG_CMD_CLEANING_RESET => Command::CleaningReset,
            MSG_CMD_CLEANING_SET_THRESHOLD => Command::CleaningSetThreshold {
                threshold: r.u16()?,
            },
            other => return Err(MessageError::UnknownType(other)),
        };
        Ok(cmd)
    }

    fn config_item(r: &mut PayloadReader<'_>) -> Result<ConfigItem, MessageError> {
        let item = match r.u8()? {
            CONFIG_ENVIRONMENTAL => ConfigItem::Environmental {
                voltage: r.u16()?,
                max_current_x10: r.u16()?,
            },
            CONFIG_HEATING_STRATEGY => ConfigItem::HeatingStrategy { strategy: r.u8()? },
            CONFIG_PREINFUSION => ConfigItem::Preinfusion {
                enabled: r.u8()? != 0,
                on_ms: r.u16()?,
                pause_ms: r.u16()?,
            },
            CONFIG_SINGLE_BOILER => ConfigItem::SingleBoiler {
                switch_delay_ms: r.u16()?,
                steam_timeout_s: r.u16()?,
            },
            CONFIG_HEAT_EXCHANGER => ConfigItem::HeatExchanger {
                mode: r.u8()?,
                pressure_x100: r.u16()?,
            },
            other => return Err(MessageError::UnknownConfigItem(other)),
        };
        Ok(item)
    }

    /// Wire type of this command
    pub fn msg_type(&self) -> u8 {
        match self {
            Command::Ping => MSG_PING,
            Command::SetTemp { .. } => MSG_CMD_SET_TEMP,
            Command::SetPid { .. } => MSG_CMD_SET_PID,
            Command::Brew { .. } => MSG_CMD_BREW,
            Command::Mode { .. } => MSG_CMD_MODE,
            Command::GetConfig => MSG_CMD_GET_CONFIG,
            Command::SetConfig(_) => MSG_CMD_SET_CONFIG,
            Command::GetEnvConfig => MSG_CMD_GET_ENV_CONFIG,
            Command::Safety { .. } => MSG_CMD_SAFETY,
            Command::Diagnostics => MSG_CMD_DIAGNOSTICS,
            Command::EnterBootloader => MSG_CMD_BOOTLOADER,
            Command::CleaningStart => MSG_CMD_CLEANING_START,
            Command::CleaningStop => MSG_CMD_CLEANING_STOP,
            Command::CleaningReset => MSG_CMD_CLEANING_RESET,
            Command::CleaningSetThreshold { .. } => MSG_CMD_CLEANING_SET_THRESHOLD,
        }
    }

    /// Encode this command into a packet (sender side and tests)
    pub fn to_packet(&self, seq: u8) -> Result<Packet, MessageError> {
        let mut w = PayloadWriter::new();
        match *self {
            Command::SetTemp { target, temp_x10 } => {
                w.u8(target)?.i16(temp_x10)?;
            }
            Command::SetPid {
                target,
                kp_x100,
                ki_x100,
                kd_x100,
            } => {
                w.u8(target)?.i16(kp_x100)?.i16(ki_x100)?.i16(kd_x100)?;
            }
            Command::Brew { action } => {
                w.u8(action)?;
            }
            Command::Mode { mode } => {
                w.u8(mode)?;
            }
            Command::SetConfig(item) => match item {
                ConfigItem::Environmental {
                    voltage,
                    max_current_x10,
                } => {
                    w.u8(CONFIG_ENVIRONMENTAL)?.u16(voltage)?.u16(max_current_x10)?;
                }
                ConfigItem::HeatingStrategy { strategy } => {
                    w.u8(CONFIG_HEATING_STRATEGY)?.u8(strategy)?;
                }
                ConfigItem::Preinfusion {
                    enabled,
                    on_ms,
                    pause_ms,
                } => {
                    w.u8(CONFIG_PREINFUSION)?
                        .u8(enabled as u8)?
                        .u16(on_ms)?
                        .u16(pause_ms)?;
                }
                ConfigItem::SingleBoiler {
                    switch_delay_ms,
                    steam_timeout_s,
                } => {
                    w.u8(CONFIG_SINGLE_BOILER)?
                        .u16(switch_delay_ms)?
                        .u16(steam_timeout_s)?;
                }
                ConfigItem::HeatExchanger {
                    mode,
                    pressure_x100,
                } => {
                    w.u8(CONFIG_HEAT_EXCHANGER)?.u8(mode)?.u16(pressure_x100)?;
                }
            },
            Command::Safety { action, key } => {
                w.u8(action)?;
                if action == SAFETY_RESET {
                    w.u16(key)?;
                }
            }
            Command::CleaningSetThreshold { threshold } => {
                w.u16(threshold)?;
            }
            Command::Ping
            | Command::GetConfig
            | Command::GetEnvConfig
            | Command::Diagnostics
            | Command::EnterBootloader
            | Command::CleaningStart
            | Command::CleaningStop
            | Command::CleaningReset => {}
        }
        Ok(w.finish(self.msg_type(), seq))
    }
}

/// Periodic machine status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StatusReport {
    pub brew_temp_x10: i16,
    pub steam_temp_x10: i16,
    pub group_temp_x10: i16,
    pub pressure_x100: u16,
    pub brew_setpoint_x10: i16,
    pub steam_setpoint_x10: i16,
    pub brew_duty: u8,
    pub steam_duty: u8,
    pub pump_duty: u8,
    pub state: u8,
    pub mode: u8,
    pub flags: u8,
    pub water_level: u8,
    pub safety_level: u8,
    pub safety_flags: u8,
    pub strategy: u8,
    pub power_watts: u16,
    pub uptime_ms: u32,
    pub shot_start_ms: u32,
    pub cleaning_count: u16,
}

// StatusReport.flags bits
pub const STATUS_BREWING: u8 = 1 << 0;
pub const STATUS_PUMP_ON: u8 = 1 << 1;
pub const STATUS_HEATING: u8 = 1 << 2;
pub const STATUS_WATER_LOW: u8 = 1 << 3;
pub const STATUS_ALARM: u8 = 1 << 4;
pub const STATUS_CLEANING_DUE: u8 = 1 << 5;

impl StatusReport {
    fn write(&self, w: &mut PayloadWriter) -> Result<(), MessageError> {
        w.i16(self.brew_temp_x10)?
            .i16(self.steam_temp_x10)?
            .i16(self.group_temp_x10)?
            .u16(self.pressure_x100)?
            .i16(self.brew_setpoint_x10)?
            .i16(self.steam_setpoint_x10)?
            .u8(self.brew_duty)?
            .u8(self.steam_duty)?
            .u8(self.pump_duty)?
            .u8(self.state)?
            .u8(self.mode)?
            .u8(self.flags)?
            .u8(self.water_level)?
            .u8(self.safety_level)?
            .u8(self.safety_flags)?
            .u8(self.strategy)?
            .u16(self.power_watts)?
            .u32(self.uptime_ms)?
            .u32(self.shot_start_ms)?
            .u16(self.cleaning_count)?;
        Ok(())
    }

    pub fn decode(payload: &[u8]) -> Result<Self, MessageError> {
        let mut r = PayloadReader::new(payload);
        Ok(Self {
            brew_temp_x10: r.i16()?,
            steam_temp_x10: r.i16()?,
            group_temp_x10: r.i16()?,
            pressure_x100: r.u16()?,
            brew_setpoint_x10: r.i16()?,
            steam_setpoint_x10: r.i16()?,
            brew_duty: r.u8()?,
            steam_duty: r.u8()?,
            pump_duty: r.u8()?,
            state: r.u8()?,
            mode: r.u8()?,
            flags: r.u8()?,
            water_level: r.u8()?,
            safety_level: r.u8()?,
            safety_flags: r.u8()?,
            strategy: r.u8()?,
            power_watts: r.u16()?,
            uptime_ms: r.u32()?,
            shot_start_ms: r.u32()?,
            cleaning_count: r.u16()?,
        })
    }
}

/// Full settings report, reply to GET_CONFIG
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConfigReport {
    pub brew_setpoint_x10: i16,
    pub steam_setpoint_x10: i16,
    pub brew_pid_x100: [i16; 3],
    pub steam_pid_x100: [i16; 3],
    pub strategy: u8,
    pub preinfusion_enabled: bool,
    pub preinfusion_on_ms: u16,
    pub preinfusion_pause_ms: u16,
    pub voltage: u16,
    pub max_current_x10: u16,
    pub cleaning_threshold: u16,
    pub cleaning_count: u16,
    pub topology: u8,
    pub switch_delay_ms: u16,
    pub steam_timeout_s: u16,
    pub hx_mode: u8,
    pub hx_pressure_x100: u16,
}

impl ConfigReport {
    fn write(&self, w: &mut PayloadWriter) -> Result<(), MessageError> {
        w.i16(self.brew_setpoint_x10)?.i16(self.steam_setpoint_x10)?;
        for gain in self.brew_pid_x100.iter().chain(self.steam_pid_x100.iter()) {
            w.i16(*gain)?;
        }
        w.u8(self.strategy)?
            .u8(self.preinfusion_enabled as u8)?
            .u16(self.preinfusion_on_ms)?
            .u16(self.preinfusion_pause_ms)?
            .u16(self.voltage)?
            .u16(self.max_current_x10)?
            .u16(self.cleaning_threshold)?
            .u16(self.cleaning_count)?
            .u8(self.topology)?
            .u16(self.switch_delay_ms)?
            .u16(self.steam_timeout_s)?
            .u8(self.hx_mode)?
            .u16(self.hx_pressure_x100)?;
        Ok(())
    }

    pub fn decode(payload: &[u8]) -> Result<Self, MessageError> {
        let mut r = PayloadReader::new(payload);
        let brew_setpoint_x10 = r.i16()?;
        let steam_setpoint_x10 = r.i16()?;
        let brew_pid_x100 = [r.i16()?, r.i16()?, r.i16()?];
        let steam_pid_x100 = [r.i16()?, r.i16()?, r.i16()?];
        Ok(Self {
            brew_setpoint_x10,
            steam_setpoint_x10,
            brew_pid_x100,
            steam_pid_x100,
            strategy: r.u8()?,
            preinfusion_enabled: r.u8()? != 0,
            preinfusion_on_ms: r.u16()?,
            preinfusion_pause_ms: r.u16()?,
            voltage: r.u16()?,
            max_current_x10: r.u16()?,
            cleaning_threshold: r.u16()?,
            cleaning_count: r.u16()?,
            topology: r.u8()?,
            switch_delay_ms: r.u16()?,
            steam_timeout_s: r.u16()?,
            hx_mode: r.u8()?,
            hx_pressure_x100: r.u16()?,
        })
    }
}

/// Electrical limits and derived heater currents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EnvConfigReport {
    pub voltage: u16,
    pub max_current_x10: u16,
    pub brew_current_x10: u16,
    pub steam_current_x10: u16,
    pub budget_x10: u16,
    pub valid: bool,
}

/// Link and safety counters, reply to DIAGNOSTICS
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DiagnosticsReport {
    pub packets: u32,
    pub crc_errors: u32,
    pub length_errors: u32,
    pub safety_level: u8,
    pub safety_flags: u8,
    pub reset_reason: u8,
    pub uptime_ms: u32,
}

/// Messages from the control board
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Response<'a> {
    Ack { cmd: u8, result: AckResult },
    Status(StatusReport),
    Boot {
        version: [u8; 3],
        topology: u8,
        reset_reason: u8,
    },
    EnvConfig(EnvConfigReport),
    Config(ConfigReport),
    /// Free text, truncated to one payload
    Debug(&'a str),
    Alarm { code: u8, level: u8, value: i16 },
    Diagnostics(DiagnosticsReport),
}

impl<'a> Response<'a> {
    /// Encode this message into a packet
    ///
    /// `seq` is the command's sequence number for acks and replies, or the
    /// sender's own counter for unsolicited messages.
    pub fn to_packet(&self, seq: u8) -> Result<Packet, MessageError> {
        let mut w = PayloadWriter::new();
        let msg_type = match self {
            Response::Ack { cmd, result } => {
                w.u8(*cmd)?.u8(*result as u8)?;
                MSG_ACK
            }
            Response::Status(status) => {
                status.write(&mut w)?;
                MSG_STATUS
            }
            Response::Boot {
                version,
                topology,
                reset_reason,
            } => {
                w.bytes(version)?.u8(*topology)?.u8(*reset_reason)?;
                MSG_BOOT
            }
            Response::EnvConfig(env) => {
                w.u16(env.voltage)?
                    .u16(env.max_current_x10)?
                    .u16(env.brew_current_x10)?
                    .u16(env.steam_current_x10)?
                    .u16(env.budget_x10)?
                    .u8(env.valid as u8)?;
                MSG_ENV_CONFIG
            }
            Response::Config(config) => {
                config.write(&mut w)?;
                MSG_CONFIG
            }
            Response::Debug(text) => {
                let bytes = text.as_bytes();
                w.bytes(&bytes[..bytes.len().min(MAX_PAYLOAD_SIZE)])?;
                MSG_DEBUG
            }
            Response::Alarm { code, level, value } => {
                w.u8(*code)?.u8(*level)?.i16(*value)?;
                MSG_ALARM
            }
            Response::Diagnostics(d) => {
                w.u32(d.packets)?
                    .u32(d.crc_errors)?
                    .u32(d.length_errors)?
                    .u8(d.safety_level)?
                    .u8(d.safety_flags)?
                    .u8(d.reset_reason)?
                    .u32(d.uptime_ms)?;
                MSG_DIAGNOSTICS
            }
        };
        Ok(w.finish(msg_type, seq))
    }
}

/// Parse an ACK packet into (acknowledged command, result)
pub fn decode_ack(packet: &Packet) -> Result<(u8, AckResult), MessageError> {
    if packet.msg_type != MSG_ACK {
        return Err(MessageError::UnknownType(packet.msg_type));
    }
    let mut r = PayloadReader::new(&packet.payload);
    let cmd = r.u8()?;
    let result = AckResult::from_u8(r.u8()?).ok_or(MessageError::PayloadTooShort)?;
    Ok((cmd, result))
}
