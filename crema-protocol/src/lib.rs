//! Control-board link protocol
//!
//! This crate defines the UART protocol between the espresso machine's
//! control board and its connectivity board, plus the raw sub-protocol
//! used while the control board is being reflashed.
//!
//! # Protocol Overview
//!
//! All messages use a binary packet format:
//! ```text
//! ┌───────┬──────┬────────┬─────┬─────────────┬──────────┐
//! │ START │ TYPE │ LENGTH │ SEQ │ PAYLOAD     │ CRC16 LE │
//! │ 1B    │ 1B   │ 1B     │ 1B  │ 0–56B       │ 2B       │
//! └───────┴──────┴────────┴─────┴─────────────┴──────────┘
//! ```
//!
//! Every command is answered by an ACK echoing its sequence number. Status
//! is pushed unsolicited on a fixed period.

#![no_std]
#![deny(unsafe_code)]

pub mod boot;
pub mod checksum;
pub mod frame;
pub mod messages;

pub use frame::{
    FrameError, Packet, PacketParser, ParseState, ParserStats, FRAME_START, MAX_FRAME_SIZE,
    MAX_PAYLOAD_SIZE,
};
pub use messages::{
    AckResult, Command, ConfigItem, ConfigReport, DiagnosticsReport, EnvConfigReport,
    MessageError, Response, StatusReport,
};
