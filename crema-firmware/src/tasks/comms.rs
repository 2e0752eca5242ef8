//! Link to the connectivity board
//!
//! Owns the UART and the flash on core 0. Parses incoming packets, applies
//! them to the machine through the dispatcher, sends periodic STATUS and
//! new ALARMs, writes settings when asked, and hands the link to the
//! bootloader on request.

use core::fmt::Write as _;

use defmt::*;
use embassy_futures::select::{select, Either};
use embassy_rp::uart::BufferedUart;
use embassy_time::{Duration, Instant, Ticker};
use embedded_io_async::{Read, Write};

use crema_core::dispatch::{handle_command, LinkContext};
use crema_hal_rp2040::Rp2040Flash;
use crema_protocol::frame::{Packet, PacketParser, MAX_FRAME_SIZE, MAX_PAYLOAD_SIZE};
use crema_protocol::messages::Response;

use super::bootloader;
use crate::channels::{MACHINE, PERSIST_REQUEST, SNAPSHOT};
use crate::config::{SettingsStore, FIRMWARE_VERSION, PROFILE};

/// STATUS cadence
const STATUS_PERIOD: Duration = Duration::from_millis(250);

const RX_BUF_SIZE: usize = 64;

struct Link {
    uart: BufferedUart,
    store: SettingsStore<Rp2040Flash<'static>>,
    parser: PacketParser,
    reset_reason: u8,
    /// Sequence for unsolicited messages
    tx_seq: u8,
    /// Last alarm forwarded
    alarm_seq: Option<u16>,
}

impl Link {
    fn now_ms() -> u64 {
        Instant::now().as_millis()
    }

    async fn send(&mut self, response: &Response<'_>, seq: u8) {
        let packet = match response.to_packet(seq) {
            Ok(packet) => packet,
            Err(e) => {
                warn!("Failed to encode response: {:?}", e);
                return;
            }
        };
        self.write_packet(&packet).await;
    }

    async fn send_unsolicited(&mut self, response: &Response<'_>) {
        let seq = self.tx_seq;
        self.tx_seq = self.tx_seq.wrapping_add(1);
        self.send(response, seq).await;
    }

    async fn write_packet(&mut self, packet: &Packet) {
        let mut buf = [0u8; MAX_FRAME_SIZE];
        match packet.encode(&mut buf) {
            Ok(len) => {
                if let Err(e) = self.uart.write_all(&buf[..len]).await {
                    warn!("UART write error: {:?}", e);
                }
            }
            Err(e) => warn!("Failed to frame packet: {:?}", e),
        }
    }

    /// BOOT, then the electrical configuration
    async fn announce(&mut self) {
        self.send_unsolicited(&Response::Boot {
            version: FIRMWARE_VERSION,
            topology: PROFILE.topology.as_u8(),
            reset_reason: self.reset_reason,
        })
        .await;

        let Some((env, valid)) = MACHINE.with(|m| (m.env_report(), m.env_valid())) else {
            return;
        };
        if !valid {
            warn!("Electrical limits not configured, holding SAFE");
        }
        self.send_unsolicited(&Response::EnvConfig(env)).await;
    }

    async fn handle_bytes(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            match self.parser.feed(byte) {
                Ok(Some(packet)) => self.handle_packet(&packet).await,
                Ok(None) => {}
                Err(e) => debug!("Frame error: {:?}", e),
            }
        }
    }

    async fn handle_packet(&mut self, packet: &Packet) {
        trace!("RX type {=u8:#x} seq {}", packet.msg_type, packet.seq);

        let context = LinkContext {
            now_ms: Self::now_ms(),
            stats: self.parser.stats(),
            reset_reason: self.reset_reason,
        };
        let Some(outcome) = MACHINE.with(|m| handle_command(m, packet, &context)) else {
            return;
        };

        if let Some(e) = outcome.error {
            debug!("Rejected packet {=u8:#x}: {:?}", packet.msg_type, e);
        }
        for reply in &outcome.replies {
            self.send(reply, packet.seq).await;
        }
        if outcome.persist {
            self.save_settings().await;
        }
        if outcome.enter_bootloader {
            self.run_bootloader().await;
        }
    }

    async fn save_settings(&mut self) {
        PERSIST_REQUEST.reset();
        let Some(settings) = MACHINE.with(|m| m.settings()) else {
            return;
        };
        match self.store.save(&settings).await {
            Ok(()) => info!("Settings saved"),
            Err(e) => error!("Settings save failed: {:?}", e),
        }
    }

    async fn run_bootloader(&mut self) {
        // Let the ack drain before the link changes protocol
        if let Err(e) = self.uart.flush().await {
            warn!("UART flush error: {:?}", e);
        }

        let error = bootloader::update(&mut self.uart, self.store.storage());
        error!("Bootloader failed: {:?}", error);

        self.parser.reset();
        let mut text: heapless::String<MAX_PAYLOAD_SIZE> = heapless::String::new();
        // Truncation is fine
        let _ = write!(text, "Bootloader failed: {}", error.message());
        self.send_unsolicited(&Response::Debug(text.as_str())).await;
    }

    async fn tick(&mut self) {
        let snapshot = SNAPSHOT.latest();
        self.send_unsolicited(&Response::Status(snapshot.to_report()))
            .await;

        if let Some(alarm) = snapshot.alarm {
            if self.alarm_seq != Some(alarm.seq) {
                self.alarm_seq = Some(alarm.seq);
                warn!(
                    "Alarm #{}: code {=u8:#x} level {:?} value {}",
                    alarm.seq, alarm.code, alarm.level, alarm.value
                );
                self.send_unsolicited(&Response::Alarm {
                    code: alarm.code,
                    level: alarm.level as u8,
                    value: alarm.value,
                })
                .await;
            }
        }

        if PERSIST_REQUEST.signaled() {
            self.save_settings().await;
        }
    }
}

#[embassy_executor::task]
pub async fn comms_task(
    uart: BufferedUart,
    store: SettingsStore<Rp2040Flash<'static>>,
    reset_reason: u8,
) {
    info!("Comms task started");

    let mut link = Link {
        uart,
        store,
        parser: PacketParser::new(),
        reset_reason,
        tx_seq: 0,
        alarm_seq: None,
    };
    link.announce().await;

    let mut ticker = Ticker::every(STATUS_PERIOD);
    let mut rx = [0u8; RX_BUF_SIZE];
    loop {
        match select(link.uart.read(&mut rx), ticker.next()).await {
            Either::First(Ok(n)) => link.handle_bytes(&rx[..n]).await,
            Either::First(Err(e)) => warn!("UART read error: {:?}", e),
            Either::Second(()) => link.tick().await,
        }
    }
}
