//! Polled byte link for the bootloader
//!
//! Wraps any UART with blocking embedded-io traits. Reads poll
//! `read_ready` against an embassy-time deadline, so a silent sender
//! costs a timeout rather than a hang.

use embassy_time::{block_for, Duration, Instant};
use embedded_io::{Read, ReadReady, Write};

use crema_hal::{LinkError, TimedLink};

/// Poll interval while waiting for a byte
const POLL: Duration = Duration::from_micros(100);

pub struct PolledLink<'a, U> {
    uart: &'a mut U,
}

impl<'a, U: Read + ReadReady + Write> PolledLink<'a, U> {
    pub fn new(uart: &'a mut U) -> Self {
        Self { uart }
    }
}

impl<U: Read + ReadReady + Write> TimedLink for PolledLink<'_, U> {
    fn now_ms(&self) -> u64 {
        Instant::now().as_millis()
    }

    fn read_byte(&mut self, timeout_ms: u32) -> Result<u8, LinkError> {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms as u64);
        loop {
            if self.uart.read_ready().map_err(|_| LinkError::Io)? {
                let mut byte = [0u8; 1];
                return match self.uart.read(&mut byte) {
                    Ok(1) => Ok(byte[0]),
                    Ok(_) => Err(LinkError::Io),
                    Err(_) => Err(LinkError::Io),
                };
            }
            if Instant::now() >= deadline {
                return Err(LinkError::Timeout);
            }
            block_for(POLL);
        }
    }

    fn write_all(&mut self, data: &[u8]) -> Result<(), LinkError> {
        self.uart.write_all(data).map_err(|_| LinkError::Io)
    }

    fn flush(&mut self) -> Result<(), LinkError> {
        self.uart.flush().map_err(|_| LinkError::Io)
    }
}
