//! Serial link abstractions
//!
//! The bootloader owns the link exclusively and runs a strictly sequential
//! receive loop, so it uses blocking I/O with explicit timeouts instead of
//! the async UART the normal protocol task uses.

/// Errors from link operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkError {
    /// No byte arrived before the deadline
    Timeout,
    /// Framing, overrun or other receiver error
    Io,
}

/// Byte link with bounded reads
pub trait TimedLink {
    /// Monotonic milliseconds, used for deadlines
    fn now_ms(&self) -> u64;

    /// Read one byte, waiting at most `timeout_ms`
    fn read_byte(&mut self, timeout_ms: u32) -> Result<u8, LinkError>;

    /// Write all of `data`
    fn write_all(&mut self, data: &[u8]) -> Result<(), LinkError>;

    /// Block until written data has left the transmitter
    fn flush(&mut self) -> Result<(), LinkError>;

    /// Fill `buf` completely, all of it within `timeout_ms`
    fn read_exact(&mut self, buf: &mut [u8], timeout_ms: u32) -> Result<(), LinkError> {
        let deadline = self.now_ms() + timeout_ms as u64;
        for slot in buf.iter_mut() {
            let remaining = deadline.saturating_sub(self.now_ms());
            if remaining == 0 {
                return Err(LinkError::Timeout);
            }
            *slot = self.read_byte(remaining as u32)?;
        }
        Ok(())
    }
}
