//! Serial bootloader
//!
//! Entered after an acknowledged ENTER_BOOTLOADER. [`BootloaderSession`]
//! takes the link exclusively, receives the image chunk by chunk into the
//! staging region through [`StagingWriter`], and yields an [`InstallPlan`].
//! Nothing outside staging is touched until an [`ImageInstaller`] runs the
//! plan, and that step does not return on success.
//!
//! Any failure before the install leaves the running image alone and is
//! reported to the sender as `0xFF <code>`. [`run_update`] ties the steps
//! to the machine, which sits in SAFE only around the install itself.

mod install;
mod session;
mod staging;
mod update;

pub use install::{FlashCopyInstaller, ImageInstaller, InstallPlan};
pub use session::{BootloaderSession, CHUNK_TIMEOUT_MS, TOTAL_TIMEOUT_MS};
pub use staging::{StagedImage, StagingWriter, MAX_PAGE_SIZE};
pub use update::run_update;

use crema_hal::{FlashError, LinkError};
use crema_protocol::boot::BootCode;

/// Why a transfer or install was abandoned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BootError {
    Timeout,
    InvalidMagic,
    InvalidSize,
    /// Chunk number was not the next expected one
    InvalidChunk,
    Checksum,
    FlashWrite,
    FlashErase,
    Unknown,
    /// Boot ROM routines needed for the copy were not found
    RomLookup,
}

impl BootError {
    /// Code sent after the error marker
    pub fn code(self) -> BootCode {
        match self {
            BootError::Timeout => BootCode::Timeout,
            BootError::InvalidMagic => BootCode::InvalidMagic,
            BootError::InvalidSize => BootCode::InvalidSize,
            BootError::InvalidChunk => BootCode::InvalidChunk,
            BootError::Checksum => BootCode::Checksum,
            BootError::FlashWrite => BootCode::FlashWrite,
            BootError::FlashErase => BootCode::FlashErase,
            BootError::Unknown => BootCode::Unknown,
            BootError::RomLookup => BootCode::RomLookup,
        }
    }

    /// Text for the debug message sent once normal packets resume
    pub fn message(self) -> &'static str {
        match self {
            BootError::Timeout => "timeout",
            BootError::InvalidMagic => "invalid magic",
            BootError::InvalidSize => "invalid size",
            BootError::InvalidChunk => "invalid chunk",
            BootError::Checksum => "checksum mismatch",
            BootError::FlashWrite => "flash write failed",
            BootError::FlashErase => "flash erase failed",
            BootError::Unknown => "unknown error",
            BootError::RomLookup => "ROM lookup failed",
        }
    }
}

impl From<LinkError> for BootError {
    fn from(e: LinkError) -> Self {
        match e {
            LinkError::Timeout => BootError::Timeout,
            LinkError::Io => BootError::Unknown,
        }
    }
}

impl From<FlashError> for BootError {
    fn from(e: FlashError) -> Self {
        match e {
            FlashError::Erase => BootError::FlashErase,
            _ => BootError::FlashWrite,
        }
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    //! In-memory link and flash for exercising the bootloader on the host

    extern crate std;

    use std::collections::VecDeque;
    use std::vec;
    use std::vec::Vec;

    use core::ops::Range;

    use crema_hal::{FlashError, FlashLayout, LinkError, ProgramFlash, TimedLink};

    /// Scaled-down layout: 4 KiB main, 4 KiB staging, 256 B pages, 1 KiB units
    pub fn layout() -> FlashLayout {
        FlashLayout {
            main: 0..0x1000,
            staging: 0x1000..0x2000,
            settings: 0x2000..0x2400,
            page_size: 256,
            erase_size: 1024,
        }
    }

    pub struct FakeFlash {
        pub mem: Vec<u8>,
        pub erases: Vec<u32>,
        /// Erases starting inside this range fail
        pub fail_erase: Option<Range<u32>>,
    }

    impl FakeFlash {
        pub fn new(size: usize) -> Self {
            Self {
                mem: vec![0xFF; size],
                erases: Vec::new(),
                fail_erase: None,
            }
        }

        pub fn region(&self, range: Range<u32>) -> &[u8] {
            &self.mem[range.start as usize..range.end as usize]
        }
    }

    impl ProgramFlash for FakeFlash {
        fn read(&mut self, offset: u32, buf: &mut [u8]) -> Result<(), FlashError> {
            let start = offset as usize;
            let src = self
                .mem
                .get(start..start + buf.len())
                .ok_or(FlashError::OutOfBounds)?;
            buf.copy_from_slice(src);
            Ok(())
        }

        fn erase(&mut self, offset: u32, len: u32) -> Result<(), FlashError> {
            if self.fail_erase.as_ref().is_some_and(|r| r.contains(&offset)) {
                return Err(FlashError::Erase);
            }
            let start = offset as usize;
            self.mem
                .get_mut(start..start + len as usize)
                .ok_or(FlashError::OutOfBounds)?
                .fill(0xFF);
            self.erases.push(offset);
            Ok(())
        }

        fn program(&mut self, offset: u32, data: &[u8]) -> Result<(), FlashError> {
            let start = offset as usize;
            let dst = self
                .mem
                .get_mut(start..start + data.len())
                .ok_or(FlashError::OutOfBounds)?;
            // NOR flash can only clear bits
            for (d, s) in dst.iter_mut().zip(data) {
                *d &= *s;
            }
            Ok(())
        }
    }

    /// Scripted link: reads drain `rx`, writes append to `tx`
    ///
    /// Every byte read advances the clock by `ms_per_byte`; an empty `rx`
    /// behaves like a silent sender.
    pub struct FakeLink {
        pub rx: VecDeque<u8>,
        pub tx: Vec<u8>,
        pub now: u64,
        pub ms_per_byte: u64,
    }

    impl FakeLink {
        pub fn new(rx: Vec<u8>) -> Self {
            Self {
                rx: rx.into(),
                tx: Vec::new(),
                now: 0,
                ms_per_byte: 0,
            }
        }
    }

    impl TimedLink for FakeLink {
        fn now_ms(&self) -> u64 {
            self.now
        }

        fn read_byte(&mut self, timeout_ms: u32) -> Result<u8, LinkError> {
            match self.rx.pop_front() {
                Some(b) => {
                    self.now += self.ms_per_byte;
                    Ok(b)
                }
                None => {
                    self.now += timeout_ms as u64;
                    Err(LinkError::Timeout)
                }
            }
        }

        fn write_all(&mut self, data: &[u8]) -> Result<(), LinkError> {
            self.tx.extend_from_slice(data);
            Ok(())
        }

        fn flush(&mut self) -> Result<(), LinkError> {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_match_wire_values() {
        assert_eq!(BootError::Timeout.code() as u8, 1);
        assert_eq!(BootError::InvalidChunk.code() as u8, 4);
        assert_eq!(BootError::RomLookup.code() as u8, 9);
    }

    #[test]
    fn test_error_conversions() {
        assert_eq!(BootError::from(LinkError::Timeout), BootError::Timeout);
        assert_eq!(BootError::from(FlashError::Erase), BootError::FlashErase);
        assert_eq!(BootError::from(FlashError::Program), BootError::FlashWrite);
    }
}
