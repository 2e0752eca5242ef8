//! Chunk receive loop

use crema_hal::{FlashLayout, ProgramFlash, TimedLink};
use crema_protocol::boot::{
    BootCode, ChunkHeader, CHUNK_HEADER_LEN, CHUNK_MAGIC, END_MARKER, ERROR_MARKER,
    MAX_CHUNK_SIZE, PROGRESS_ACK, PROGRESS_INTERVAL, READY_ACK,
};
use crema_protocol::checksum::xor8;

use super::{BootError, InstallPlan, StagingWriter};

/// Whole transfer must finish within this
pub const TOTAL_TIMEOUT_MS: u32 = 30_000;

/// Each read inside a chunk must complete within this
pub const CHUNK_TIMEOUT_MS: u32 = 5_000;

/// One firmware transfer over an exclusively owned link
pub struct BootloaderSession<'a, L: TimedLink, F: ProgramFlash> {
    link: &'a mut L,
    flash: &'a mut F,
    layout: FlashLayout,
}

impl<'a, L: TimedLink, F: ProgramFlash> BootloaderSession<'a, L, F> {
    pub fn new(link: &'a mut L, flash: &'a mut F, layout: FlashLayout) -> Self {
        Self {
            link,
            flash,
            layout,
        }
    }

    /// Receive an image into staging
    ///
    /// On failure the error code has already been sent to the peer and the
    /// main region is untouched.
    pub fn receive(&mut self) -> Result<InstallPlan, BootError> {
        self.transfer().map_err(|e| {
            self.report_failure(e);
            e
        })
    }

    /// Send `0xFF <code>` to the peer
    pub fn report_failure(&mut self, error: BootError) {
        // Best effort: the link may be what failed
        let _ = self.link.write_all(&[ERROR_MARKER, error.code() as u8]);
        let _ = self.link.flush();
    }

    pub fn now_ms(&self) -> u64 {
        self.link.now_ms()
    }

    /// Tell the peer the image is accepted and the copy is about to start
    pub fn announce_install(&mut self) -> Result<(), BootError> {
        self.link.write_all(&READY_ACK)?;
        self.link.write_all(&[BootCode::Success as u8])?;
        self.link.flush()?;
        Ok(())
    }

    fn transfer(&mut self) -> Result<InstallPlan, BootError> {
        self.link.write_all(&READY_ACK)?;
        self.link.flush()?;

        let started = self.link.now_ms();
        let mut writer = StagingWriter::new(self.flash, &self.layout)?;
        let mut expected: u32 = 0;
        let mut data = [0u8; MAX_CHUNK_SIZE];

        loop {
            if self.link.now_ms().saturating_sub(started) > TOTAL_TIMEOUT_MS as u64 {
                return Err(BootError::Timeout);
            }

            let mut magic = [0u8; 2];
            self.link.read_exact(&mut magic, CHUNK_TIMEOUT_MS)?;
            if magic == END_MARKER {
                break;
            }
            if magic != CHUNK_MAGIC {
                return Err(BootError::InvalidMagic);
            }

            let mut raw = [0u8; CHUNK_HEADER_LEN];
            self.link.read_exact(&mut raw, CHUNK_TIMEOUT_MS)?;
            let header = ChunkHeader::parse(&raw);
            let size = header.size as usize;
            if size == 0 || size > MAX_CHUNK_SIZE {
                return Err(BootError::InvalidSize);
            }
            if header.number != expected {
                return Err(BootError::InvalidChunk);
            }
            if !writer.fits(size) {
                return Err(BootError::InvalidSize);
            }

            let data = &mut data[..size];
            self.link.read_exact(data, CHUNK_TIMEOUT_MS)?;
            let mut check = [0u8; 1];
            self.link.read_exact(&mut check, CHUNK_TIMEOUT_MS)?;
            if xor8(data) != check[0] {
                return Err(BootError::Checksum);
            }

            writer.push(data)?;
            expected += 1;
            if expected % PROGRESS_INTERVAL == 0 {
                self.link.write_all(&[PROGRESS_ACK])?;
            }
        }

        if writer.written() == 0 {
            return Err(BootError::InvalidSize);
        }
        let image = writer.finish()?;
        InstallPlan::new(&self.layout, image)
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use std::vec::Vec;

    use super::*;
    use crate::bootloader::fakes::{layout, FakeFlash, FakeLink};
    use crate::bootloader::{FlashCopyInstaller, ImageInstaller};
    use crema_protocol::boot::encode_chunk;
    use crema_protocol::checksum::crc32;

    fn image(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 13 + 1) as u8).collect()
    }

    /// Encode `parts` as chunks numbered by `numbers`
    fn stream(parts: &[&[u8]], numbers: &[u32], end: bool) -> Vec<u8> {
        let mut out = Vec::new();
        for (part, &n) in parts.iter().zip(numbers) {
            let mut buf = [0u8; MAX_CHUNK_SIZE + 9];
            let len = encode_chunk(n, part, &mut buf).unwrap();
            out.extend_from_slice(&buf[..len]);
        }
        if end {
            out.extend_from_slice(&END_MARKER);
        }
        out
    }

    fn flash_with_main() -> FakeFlash {
        let mut flash = FakeFlash::new(0x2400);
        for (i, b) in flash.mem[..0x1000].iter_mut().enumerate() {
            *b = (i % 251) as u8;
        }
        flash
    }

    #[test]
    fn test_full_transfer() {
        let data = image(2600);
        let parts: Vec<&[u8]> = data.chunks(MAX_CHUNK_SIZE).collect();
        let numbers: Vec<u32> = (0..parts.len() as u32).collect();
        let mut link = FakeLink::new(stream(&parts, &numbers, true));
        let mut flash = FakeFlash::new(0x2400);

        let plan = BootloaderSession::new(&mut link, &mut flash, layout())
            .receive()
            .unwrap();
        assert_eq!(plan.len, 2600);
        assert_eq!(plan.crc32, crc32(&data));
        assert_eq!(plan.units(), 3);
        assert_eq!(flash.region(0x1000..0x1000 + 2600), &data[..]);
        // Ready, then one progress ack after chunk 10
        assert_eq!(link.tx, [0xAA, 0x55, PROGRESS_ACK]);
    }

    #[test]
    fn test_gap_rejected_and_staging_untouched() {
        let data = image(4 * MAX_CHUNK_SIZE);
        let parts: Vec<&[u8]> = data.chunks(MAX_CHUNK_SIZE).collect();
        let mut link = FakeLink::new(stream(&parts[..3], &[0, 1, 3], true));
        let mut flash = flash_with_main();
        let main_before = flash.region(0..0x1000).to_vec();

        let result = BootloaderSession::new(&mut link, &mut flash, layout()).receive();
        assert_eq!(result, Err(BootError::InvalidChunk));
        assert_eq!(&link.tx[link.tx.len() - 2..], [ERROR_MARKER, 4]);

        // Chunks 0 and 1 fill exactly two pages; nothing follows them
        assert_eq!(flash.region(0x1000..0x1200), &data[..512]);
        assert!(flash.region(0x1200..0x2000).iter().all(|&b| b == 0xFF));
        assert_eq!(flash.region(0..0x1000), &main_before[..]);
    }

    #[test]
    fn test_bad_checksum() {
        let mut bytes = stream(&[&[1, 2, 3]], &[0], true);
        bytes[10] ^= 0x01;
        let mut link = FakeLink::new(bytes);
        let mut flash = FakeFlash::new(0x2400);
        let result = BootloaderSession::new(&mut link, &mut flash, layout()).receive();
        assert_eq!(result, Err(BootError::Checksum));
    }

    #[test]
    fn test_bad_magic_and_oversize() {
        let mut link = FakeLink::new([0x12, 0x34].to_vec());
        let mut flash = FakeFlash::new(0x2400);
        let result = BootloaderSession::new(&mut link, &mut flash, layout()).receive();
        assert_eq!(result, Err(BootError::InvalidMagic));

        let mut bytes = Vec::new();
        bytes.extend_from_slice(&CHUNK_MAGIC);
        bytes.extend_from_slice(&ChunkHeader { number: 0, size: 257 }.to_bytes());
        let mut link = FakeLink::new(bytes);
        let result = BootloaderSession::new(&mut link, &mut flash, layout()).receive();
        assert_eq!(result, Err(BootError::InvalidSize));
    }

    #[test]
    fn test_image_larger_than_staging() {
        let data = image(17 * MAX_CHUNK_SIZE);
        let parts: Vec<&[u8]> = data.chunks(MAX_CHUNK_SIZE).collect();
        let numbers: Vec<u32> = (0..parts.len() as u32).collect();
        let mut link = FakeLink::new(stream(&parts, &numbers, true));
        let mut flash = FakeFlash::new(0x2400);
        let result = BootloaderSession::new(&mut link, &mut flash, layout()).receive();
        assert_eq!(result, Err(BootError::InvalidSize));
        // Settings region is never reached
        assert!(flash.region(0x2000..0x2400).iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn test_silent_sender_times_out() {
        let mut link = FakeLink::new(stream(&[&[9; 16]], &[0], false));
        let mut flash = FakeFlash::new(0x2400);
        let result = BootloaderSession::new(&mut link, &mut flash, layout()).receive();
        assert_eq!(result, Err(BootError::Timeout));
        assert_eq!(&link.tx[link.tx.len() - 2..], [ERROR_MARKER, 1]);
    }

    #[test]
    fn test_slow_transfer_hits_total_timeout() {
        let data = image(20 * 16);
        let parts: Vec<&[u8]> = data.chunks(16).collect();
        let numbers: Vec<u32> = (0..parts.len() as u32).collect();
        let mut link = FakeLink::new(stream(&parts, &numbers, true));
        // 25 bytes per chunk at 100 ms each: 2.5 s per chunk
        link.ms_per_byte = 100;
        let mut flash = FakeFlash::new(0x2400);
        let result = BootloaderSession::new(&mut link, &mut flash, layout()).receive();
        assert_eq!(result, Err(BootError::Timeout));
    }

    #[test]
    fn test_main_erase_failure_leaves_main_intact() {
        let data = image(1500);
        let parts: Vec<&[u8]> = data.chunks(MAX_CHUNK_SIZE).collect();
        let numbers: Vec<u32> = (0..parts.len() as u32).collect();
        let mut link = FakeLink::new(stream(&parts, &numbers, true));
        let mut flash = flash_with_main();
        let main_before = flash.region(0..0x1000).to_vec();

        let plan = BootloaderSession::new(&mut link, &mut flash, layout())
            .receive()
            .unwrap();
        flash.fail_erase = Some(0..0x1000);
        let result = FlashCopyInstaller::new(&mut flash).install(&plan);
        assert_eq!(result, Err(BootError::FlashErase));
        assert_eq!(flash.region(0..0x1000), &main_before[..]);
    }

    #[test]
    fn test_announce_install() {
        let mut link = FakeLink::new(Vec::new());
        let mut flash = FakeFlash::new(0x2400);
        BootloaderSession::new(&mut link, &mut flash, layout())
            .announce_install()
            .unwrap();
        assert_eq!(link.tx, [0xAA, 0x55, 0x00]);
    }
}
