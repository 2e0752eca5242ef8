//! Page-buffered writes into the staging region

use crema_hal::{FlashLayout, ProgramFlash};
use crema_protocol::checksum::Crc32;

use super::BootError;

/// Largest program unit the writer can buffer
pub const MAX_PAGE_SIZE: usize = 256;

/// A complete image sitting in staging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StagedImage {
    /// Image bytes, excluding page padding
    pub len: u32,
    /// CRC-32 over the image as read back from staging
    pub crc32: u32,
}

/// Streams image bytes into staging one page at a time
///
/// Each erase unit is erased the first time a page lands in it and never
/// again. Bytes outside the staging region are never touched.
pub struct StagingWriter<'f, F: ProgramFlash> {
    flash: &'f mut F,
    base: u32,
    capacity: u32,
    page_size: u32,
    erase_size: u32,
    page: [u8; MAX_PAGE_SIZE],
    fill: usize,
    /// Offset of the next page to program, relative to `base`
    next_page: u32,
    erased_unit: Option<u32>,
    written: u32,
}

impl<'f, F: ProgramFlash> StagingWriter<'f, F> {
    pub fn new(flash: &'f mut F, layout: &FlashLayout) -> Result<Self, BootError> {
        if !layout.is_consistent() || layout.page_size as usize > MAX_PAGE_SIZE {
            return Err(BootError::Unknown);
        }
        Ok(Self {
            flash,
            base: layout.staging.start,
            capacity: layout.staging_capacity(),
            page_size: layout.page_size,
            erase_size: layout.erase_size,
            page: [0xFF; MAX_PAGE_SIZE],
            fill: 0,
            next_page: 0,
            erased_unit: None,
            written: 0,
        })
    }

    /// Bytes accepted so far
    pub fn written(&self) -> u32 {
        self.written
    }

    /// Whether `len` more bytes still fit
    pub fn fits(&self, len: usize) -> bool {
        self.written as u64 + len as u64 <= self.capacity as u64
    }

    pub fn push(&mut self, mut data: &[u8]) -> Result<(), BootError> {
        if !self.fits(data.len()) {
            return Err(BootError::InvalidSize);
        }
        let page_size = self.page_size as usize;
        while !data.is_empty() {
            let take = (page_size - self.fill).min(data.len());
            self.page[self.fill..self.fill + take].copy_from_slice(&data[..take]);
            self.fill += take;
            self.written += take as u32;
            data = &data[take..];
            if self.fill == page_size {
                self.program_page()?;
            }
        }
        Ok(())
    }

    /// Program the last partial page and checksum what landed in staging
    pub fn finish(mut self) -> Result<StagedImage, BootError> {
        if self.fill > 0 {
            self.page[self.fill..self.page_size as usize].fill(0xFF);
            self.program_page()?;
        }

        let mut crc = Crc32::new();
        let mut buf = [0u8; MAX_PAGE_SIZE];
        let mut offset = 0;
        while offset < self.written {
            let n = (self.written - offset).min(MAX_PAGE_SIZE as u32) as usize;
            self.flash.read(self.base + offset, &mut buf[..n])?;
            crc.update(&buf[..n]);
            offset += n as u32;
        }
        Ok(StagedImage {
            len: self.written,
            crc32: crc.finish(),
        })
    }

    fn program_page(&mut self) -> Result<(), BootError> {
        let addr = self.base + self.next_page;
        let unit = addr / self.erase_size;
        if self.erased_unit != Some(unit) {
            self.flash
                .erase(unit * self.erase_size, self.erase_size)
                .map_err(|_| BootError::FlashErase)?;
            self.erased_unit = Some(unit);
        }
        self.flash
            .program(addr, &self.page[..self.page_size as usize])
            .map_err(|_| BootError::FlashWrite)?;
        self.next_page += self.page_size;
        self.fill = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use std::vec::Vec;

    use super::*;
    use crate::bootloader::fakes::{layout, FakeFlash};
    use crema_protocol::checksum::crc32;

    fn image(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 + 3) as u8).collect()
    }

    #[test]
    fn test_unaligned_chunks_land_contiguously() {
        let mut flash = FakeFlash::new(0x2400);
        let data = image(700);
        let mut writer = StagingWriter::new(&mut flash, &layout()).unwrap();
        for part in data.chunks(100) {
            writer.push(part).unwrap();
        }
        let staged = writer.finish().unwrap();

        assert_eq!(staged.len, 700);
        assert_eq!(staged.crc32, crc32(&data));
        assert_eq!(flash.region(0x1000..0x1000 + 700), &data[..]);
        // Padding after the image stays erased
        assert!(flash.region(0x1000 + 700..0x1000 + 768).iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn test_each_unit_erased_once() {
        let mut flash = FakeFlash::new(0x2400);
        let mut writer = StagingWriter::new(&mut flash, &layout()).unwrap();
        writer.push(&image(2048 + 10)).unwrap();
        writer.finish().unwrap();
        assert_eq!(flash.erases, [0x1000, 0x1400, 0x1800]);
    }

    #[test]
    fn test_capacity_enforced() {
        let mut flash = FakeFlash::new(0x2400);
        let mut writer = StagingWriter::new(&mut flash, &layout()).unwrap();
        writer.push(&image(4000)).unwrap();
        assert_eq!(writer.push(&image(97)), Err(BootError::InvalidSize));
        assert!(writer.fits(96));
    }

    #[test]
    fn test_erase_failure_reported() {
        let mut flash = FakeFlash::new(0x2400);
        flash.fail_erase = Some(0x1000..0x1400);
        let mut writer = StagingWriter::new(&mut flash, &layout()).unwrap();
        assert_eq!(writer.push(&image(256)), Err(BootError::FlashErase));
    }
}
