//! Staging-to-main copy

use crema_hal::{FlashLayout, ProgramFlash};

use super::{BootError, StagedImage};

/// Largest erase unit [`FlashCopyInstaller`] can buffer
const MAX_UNIT_SIZE: usize = 4096;

/// What the installer copies, checked against the layout up front
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InstallPlan {
    /// Staging start, flash offset
    pub source: u32,
    /// Main start, flash offset
    pub dest: u32,
    pub len: u32,
    pub erase_size: u32,
    pub page_size: u32,
    /// Logged for diagnostics only
    pub crc32: u32,
}

impl InstallPlan {
    pub fn new(layout: &FlashLayout, image: StagedImage) -> Result<Self, BootError> {
        if image.len == 0 || image.len > layout.staging_capacity() {
            return Err(BootError::InvalidSize);
        }
        Ok(Self {
            source: layout.staging.start,
            dest: layout.main.start,
            len: image.len,
            erase_size: layout.erase_size,
            page_size: layout.page_size,
            crc32: image.crc32,
        })
    }

    /// Erase units the copy spans
    pub fn units(&self) -> u32 {
        self.len.div_ceil(self.erase_size)
    }
}

/// Replaces the main image with the staged one
pub trait ImageInstaller {
    /// Run the copy
    ///
    /// An `Err` means main was not modified. Hardware implementations reset
    /// once the copy is done and never return `Ok`.
    fn install(&mut self, plan: &InstallPlan) -> Result<(), BootError>;
}

/// Unit-by-unit copy through [`ProgramFlash`]
///
/// Only usable where the code doing the copy does not execute from the
/// main region, such as a host-side flash model.
pub struct FlashCopyInstaller<'f, F: ProgramFlash> {
    flash: &'f mut F,
    unit: [u8; MAX_UNIT_SIZE],
}

impl<'f, F: ProgramFlash> FlashCopyInstaller<'f, F> {
    pub fn new(flash: &'f mut F) -> Self {
        Self {
            flash,
            unit: [0xFF; MAX_UNIT_SIZE],
        }
    }
}

impl<F: ProgramFlash> ImageInstaller for FlashCopyInstaller<'_, F> {
    fn install(&mut self, plan: &InstallPlan) -> Result<(), BootError> {
        let size = plan.erase_size as usize;
        if size > MAX_UNIT_SIZE || plan.page_size == 0 || size % plan.page_size as usize != 0 {
            return Err(BootError::Unknown);
        }
        let unit = &mut self.unit[..size];
        for i in 0..plan.units() {
            let offset = i * plan.erase_size;
            self.flash.read(plan.source + offset, unit)?;
            self.flash
                .erase(plan.dest + offset, plan.erase_size)
                .map_err(|_| BootError::FlashErase)?;
            for (p, page) in unit.chunks(plan.page_size as usize).enumerate() {
                // Skip pages that are still erased
                if page.iter().all(|&b| b == 0xFF) {
                    continue;
                }
                let at = p as u32 * plan.page_size;
                self.flash
                    .program(plan.dest + offset + at, page)
                    .map_err(|_| BootError::FlashWrite)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootloader::fakes::{layout, FakeFlash};

    #[test]
    fn test_plan_spans_units() {
        let plan = InstallPlan::new(&layout(), StagedImage { len: 1025, crc32: 0 }).unwrap();
        assert_eq!(plan.source, 0x1000);
        assert_eq!(plan.dest, 0);
        assert_eq!(plan.units(), 2);
        assert_eq!(
            InstallPlan::new(&layout(), StagedImage { len: 0, crc32: 0 }),
            Err(BootError::InvalidSize)
        );
    }

    #[test]
    fn test_copy_replaces_main() {
        let mut flash = FakeFlash::new(0x2400);
        flash.mem[..0x1000].fill(0x11);
        flash.mem[0x1000..0x1000 + 1500].fill(0x42);
        let plan = InstallPlan::new(&layout(), StagedImage { len: 1500, crc32: 0 }).unwrap();

        FlashCopyInstaller::new(&mut flash).install(&plan).unwrap();
        assert!(flash.region(0..1500).iter().all(|&b| b == 0x42));
        // The rest of the last unit takes staging's erased bytes
        assert!(flash.region(1500..2048).iter().all(|&b| b == 0xFF));
        assert!(flash.region(2048..0x1000).iter().all(|&b| b == 0x11));
    }
}
