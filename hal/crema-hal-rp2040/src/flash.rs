//! Flash access for RP2040
//!
//! One driver owns the FLASH peripheral and serves two clients from the
//! communication core: the settings store (wear-leveled key/value through
//! sequential-storage, async) and the bootloader (raw page programming into
//! staging, blocking).

use core::ops::Range;

use embassy_rp::dma::Channel;
use embassy_rp::flash::{Async, Flash};
use embassy_rp::peripherals::FLASH;
use embassy_rp::Peri;
use sequential_storage::cache::NoCache;
use sequential_storage::map;

pub use crema_hal::flash::{FlashError, FlashLayout, StorageKey};

/// 2 MiB QSPI flash
pub const FLASH_SIZE: usize = 2 * 1024 * 1024;

/// Program memory partitioning
pub const LAYOUT: FlashLayout = FlashLayout {
    main: 0x000000..0x0F0000,
    staging: 0x0F0000..0x1E0000,
    settings: 0x1F0000..0x200000,
    page_size: 256,
    erase_size: 4096,
};

/// Scratch for sequential-storage item (de)serialization
const ITEM_BUF: usize = 512;

pub struct Rp2040Flash<'d> {
    flash: Flash<'d, FLASH, Async, FLASH_SIZE>,
}

impl<'d> Rp2040Flash<'d> {
    pub fn new(flash: Peri<'d, FLASH>, dma: Peri<'d, impl Channel>) -> Self {
        Self {
            flash: Flash::new(flash, dma),
        }
    }

    fn settings_range() -> Range<u32> {
        LAYOUT.settings.clone()
    }
}

impl crema_hal::FlashStorage for Rp2040Flash<'_> {
    async fn read(&mut self, key: StorageKey, buffer: &mut [u8]) -> Result<usize, FlashError> {
        let mut data_buffer = [0u8; ITEM_BUF];

        let result = map::fetch_item::<StorageKey, &[u8], _>(
            &mut self.flash,
            Self::settings_range(),
            &mut NoCache::new(),
            &mut data_buffer,
            &key,
        )
        .await;

        match result {
            Ok(Some(data)) => {
                let len = data.len();
                let dst = buffer.get_mut(..len).ok_or(FlashError::BufferTooSmall)?;
                dst.copy_from_slice(data);
                Ok(len)
            }
            Ok(None) => Err(FlashError::NotFound),
            Err(_) => Err(FlashError::Storage),
        }
    }

    async fn write(&mut self, key: StorageKey, data: &[u8]) -> Result<(), FlashError> {
        let mut data_buffer = [0u8; ITEM_BUF];

        map::store_item(
            &mut self.flash,
            Self::settings_range(),
            &mut NoCache::new(),
            &mut data_buffer,
            &key,
            &data,
        )
        .await
        .map_err(|_| FlashError::Storage)
    }
}

fn touches_main(offset: u32, len: u32) -> bool {
    let end = offset.saturating_add(len);
    offset < LAYOUT.main.end && end > LAYOUT.main.start
}

impl crema_hal::ProgramFlash for Rp2040Flash<'_> {
    fn read(&mut self, offset: u32, buf: &mut [u8]) -> Result<(), FlashError> {
        self.flash
            .blocking_read(offset, buf)
            .map_err(|_| FlashError::OutOfBounds)
    }

    fn erase(&mut self, offset: u32, len: u32) -> Result<(), FlashError> {
        if touches_main(offset, len) {
            return Err(FlashError::OutOfBounds);
        }
        self.flash
            .blocking_erase(offset, offset + len)
            .map_err(|_| FlashError::Erase)
    }

    fn program(&mut self, offset: u32, data: &[u8]) -> Result<(), FlashError> {
        if touches_main(offset, data.len() as u32) {
            return Err(FlashError::OutOfBounds);
        }
        self.flash
            .blocking_write(offset, data)
            .map_err(|_| FlashError::Program)
    }
}
