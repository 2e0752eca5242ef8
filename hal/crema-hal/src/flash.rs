//! Flash storage abstractions
//!
//! Two views of the same chip:
//! - [`FlashStorage`]: wear-leveled key/value storage for settings
//! - [`ProgramFlash`]: raw erase/program access used by the bootloader to
//!   fill the staging region

use core::ops::Range;

/// Keys in the settings store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum StorageKey {
    /// Versioned settings blob
    MachineSettings = 0,
}

impl StorageKey {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(StorageKey::MachineSettings),
            _ => None,
        }
    }
}

/// Errors from flash operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlashError {
    Erase,
    Program,
    /// Address or length outside the permitted region, or misaligned
    OutOfBounds,
    /// The key/value layer failed
    Storage,
    NotFound,
    BufferTooSmall,
}

/// Wear-leveled key/value store for the settings blob
///
/// Integrity of the value itself is the caller's concern; the store only
/// guarantees that a write is either complete or not visible.
pub trait FlashStorage {
    /// Read the value for `key` into `buffer`, returning its length
    fn read(
        &mut self,
        key: StorageKey,
        buffer: &mut [u8],
    ) -> impl core::future::Future<Output = Result<usize, FlashError>>;

    /// Replace the value for `key`
    fn write(
        &mut self,
        key: StorageKey,
        data: &[u8],
    ) -> impl core::future::Future<Output = Result<(), FlashError>>;
}

/// Partitioning of program memory
///
/// Offsets are relative to the start of flash. `main` holds the running
/// image, `staging` receives a new one, `settings` backs [`FlashStorage`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FlashLayout {
    pub main: Range<u32>,
    pub staging: Range<u32>,
    pub settings: Range<u32>,
    /// Smallest programmable unit
    pub page_size: u32,
    /// Smallest erasable unit
    pub erase_size: u32,
}

impl FlashLayout {
    /// Bytes available for a staged image
    pub fn staging_capacity(&self) -> u32 {
        let staging = self.staging.end - self.staging.start;
        let main = self.main.end - self.main.start;
        staging.min(main)
    }

    /// Regions are erase-aligned and pairwise disjoint
    pub fn is_consistent(&self) -> bool {
        let aligned = |r: &Range<u32>| {
            r.start % self.erase_size == 0 && r.end % self.erase_size == 0 && r.start < r.end
        };
        let disjoint = |a: &Range<u32>, b: &Range<u32>| a.end <= b.start || b.end <= a.start;

        self.page_size > 0
            && self.erase_size % self.page_size == 0
            && aligned(&self.main)
            && aligned(&self.staging)
            && aligned(&self.settings)
            && disjoint(&self.main, &self.staging)
            && disjoint(&self.main, &self.settings)
            && disjoint(&self.staging, &self.settings)
    }
}

/// Blocking raw access to program memory
///
/// Offsets are relative to the start of flash. Implementations reject any
/// erase or program that touches the main region while it is executing.
pub trait ProgramFlash {
    /// Read `buf.len()` bytes starting at `offset`
    fn read(&mut self, offset: u32, buf: &mut [u8]) -> Result<(), FlashError>;

    /// Erase `len` bytes starting at `offset` (erase-unit aligned)
    fn erase(&mut self, offset: u32, len: u32) -> Result<(), FlashError>;

    /// Program `data` at `offset` (page aligned, whole pages)
    fn program(&mut self, offset: u32, data: &[u8]) -> Result<(), FlashError>;
}

#[cfg(feature = "sequential-storage")]
impl sequential_storage::map::Key for StorageKey {
    fn serialize_into(
        &self,
        buffer: &mut [u8],
    ) -> Result<usize, sequential_storage::map::SerializationError> {
        if buffer.is_empty() {
            return Err(sequential_storage::map::SerializationError::BufferTooSmall);
        }
        buffer[0] = self.as_u8();
        Ok(1)
    }

    fn deserialize_from(
        buffer: &[u8],
    ) -> Result<(Self, usize), sequential_storage::map::SerializationError> {
        if buffer.is_empty() {
            return Err(sequential_storage::map::SerializationError::BufferTooSmall);
        }
        match StorageKey::from_u8(buffer[0]) {
            Some(key) => Ok((key, 1)),
            None => Err(sequential_storage::map::SerializationError::InvalidFormat),
        }
    }
}
