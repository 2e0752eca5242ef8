//! Bootloader sub-protocol
//!
//! Once ENTER_BOOTLOADER has been acknowledged the link carries raw chunks
//! instead of packets:
//!
//! ```text
//! ┌───────────┬──────────────┬────────────┬──────────────┬───────────┐
//! │ 0x55 0xAA │ CHUNK_NUM    │ CHUNK_SIZE │ DATA         │ XOR       │
//! │ 2B        │ 4B LE        │ 2B LE      │ 1–256B       │ 1B        │
//! └───────────┴──────────────┴────────────┴──────────────┴───────────┘
//! ```
//!
//! The transfer ends with the marker `0xAA 0x55` in place of a chunk magic.
//! The receiver answers with single-byte control codes.

use crate::checksum::xor8;

/// Magic opening every chunk
pub const CHUNK_MAGIC: [u8; 2] = [0x55, 0xAA];

/// Marker closing the transfer
pub const END_MARKER: [u8; 2] = [0xAA, 0x55];

/// Sent on entry and once the image is staged
pub const READY_ACK: [u8; 2] = [0xAA, 0x55];

/// Sent every [`PROGRESS_INTERVAL`] accepted chunks
pub const PROGRESS_ACK: u8 = 0xAA;

/// Prefix of an error report, followed by a [`BootCode`]
pub const ERROR_MARKER: u8 = 0xFF;

/// Largest data section of one chunk
pub const MAX_CHUNK_SIZE: usize = 256;

/// Accepted chunks between progress acks
pub const PROGRESS_INTERVAL: u32 = 10;

/// Chunk number and data size following the magic
pub const CHUNK_HEADER_LEN: usize = 6;

/// Result codes reported after [`ERROR_MARKER`] (and 0 after success)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum BootCode {
    Success = 0,
    Timeout = 1,
    InvalidMagic = 2,
    InvalidSize = 3,
    InvalidChunk = 4,
    Checksum = 5,
    FlashWrite = 6,
    FlashErase = 7,
    Unknown = 8,
    RomLookup = 9,
}

/// Fields following the chunk magic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChunkHeader {
    pub number: u32,
    pub size: u16,
}

impl ChunkHeader {
    pub fn parse(bytes: &[u8; CHUNK_HEADER_LEN]) -> Self {
        Self {
            number: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            size: u16::from_le_bytes([bytes[4], bytes[5]]),
        }
    }

    pub fn to_bytes(self) -> [u8; CHUNK_HEADER_LEN] {
        let n = self.number.to_le_bytes();
        let s = self.size.to_le_bytes();
        [n[0], n[1], n[2], n[3], s[0], s[1]]
    }
}

/// Encode one chunk (sender side and tests)
///
/// Returns the number of bytes written, or `None` if `data` is empty,
/// too large, or `out` is too small.
pub fn encode_chunk(number: u32, data: &[u8], out: &mut [u8]) -> Option<usize> {
    if data.is_empty() || data.len() > MAX_CHUNK_SIZE {
        return None;
    }
    let total = CHUNK_MAGIC.len() + CHUNK_HEADER_LEN + data.len() + 1;
    if out.len() < total {
        return None;
    }
    let header = ChunkHeader {
        number,
        size: data.len() as u16,
    };
    out[..2].copy_from_slice(&CHUNK_MAGIC);
    out[2..8].copy_from_slice(&header.to_bytes());
    out[8..8 + data.len()].copy_from_slice(data);
    out[8 + data.len()] = xor8(data);
    Some(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let header = ChunkHeader {
            number: 0x0102_0304,
            size: 256,
        };
        let bytes = header.to_bytes();
        assert_eq!(bytes, [0x04, 0x03, 0x02, 0x01, 0x00, 0x01]);
        assert_eq!(ChunkHeader::parse(&bytes), header);
    }

    #[test]
    fn test_encode_chunk() {
        let mut out = [0u8; 16];
        let n = encode_chunk(3, &[0x10, 0x01], &mut out).unwrap();
        assert_eq!(n, 11);
        assert_eq!(&out[..n], &[0x55, 0xAA, 3, 0, 0, 0, 2, 0, 0x10, 0x01, 0x11]);
    }

    #[test]
    fn test_encode_chunk_rejects_oversize() {
        let data = [0u8; MAX_CHUNK_SIZE + 1];
        let mut out = [0u8; 300];
        assert!(encode_chunk(0, &data, &mut out).is_none());
        assert!(encode_chunk(0, &[], &mut out).is_none());
    }
}
