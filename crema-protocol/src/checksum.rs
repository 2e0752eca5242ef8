//! Checksums used on the link and in flash
//!
//! - CRC-16/CCITT-FALSE guards every link packet
//! - CRC-32 (IEEE, reflected) guards the persisted settings blob and is
//!   logged over a staged firmware image
//! - XOR-8 is the per-chunk check of the bootloader sub-protocol

const CRC16_POLY: u16 = 0x1021;
const CRC16_INIT: u16 = 0xFFFF;

const CRC32_POLY: u32 = 0xEDB8_8320;

/// CRC-16/CCITT-FALSE over `data`
pub fn crc16_ccitt(data: &[u8]) -> u16 {
    crc16_update(CRC16_INIT, data)
}

/// Continue a CRC-16/CCITT-FALSE computation
pub fn crc16_update(mut crc: u16, data: &[u8]) -> u16 {
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ CRC16_POLY
            } else {
                crc << 1
            };
        }
    }
    crc
}

/// Streaming CRC-32 (IEEE 802.3, reflected)
///
/// Bitwise rather than table driven; the inputs are a few kilobytes of
/// settings or a one-off pass over a staged image.
#[derive(Debug, Clone, Copy)]
pub struct Crc32 {
    state: u32,
}

impl Default for Crc32 {
    fn default() -> Self {
        Self::new()
    }
}

impl Crc32 {
    pub const fn new() -> Self {
        Self { state: 0xFFFF_FFFF }
    }

    pub fn update(&mut self, data: &[u8]) {
        for &byte in data {
            self.state ^= byte as u32;
            for _ in 0..8 {
                let mask = (self.state & 1).wrapping_neg();
                self.state = (self.state >> 1) ^ (CRC32_POLY & mask);
            }
        }
    }

    pub fn finish(self) -> u32 {
        !self.state
    }
}

/// One-shot CRC-32 over `data`
pub fn crc32(data: &[u8]) -> u32 {
    let mut crc = Crc32::new();
    crc.update(data);
    crc.finish()
}

/// XOR of all bytes
pub fn xor8(data: &[u8]) -> u8 {
    data.iter().fold(0, |acc, &b| acc ^ b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc16_check_value() {
        // Standard check input for CRC-16/CCITT-FALSE
        assert_eq!(crc16_ccitt(b"123456789"), 0x29B1);
    }

    #[test]
    fn test_crc16_streaming_matches_one_shot() {
        let first = crc16_update(CRC16_INIT, b"1234");
        assert_eq!(crc16_update(first, b"56789"), crc16_ccitt(b"123456789"));
    }

    #[test]
    fn test_crc32_check_value() {
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn test_crc32_empty() {
        assert_eq!(crc32(&[]), 0);
    }

    #[test]
    fn test_crc32_streaming_matches_one_shot() {
        let mut crc = Crc32::new();
        crc.update(b"12345");
        crc.update(b"6789");
        assert_eq!(crc.finish(), crc32(b"123456789"));
    }

    #[test]
    fn test_xor8() {
        assert_eq!(xor8(&[]), 0);
        assert_eq!(xor8(&[0x55, 0xAA]), 0xFF);
        assert_eq!(xor8(&[0x12, 0x12]), 0);
    }
}
