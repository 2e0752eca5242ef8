//! Settings blob encoding
//!
//! Layout: `magic:u32 | version:u16 | len:u16 | postcard body | crc32:u32`,
//! all little-endian. The CRC covers everything before it.

use crema_hal::FlashError;
use crema_protocol::checksum::crc32;

use super::settings::Settings;

/// "ECMC"
pub const SETTINGS_MAGIC: u32 = 0x4543_4D43;
pub const SETTINGS_VERSION: u16 = 1;
pub const HEADER_LEN: usize = 8;
pub const TRAILER_LEN: usize = 4;
/// Largest blob the store has to hold
pub const MAX_BLOB_SIZE: usize = 256;

/// Persistence errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Store access failed
    Flash(FlashError),
    /// Settings did not fit the buffer
    Encode,
    /// Body did not deserialize
    Decode,
    BadMagic,
    BadVersion(u16),
    Checksum,
    /// Decoded fine but fields out of range
    Invalid,
}

impl From<FlashError> for ConfigError {
    fn from(e: FlashError) -> Self {
        ConfigError::Flash(e)
    }
}

/// Encode settings into `buf`, returning the blob length
pub fn encode(settings: &Settings, buf: &mut [u8]) -> Result<usize, ConfigError> {
    if buf.len() < HEADER_LEN + TRAILER_LEN {
        return Err(ConfigError::Encode);
    }
    let body_end = buf.len() - TRAILER_LEN;
    let body_len = postcard::to_slice(settings, &mut buf[HEADER_LEN..body_end])
        .map_err(|_| ConfigError::Encode)?
        .len();
    let len = u16::try_from(body_len).map_err(|_| ConfigError::Encode)?;

    buf[0..4].copy_from_slice(&SETTINGS_MAGIC.to_le_bytes());
    buf[4..6].copy_from_slice(&SETTINGS_VERSION.to_le_bytes());
    buf[6..8].copy_from_slice(&len.to_le_bytes());

    let crc_at = HEADER_LEN + body_len;
    let crc = crc32(&buf[..crc_at]);
    buf[crc_at..crc_at + TRAILER_LEN].copy_from_slice(&crc.to_le_bytes());
    Ok(crc_at + TRAILER_LEN)
}

/// Decode and verify a stored blob
pub fn decode(blob: &[u8]) -> Result<Settings, ConfigError> {
    if blob.len() < HEADER_LEN + TRAILER_LEN {
        return Err(ConfigError::Decode);
    }
    let magic = u32::from_le_bytes([blob[0], blob[1], blob[2], blob[3]]);
    if magic != SETTINGS_MAGIC {
        return Err(ConfigError::BadMagic);
    }
    let version = u16::from_le_bytes([blob[4], blob[5]]);
    if version != SETTINGS_VERSION {
        return Err(ConfigError::BadVersion(version));
    }
    let body_len = u16::from_le_bytes([blob[6], blob[7]]) as usize;
    let crc_at = HEADER_LEN + body_len;
    if blob.len() < crc_at + TRAILER_LEN {
        return Err(ConfigError::Decode);
    }

    let stored = u32::from_le_bytes([
        blob[crc_at],
        blob[crc_at + 1],
        blob[crc_at + 2],
        blob[crc_at + 3],
    ]);
    if crc32(&blob[..crc_at]) != stored {
        return Err(ConfigError::Checksum);
    }

    let settings: Settings =
        postcard::from_bytes(&blob[HEADER_LEN..crc_at]).map_err(|_| ConfigError::Decode)?;
    if !settings.validate() {
        return Err(ConfigError::Invalid);
    }
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::profile::fixtures::DUAL;
    use crate::control::electrical::EnvironmentalConfig;
    use crate::control::strategy::HeatingStrategy;

    fn configured() -> Settings {
        let mut settings = Settings::defaults(&DUAL);
        settings.env = EnvironmentalConfig::new(230, 160);
        settings.strategy = HeatingStrategy::SmartStagger;
        settings.cleaning_count = 42;
        settings
    }

    #[test]
    fn test_encode_decode() {
        let settings = configured();
        let mut buf = [0u8; MAX_BLOB_SIZE];
        let len = encode(&settings, &mut buf).unwrap();
        assert_eq!(&buf[0..4], &SETTINGS_MAGIC.to_le_bytes());
        assert_eq!(decode(&buf[..len]).unwrap(), settings);
    }

    #[test]
    fn test_corrupt_body_detected() {
        let mut buf = [0u8; MAX_BLOB_SIZE];
        let len = encode(&configured(), &mut buf).unwrap();
        buf[HEADER_LEN + 2] ^= 0x40;
        assert_eq!(decode(&buf[..len]), Err(ConfigError::Checksum));
    }

    #[test]
    fn test_wrong_magic_and_version() {
        let mut buf = [0u8; MAX_BLOB_SIZE];
        let len = encode(&configured(), &mut buf).unwrap();

        let mut bad = buf;
        bad[0] = 0;
        assert_eq!(decode(&bad[..len]), Err(ConfigError::BadMagic));

        let mut bad = buf;
        bad[4] = 7;
        assert_eq!(decode(&bad[..len]), Err(ConfigError::BadVersion(7)));
    }

    #[test]
    fn test_truncated_blob() {
        let mut buf = [0u8; MAX_BLOB_SIZE];
        let len = encode(&configured(), &mut buf).unwrap();
        assert_eq!(decode(&buf[..len - 1]), Err(ConfigError::Decode));
        assert_eq!(decode(&[]), Err(ConfigError::Decode));
    }

    #[test]
    fn test_buffer_too_small() {
        let mut buf = [0u8; 16];
        assert_eq!(encode(&configured(), &mut buf), Err(ConfigError::Encode));
    }
}
