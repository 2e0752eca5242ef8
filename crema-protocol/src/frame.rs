//! Packet framing for the control-board link.
//!
//! Packet format:
//! - START (1 byte): 0xAA synchronization byte
//! - TYPE (1 byte): message type identifier
//! - LENGTH (1 byte): payload length (0-56)
//! - SEQ (1 byte): sequence number, echoed by acknowledgements
//! - PAYLOAD (0-56 bytes): type-specific data
//! - CRC (2 bytes, little-endian): CRC-16/CCITT-FALSE of TYPE, LENGTH, SEQ
//!   and PAYLOAD

use heapless::Vec;

use crate::checksum::{crc16_ccitt, crc16_update};

/// Packet synchronization byte
pub const FRAME_START: u8 = 0xAA;

/// Maximum payload size in bytes
pub const MAX_PAYLOAD_SIZE: usize = 56;

/// Bytes around the payload: START, TYPE, LENGTH, SEQ and two CRC bytes
pub const FRAME_OVERHEAD: usize = 6;

/// Maximum complete packet size on the wire
pub const MAX_FRAME_SIZE: usize = FRAME_OVERHEAD + MAX_PAYLOAD_SIZE;

/// Errors that can occur during packet parsing or encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameError {
    /// Payload exceeds maximum allowed size
    PayloadTooLarge,
    /// Length byte out of range on receive
    InvalidLength,
    /// CRC mismatch
    InvalidChecksum,
    /// Buffer too small for encoding
    BufferTooSmall,
}

/// One protocol message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Message type identifier
    pub msg_type: u8,
    /// Sequence number
    pub seq: u8,
    /// Payload data
    pub payload: Vec<u8, MAX_PAYLOAD_SIZE>,
}

impl Packet {
    /// Create a new packet with the given message type and payload
    pub fn new(msg_type: u8, seq: u8, payload: &[u8]) -> Result<Self, FrameError> {
        let payload = Vec::from_slice(payload).map_err(|_| FrameError::PayloadTooLarge)?;
        Ok(Self {
            msg_type,
            seq,
            payload,
        })
    }

    /// Create a packet with no payload
    pub fn empty(msg_type: u8, seq: u8) -> Self {
        Self {
            msg_type,
            seq,
            payload: Vec::new(),
        }
    }

    /// CRC over the header fields and payload
    fn checksum(msg_type: u8, length: u8, seq: u8, payload: &[u8]) -> u16 {
        crc16_update(crc16_ccitt(&[msg_type, length, seq]), payload)
    }

    /// Number of bytes this packet occupies on the wire
    pub fn encoded_len(&self) -> usize {
        FRAME_OVERHEAD + self.payload.len()
    }

    /// Encode this packet into a byte buffer
    ///
    /// Returns the number of bytes written
    pub fn encode(&self, buffer: &mut [u8]) -> Result<usize, FrameError> {
        let frame_len = self.encoded_len();
        if buffer.len() < frame_len {
            return Err(FrameError::BufferTooSmall);
        }

        let length = self.payload.len() as u8;
        let crc = Self::checksum(self.msg_type, length, self.seq, &self.payload);
        let payload_end = 4 + self.payload.len();

        buffer[0] = FRAME_START;
        buffer[1] = self.msg_type;
        buffer[2] = length;
        buffer[3] = self.seq;
        buffer[4..payload_end].copy_from_slice(&self.payload);
        buffer[payload_end..frame_len].copy_from_slice(&crc.to_le_bytes());

        Ok(frame_len)
    }

    /// Encode this packet into a heapless Vec
    pub fn encode_to_vec(&self) -> Result<Vec<u8, MAX_FRAME_SIZE>, FrameError> {
        let mut buffer = [0u8; MAX_FRAME_SIZE];
        let len = self.encode(&mut buffer)?;
        Vec::from_slice(&buffer[..len]).map_err(|_| FrameError::BufferTooSmall)
    }
}

/// Receive counters kept by the parser
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ParserStats {
    /// Packets that passed the CRC check
    pub packets: u32,
    /// Packets dropped on CRC mismatch
    pub crc_errors: u32,
    /// Packets dropped on an out-of-range length byte
    pub length_errors: u32,
}

/// Byte-at-a-time receive state machine
#[derive(Debug, Clone)]
pub struct PacketParser {
    state: ParseState,
    buffer: Vec<u8, MAX_PAYLOAD_SIZE>,
    msg_type: u8,
    expected_length: u8,
    seq: u8,
    crc_low: u8,
    stats: ParserStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ParseState {
    /// Hunting for the START byte
    WaitStart,
    /// Got START, next byte is TYPE
    GotStart,
    /// Got TYPE, next byte is LENGTH
    GotType,
    /// Got LENGTH, next byte is SEQ
    GotLength,
    /// Reading payload bytes
    ReadingPayload,
    /// Reading the two CRC bytes
    ReadingCrc { have_low: bool },
}

impl Default for PacketParser {
    fn default() -> Self {
        Self::new()
    }
}

impl PacketParser {
    /// Create a new packet parser
    pub fn new() -> Self {
        Self {
            state: ParseState::WaitStart,
            buffer: Vec::new(),
            msg_type: 0,
            expected_length: 0,
            seq: 0,
            crc_low: 0,
            stats: ParserStats::default(),
        }
    }

    /// Reset the parser state (counters are kept)
    pub fn reset(&mut self) {
        self.state = ParseState::WaitStart;
        self.buffer.clear();
        self.msg_type = 0;
        self.expected_length = 0;
        self.seq = 0;
        self.crc_low = 0;
    }

    pub fn state(&self) -> ParseState {
        self.state
    }

    pub fn stats(&self) -> ParserStats {
        self.stats
    }

    /// Feed a single byte to the parser
    ///
    /// Returns `Ok(Some(packet))` when a complete valid packet is parsed,
    /// `Ok(None)` when more bytes are needed, or `Err` when the packet in
    /// progress was discarded. The parser is back in `WaitStart` after
    /// both a packet and an error.
    pub fn feed(&mut self, byte: u8) -> Result<Option<Packet>, FrameError> {
        match self.state {
            ParseState::WaitStart => {
                if byte == FRAME_START {
                    self.state = ParseState::GotStart;
                }
                Ok(None)
            }
            ParseState::GotStart => {
                self.msg_type = byte;
                self.state = ParseState::GotType;
                Ok(None)
            }
            ParseState::GotType => {
                if byte as usize > MAX_PAYLOAD_SIZE {
                    self.stats.length_errors = self.stats.length_errors.wrapping_add(1);
                    self.reset();
                    return Err(FrameError::InvalidLength);
                }
                self.expected_length = byte;
                self.state = ParseState::GotLength;
                Ok(None)
            }
            ParseState::GotLength => {
                self.seq = byte;
                self.buffer.clear();
                self.state = if self.expected_length == 0 {
                    ParseState::ReadingCrc { have_low: false }
                } else {
                    ParseState::ReadingPayload
                };
                Ok(None)
            }
            ParseState::ReadingPayload => {
                // Cannot overflow: expected_length was bounded above
                let _ = self.buffer.push(byte);
                if self.buffer.len() == self.expected_length as usize {
                    self.state = ParseState::ReadingCrc { have_low: false };
                }
                Ok(None)
            }
            ParseState::ReadingCrc { have_low: false } => {
                self.crc_low = byte;
                self.state = ParseState::ReadingCrc { have_low: true };
                Ok(None)
            }
            ParseState::ReadingCrc { have_low: true } => {
                let received = u16::from_le_bytes([self.crc_low, byte]);
                let expected = Packet::checksum(
                    self.msg_type,
                    self.expected_length,
                    self.seq,
                    &self.buffer,
                );

                if received != expected {
                    self.stats.crc_errors = self.stats.crc_errors.wrapping_add(1);
                    self.reset();
                    return Err(FrameError::InvalidChecksum);
                }

                let packet = Packet {
                    msg_type: self.msg_type,
                    seq: self.seq,
                    payload: self.buffer.clone(),
                };

                self.stats.packets = self.stats.packets.wrapping_add(1);
                self.reset();
                Ok(Some(packet))
            }
        }
    }

    /// Feed multiple bytes to the parser
    ///
    /// Returns the first complete packet found, if any.
    /// Remaining bytes after a complete packet are not consumed.
    pub fn feed_bytes(&mut self, bytes: &[u8]) -> Result<Option<Packet>, FrameError> {
        for &byte in bytes {
            if let Some(packet) = self.feed(byte)? {
                return Ok(Some(packet));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    extern crate std;
    use std::vec::Vec as StdVec;

    /// Feed everything, collecting packets and ignoring errors
    fn decode_all(parser: &mut PacketParser, bytes: &[u8]) -> StdVec<Packet> {
        bytes
            .iter()
            .filter_map(|&b| parser.feed(b).ok().flatten())
            .collect()
    }

    #[test]
    fn test_encode_empty_payload() {
        let packet = Packet::empty(0x01, 7);
        let mut buffer = [0u8; 10];
        let len = packet.encode(&mut buffer).unwrap();

        assert_eq!(len, 6);
        assert_eq!(buffer[0], FRAME_START);
        assert_eq!(buffer[1], 0x01); // type
        assert_eq!(buffer[2], 0); // length
        assert_eq!(buffer[3], 7); // seq
        let crc = crc16_ccitt(&[0x01, 0, 7]);
        assert_eq!(&buffer[4..6], &crc.to_le_bytes());
    }

    #[test]
    fn test_encode_buffer_too_small() {
        let packet = Packet::new(0x10, 0, &[0, 0x3A, 0x03]).unwrap();
        let mut buffer = [0u8; 8];
        assert_eq!(packet.encode(&mut buffer), Err(FrameError::BufferTooSmall));
    }

    #[test]
    fn test_roundtrip_max_payload() {
        let payload = [0x5Au8; MAX_PAYLOAD_SIZE];
        let original = Packet::new(0x81, 200, &payload).unwrap();
        let encoded = original.encode_to_vec().unwrap();
        assert_eq!(encoded.len(), MAX_FRAME_SIZE);

        let mut parser = PacketParser::new();
        let parsed = parser.feed_bytes(&encoded).unwrap().unwrap();
        assert_eq!(parsed, original);
        assert_eq!(parser.state(), ParseState::WaitStart);
    }

    #[test]
    fn test_payload_too_large() {
        let large_payload = [0u8; MAX_PAYLOAD_SIZE + 1];
        let result = Packet::new(0x81, 0, &large_payload);
        assert_eq!(result, Err(FrameError::PayloadTooLarge));
    }

    #[test]
    fn test_parser_invalid_checksum() {
        let packet = Packet::new(0x10, 3, &[0, 0x3A, 0x03]).unwrap();
        let mut encoded = packet.encode_to_vec().unwrap();
        let last_idx = encoded.len() - 1;
        encoded[last_idx] ^= 0xFF;

        let mut parser = PacketParser::new();
        assert_eq!(parser.feed_bytes(&encoded), Err(FrameError::InvalidChecksum));
        assert_eq!(parser.state(), ParseState::WaitStart);
        assert_eq!(parser.stats().crc_errors, 1);
    }

    #[test]
    fn test_parser_rejects_oversized_length() {
        let mut parser = PacketParser::new();
        assert_eq!(parser.feed(FRAME_START), Ok(None));
        assert_eq!(parser.feed(0x10), Ok(None));
        assert_eq!(parser.feed(57), Err(FrameError::InvalidLength));
        assert_eq!(parser.state(), ParseState::WaitStart);
        assert_eq!(parser.stats().length_errors, 1);
    }

    #[test]
    fn test_parser_resync_after_garbage() {
        let packet = Packet::empty(0x01, 1);
        let encoded = packet.encode_to_vec().unwrap();

        let mut data = StdVec::from([0x00, 0xFF, 0x12, 0x34]);
        data.extend_from_slice(&encoded);

        let mut parser = PacketParser::new();
        let parsed = parser.feed_bytes(&data).unwrap().unwrap();
        assert_eq!(parsed.msg_type, 0x01);
    }

    #[test]
    fn test_shorter_length_corruption_drops_only_the_damaged_packet() {
        let first = Packet::new(0x10, 1, &[0x00, 0x3A, 0x03]).unwrap();
        let second = Packet::new(0x12, 2, &[0x01]).unwrap();

        let mut stream = StdVec::new();
        stream.extend_from_slice(&first.encode_to_vec().unwrap());
        stream[2] = 1; // claimed length shorter than actual
        stream.extend_from_slice(&second.encode_to_vec().unwrap());

        let mut parser = PacketParser::new();
        let packets = decode_all(&mut parser, &stream);
        assert_eq!(packets.last(), Some(&second));
        assert_eq!(parser.state(), ParseState::WaitStart);
    }

    fn arb_packet() -> impl Strategy<Value = Packet> {
        (
            any::<u8>(),
            any::<u8>(),
            proptest::collection::vec(any::<u8>(), 0..=MAX_PAYLOAD_SIZE),
        )
            .prop_map(|(t, s, p)| Packet::new(t, s, &p).unwrap())
    }

    /// Long enough that an overlong length read ends inside it
    fn arb_full_packet() -> impl Strategy<Value = Packet> {
        (
            any::<u8>(),
            any::<u8>(),
            proptest::collection::vec(any::<u8>(), MAX_PAYLOAD_SIZE),
        )
            .prop_map(|(t, s, p)| Packet::new(t, s, &p).unwrap())
    }

    /// Encoded bytes where only the START byte equals the sync value
    fn sync_only_at_start(bytes: &[u8]) -> bool {
        bytes[1..].iter().all(|&b| b != FRAME_START)
    }

    proptest! {
        #[test]
        fn prop_roundtrip(packet in arb_packet()) {
            let encoded = packet.encode_to_vec().unwrap();
            let mut parser = PacketParser::new();
            let parsed = parser.feed_bytes(&encoded).unwrap();
            prop_assert_eq!(parsed, Some(packet));
        }

        #[test]
        fn prop_resync_after_corrupted_crc(
            first in arb_packet(),
            second in arb_packet(),
            flip in 1u8..=255,
            hi in any::<bool>(),
        ) {
            let mut a = first.encode_to_vec().unwrap();
            let b = second.encode_to_vec().unwrap();
            prop_assume!(sync_only_at_start(&a));

            let idx = if hi { a.len() - 1 } else { a.len() - 2 };
            a[idx] ^= flip;
            prop_assume!(a[idx] != FRAME_START);

            let mut parser = PacketParser::new();
            let mut stream = StdVec::from(a.as_slice());
            stream.extend_from_slice(&b);
            let packets = decode_all(&mut parser, &stream);
            prop_assert_eq!(packets, StdVec::from([second]));
        }

        #[test]
        fn prop_resync_after_corrupted_length(
            first in arb_packet(),
            second in arb_full_packet(),
            third in arb_packet(),
            bad_len in any::<u8>(),
        ) {
            let mut a = first.encode_to_vec().unwrap();
            let b = second.encode_to_vec().unwrap();
            let c = third.encode_to_vec().unwrap();
            prop_assume!(sync_only_at_start(&a));
            prop_assume!(sync_only_at_start(&b));
            prop_assume!(sync_only_at_start(&c));
            prop_assume!(bad_len != a[2] && bad_len != FRAME_START);
            a[2] = bad_len;

            let mut stream = StdVec::from(a.as_slice());
            stream.extend_from_slice(&b);
            stream.extend_from_slice(&c);

            let mut parser = PacketParser::new();
            let packets = decode_all(&mut parser, &stream);
            // At most one good packet is lost to the damaged one
            prop_assert_eq!(packets.last(), Some(&third));
            prop_assert_eq!(parser.state(), ParseState::WaitStart);
        }
    }
}
