use thiserror::Error;

/// RTP header (RFC 3550), fixed 12-byte part
///
/// All multi-byte fields are big-endian on the wire. AES67 payload types
/// are dynamic (96-127), so the field stays a raw `u8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtpHeader {
    /// Version (2 bits, always 2)
    pub version: u8,
    /// Padding flag
    pub padding: bool,
    /// Extension flag
    pub extension: bool,
    /// CSRC count (4 bits)
    pub csrc_count: u8,
    /// Marker bit
    pub marker: bool,
    /// Payload type (7 bits)
    pub payload_type: u8,
    /// Sequence number (16 bits)
    pub sequence: u16,
    /// Timestamp (32 bits)
    pub timestamp: u32,
    /// Synchronization source ID (32 bits)
    pub ssrc: u32,
}

impl RtpHeader {
    /// Fixed RTP header size
    pub const SIZE: usize = 12;

    /// Create an AES67 audio packet header
    #[must_use]
    pub fn new_audio(payload_type: u8, sequence: u16, timestamp: u32, ssrc: u32) -> Self {
        Self {
            version: 2,
            padding: false,
            extension: false,
            csrc_count: 0,
            marker: false,
            payload_type,
            sequence,
            timestamp,
            ssrc,
        }
    }

    /// Encode header to bytes
    #[must_use]
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];

        // Byte 0: V(2) | P(1) | X(1) | CC(4)
        buf[0] = (self.version << 6)
            | (u8::from(self.padding) << 5)
            | (u8::from(self.extension) << 4)
            | (self.csrc_count & 0x0F);

        // Byte 1: M(1) | PT(7)
        buf[1] = (u8::from(self.marker) << 7) | (self.payload_type & 0x7F);

        buf[2..4].copy_from_slice(&self.sequence.to_be_bytes());
        buf[4..8].copy_from_slice(&self.timestamp.to_be_bytes());
        buf[8..12].copy_from_slice(&self.ssrc.to_be_bytes());

        buf
    }

    /// Decode the fixed header from the start of a datagram
    ///
    /// # Errors
    ///
    /// Returns `RtpParseError` if the buffer is too small or the version is
    /// not 2.
    pub fn decode(buf: &[u8]) -> Result<Self, RtpParseError> {
        if buf.len() < Self::SIZE {
            return Err(RtpParseError::TooShort(buf.len()));
        }

        let version = (buf[0] >> 6) & 0x03;
        if version != 2 {
            return Err(RtpParseError::InvalidVersion(version));
        }

        Ok(Self {
            version,
            padding: (buf[0] >> 5) & 0x01 != 0,
            extension: (buf[0] >> 4) & 0x01 != 0,
            csrc_count: buf[0] & 0x0F,
            marker: (buf[1] >> 7) & 0x01 != 0,
            payload_type: buf[1] & 0x7F,
            sequence: u16::from_be_bytes([buf[2], buf[3]]),
            timestamp: u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
            ssrc: u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]),
        })
    }
}

/// RTP parsing errors
#[derive(Debug, Error)]
pub enum RtpParseError {
    /// Datagram shorter than the fixed header
    #[error("datagram too short: {0} bytes")]
    TooShort(usize),

    /// Version field is not 2
    #[error("invalid RTP version: {0}")]
    InvalidVersion(u8),

    /// Extension header length field points past the datagram
    #[error("truncated extension header")]
    TruncatedExtension,

    /// Nothing left after the headers
    #[error("empty payload")]
    EmptyPayload,

    /// Payload is not a whole number of audio frames
    #[error("payload of {len} bytes is not a multiple of the {frame} byte frame size")]
    PartialFrame {
        /// Payload length in bytes
        len: usize,
        /// Frame size in bytes
        frame: usize,
    },
}
