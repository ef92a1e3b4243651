//! Audio format and packet-time definitions

use serde::{Deserialize, Serialize};

/// Linear-PCM audio format of a stream
///
/// Fields are kept as raw integers so that values parsed from SDP can be
/// represented before profile validation; [`AudioFormat::is_aes67`] checks
/// conformance with the AES67 interoperability profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AudioFormat {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Channel count (interleaved)
    pub channels: u8,
    /// Bits per sample (16, 24 or 32)
    pub bit_depth: u8,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            channels: 2,
            bit_depth: 24,
        }
    }
}

impl AudioFormat {
    /// Create a new audio format
    #[must_use]
    pub fn new(sample_rate: u32, channels: u8, bit_depth: u8) -> Self {
        Self {
            sample_rate,
            channels,
            bit_depth,
        }
    }

    /// An all-zero format, the state before anything has been negotiated
    #[must_use]
    pub fn empty() -> Self {
        Self {
            sample_rate: 0,
            channels: 0,
            bit_depth: 0,
        }
    }

    /// Bytes per sample for one channel
    #[must_use]
    pub fn bytes_per_sample(self) -> usize {
        usize::from(self.bit_depth) / 8
    }

    /// Bytes per frame (one sample across all channels)
    #[must_use]
    pub fn bytes_per_frame(self) -> usize {
        self.bytes_per_sample() * usize::from(self.channels)
    }

    /// RTP encoding name for this bit depth (`L16`, `L24`, `L32`)
    #[must_use]
    pub fn encoding_name(self) -> Option<&'static str> {
        match self.bit_depth {
            16 => Some("L16"),
            24 => Some("L24"),
            32 => Some("L32"),
            _ => None,
        }
    }

    /// Bit depth for an RTP encoding name
    #[must_use]
    pub fn bit_depth_for_encoding(name: &str) -> Option<u8> {
        match name {
            "L16" => Some(16),
            "L24" => Some(24),
            "L32" => Some(32),
            _ => None,
        }
    }

    /// Basic structural validity: non-zero rate, 1-64 channels, known depth
    #[must_use]
    pub fn is_valid(self) -> bool {
        self.sample_rate > 0
            && (1..=64).contains(&self.channels)
            && matches!(self.bit_depth, 16 | 24 | 32)
    }

    /// AES67 profile conformance: rate in {44100, 48000, 96000} on top of
    /// structural validity
    #[must_use]
    pub fn is_aes67(self) -> bool {
        self.is_valid() && matches!(self.sample_rate, 44_100 | 48_000 | 96_000)
    }
}

impl std::fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}ch {}Hz {}bit",
            self.channels, self.sample_rate, self.bit_depth
        )
    }
}

/// AES67 packet time: the interval between successive RTP packets
///
/// 1 ms is the AES67-mandatory value; the others are the optional values the
/// standard enumerates. 333 µs is the conventional spelling of 1/3 ms and is
/// treated as that exact rational, so it divides 48 kHz and 96 kHz evenly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PacketTime {
    /// 125 µs
    Us125,
    /// 250 µs
    Us250,
    /// 333 µs (exactly 1/3 ms)
    Us333,
    /// 1 ms, the AES67 default
    #[default]
    Us1000,
    /// 4 ms
    Us4000,
}

impl PacketTime {
    /// Parse from a microsecond value
    #[must_use]
    pub fn from_micros(us: u32) -> Option<Self> {
        match us {
            125 => Some(Self::Us125),
            250 => Some(Self::Us250),
            333 => Some(Self::Us333),
            1000 => Some(Self::Us1000),
            4000 => Some(Self::Us4000),
            _ => None,
        }
    }

    /// Nominal duration in microseconds
    #[must_use]
    pub fn as_micros(self) -> u32 {
        match self {
            Self::Us125 => 125,
            Self::Us250 => 250,
            Self::Us333 => 333,
            Self::Us1000 => 1000,
            Self::Us4000 => 4000,
        }
    }

    /// Packets per second, as the exact denominator of the packet period
    #[must_use]
    pub fn packets_per_second(self) -> u32 {
        match self {
            Self::Us125 => 8000,
            Self::Us250 => 4000,
            Self::Us333 => 3000,
            Self::Us1000 => 1000,
            Self::Us4000 => 250,
        }
    }

    /// Samples per packet at `sample_rate`, as an exact rational
    /// `(whole, remainder_numerator, denominator)`
    ///
    /// The remainder is zero whenever the packet time divides the sample rate
    /// evenly; at 44.1 kHz with sub-millisecond packet times it is not, and
    /// the packetizer carries the fraction forward across packets.
    #[must_use]
    pub fn samples_per_packet(self, sample_rate: u32) -> (u32, u32, u32) {
        let den = self.packets_per_second();
        (sample_rate / den, sample_rate % den, den)
    }

    /// Whether the sample count per packet is a whole number at `sample_rate`
    #[must_use]
    pub fn is_integral(self, sample_rate: u32) -> bool {
        sample_rate % self.packets_per_second() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_geometry() {
        let f = AudioFormat::new(48_000, 2, 24);
        assert_eq!(f.bytes_per_sample(), 3);
        assert_eq!(f.bytes_per_frame(), 6);
        assert_eq!(f.encoding_name(), Some("L24"));
    }

    #[test]
    fn test_encoding_round_trip() {
        for depth in [16u8, 24, 32] {
            let name = AudioFormat::new(48_000, 2, depth).encoding_name().unwrap();
            assert_eq!(AudioFormat::bit_depth_for_encoding(name), Some(depth));
        }
        assert_eq!(AudioFormat::bit_depth_for_encoding("AM824"), None);
    }

    #[test]
    fn test_profile_check() {
        assert!(AudioFormat::new(48_000, 2, 24).is_aes67());
        assert!(AudioFormat::new(44_100, 64, 16).is_aes67());
        assert!(!AudioFormat::new(88_200, 2, 24).is_aes67());
        assert!(!AudioFormat::new(48_000, 0, 24).is_valid());
        assert!(!AudioFormat::new(48_000, 2, 20).is_valid());
        assert!(!AudioFormat::empty().is_valid());
    }

    #[test]
    fn test_packet_time_samples() {
        assert_eq!(PacketTime::Us1000.samples_per_packet(48_000), (48, 0, 1000));
        assert_eq!(PacketTime::Us125.samples_per_packet(48_000), (6, 0, 8000));
        // 333 us is exactly 1/3 ms
        assert_eq!(PacketTime::Us333.samples_per_packet(48_000), (16, 0, 3000));
        assert_eq!(PacketTime::Us333.samples_per_packet(96_000), (32, 0, 3000));
        // 44.1 kHz / 3000 = 14.7: fractional
        assert_eq!(
            PacketTime::Us333.samples_per_packet(44_100),
            (14, 2100, 3000)
        );
        assert!(!PacketTime::Us333.is_integral(44_100));
        assert!(PacketTime::Us1000.is_integral(44_100));
    }

    #[test]
    fn test_packet_time_from_micros() {
        assert_eq!(PacketTime::from_micros(1000), Some(PacketTime::Us1000));
        assert_eq!(PacketTime::from_micros(500), None);
        assert_eq!(PacketTime::default(), PacketTime::Us1000);
    }
}
