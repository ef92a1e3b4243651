use std::time::Instant;

use crate::types::AudioFormat;

use super::header::{RtpHeader, RtpParseError};

/// A successfully parsed RTP audio packet, borrowing the datagram
#[derive(Debug)]
pub struct ParsedPacket<'a> {
    /// Sequence number
    pub sequence: u16,
    /// RTP timestamp
    pub timestamp: u32,
    /// Synchronization source
    pub ssrc: u32,
    /// Marker bit
    pub marker: bool,
    /// Interleaved PCM payload
    pub payload: &'a [u8],
}

/// Counters maintained across a receive session
#[derive(Debug, Default, Clone)]
pub struct DepacketizerStats {
    /// Packets accepted
    pub packets: u64,
    /// Payload bytes accepted
    pub bytes: u64,
    /// Packets lost, by sequence gap
    pub lost: u64,
    /// Packets that arrived after a later sequence
    pub out_of_order: u64,
    /// Datagrams rejected by the parser
    pub malformed: u64,
    /// RFC 3550 interarrival jitter estimate in milliseconds
    pub jitter_ms: f64,
    /// Sequence of the most recent accepted packet
    pub last_sequence: u16,
    /// Timestamp of the most recent accepted packet
    pub last_timestamp: u32,
}

/// Receiver-side RTP parser with loss, reorder and jitter accounting
///
/// Sequence accounting follows the highest sequence seen: a positive gap
/// counts the missing packets as lost, and a late packet that fills such a
/// gap reverses one loss and counts as out-of-order, so the steady-state
/// numbers reflect what actually went missing.
pub struct Depacketizer {
    bytes_per_frame: usize,
    sample_rate: u32,
    prev_sequence: Option<u16>,
    prev_arrival: Option<Instant>,
    prev_timestamp: u32,
    stats: DepacketizerStats,
}

impl Depacketizer {
    /// Create a depacketizer for a stream in `format`
    #[must_use]
    pub fn new(format: AudioFormat) -> Self {
        Self {
            bytes_per_frame: format.bytes_per_frame().max(1),
            sample_rate: format.sample_rate.max(1),
            prev_sequence: None,
            prev_arrival: None,
            prev_timestamp: 0,
            stats: DepacketizerStats::default(),
        }
    }

    /// Parse a received UDP datagram
    ///
    /// # Errors
    ///
    /// Returns `RtpParseError` for short datagrams, wrong version, truncated
    /// extension headers, or payloads that are not whole audio frames.
    /// Failures are counted in [`DepacketizerStats::malformed`].
    pub fn parse<'a>(&mut self, datagram: &'a [u8]) -> Result<ParsedPacket<'a>, RtpParseError> {
        self.parse_at(datagram, Instant::now())
    }

    /// Parse with an explicit arrival instant (used by tests and replay)
    ///
    /// # Errors
    ///
    /// See [`Depacketizer::parse`].
    pub fn parse_at<'a>(
        &mut self,
        datagram: &'a [u8],
        arrival: Instant,
    ) -> Result<ParsedPacket<'a>, RtpParseError> {
        match self.parse_inner(datagram) {
            Ok(packet) => {
                self.account(packet.sequence, packet.timestamp, arrival);
                self.stats.packets += 1;
                self.stats.bytes += packet.payload.len() as u64;
                Ok(packet)
            }
            Err(e) => {
                self.stats.malformed += 1;
                Err(e)
            }
        }
    }

    fn parse_inner<'a>(&self, datagram: &'a [u8]) -> Result<ParsedPacket<'a>, RtpParseError> {
        let header = RtpHeader::decode(datagram)?;

        let mut header_size = RtpHeader::SIZE + usize::from(header.csrc_count) * 4;
        if header.extension {
            // 16-bit defined-by, 16-bit length in 32-bit words, then the
            // words themselves. The profile is not validated; AES67 audio
            // does not carry extensions, so unknown ones are skipped.
            if datagram.len() < header_size + 4 {
                return Err(RtpParseError::TruncatedExtension);
            }
            let ext_words =
                usize::from(u16::from_be_bytes([datagram[header_size + 2], datagram[header_size + 3]]));
            header_size += 4 + ext_words * 4;
        }

        if datagram.len() <= header_size {
            return Err(RtpParseError::EmptyPayload);
        }

        let payload = &datagram[header_size..];
        if payload.len() % self.bytes_per_frame != 0 {
            return Err(RtpParseError::PartialFrame {
                len: payload.len(),
                frame: self.bytes_per_frame,
            });
        }

        Ok(ParsedPacket {
            sequence: header.sequence,
            timestamp: header.timestamp,
            ssrc: header.ssrc,
            marker: header.marker,
            payload,
        })
    }

    fn account(&mut self, sequence: u16, timestamp: u32, arrival: Instant) {
        if let Some(prev) = self.prev_sequence {
            #[allow(clippy::cast_possible_wrap)]
            let delta = sequence.wrapping_sub(prev).wrapping_sub(1) as i16;
            match delta {
                1.. => {
                    self.stats.lost += u64::from(delta.unsigned_abs());
                    self.prev_sequence = Some(sequence);
                }
                0 => {
                    self.prev_sequence = Some(sequence);
                }
                -1 => {
                    // Same sequence again; the jitter buffer drops it.
                }
                _ => {
                    // Late arrival filling an earlier gap: it was counted
                    // lost when the gap was seen.
                    self.stats.out_of_order += 1;
                    self.stats.lost = self.stats.lost.saturating_sub(1);
                }
            }
        } else {
            // First packet of a session initializes the baseline without
            // accounting.
            self.prev_sequence = Some(sequence);
        }

        if let Some(prev_arrival) = self.prev_arrival {
            let arrival_delta_ms = arrival.duration_since(prev_arrival).as_secs_f64() * 1000.0;
            #[allow(clippy::cast_possible_wrap)]
            let ts_delta = timestamp.wrapping_sub(self.prev_timestamp) as i32;
            let expected_ms = f64::from(ts_delta) * 1000.0 / f64::from(self.sample_rate);
            let d = (arrival_delta_ms - expected_ms).abs();
            self.stats.jitter_ms += (d - self.stats.jitter_ms) / 16.0;
        }
        self.prev_arrival = Some(arrival);
        self.prev_timestamp = timestamp;
        self.stats.last_sequence = sequence;
        self.stats.last_timestamp = timestamp;
    }

    /// Session counters
    #[must_use]
    pub fn stats(&self) -> &DepacketizerStats {
        &self.stats
    }

    /// Forget the session baseline and zero the counters
    pub fn reset(&mut self) {
        self.prev_sequence = None;
        self.prev_arrival = None;
        self.prev_timestamp = 0;
        self.stats = DepacketizerStats::default();
    }
}
