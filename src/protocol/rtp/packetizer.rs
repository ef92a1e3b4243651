use bytes::{Buf, BufMut, BytesMut};

use crate::error::{Aes67Error, Result};
use crate::types::{AudioFormat, PacketTime};

use super::header::RtpHeader;

/// Sender-side packetizer: splits captured PCM into AES67 RTP packets
///
/// Capture bytes accumulate in a residual buffer until a whole packet of
/// `samples_per_packet` frames is available, then each packet is stamped
/// with the next sequence number and timestamp and handed to the caller as
/// wire bytes. At 44.1 kHz with sub-millisecond packet times the sample
/// count per packet is fractional; the remainder is carried across packets
/// so the long-run cadence matches the nominal rate.
pub struct Packetizer {
    ssrc: u32,
    payload_type: u8,
    sequence: u16,
    timestamp: u32,
    timestamp_primed: bool,
    base_samples: u32,
    frac_num: u32,
    frac_den: u32,
    frac_acc: u32,
    bytes_per_frame: usize,
    residual: BytesMut,
    packet: BytesMut,
    max_residual: usize,
    underruns: u64,
}

impl Packetizer {
    /// Residual bound, in packets of capture data
    const MAX_RESIDUAL_PACKETS: usize = 2;

    /// Create a packetizer for the given stream parameters
    ///
    /// SSRC and the initial sequence number are drawn from the thread RNG;
    /// both stay fixed for the lifetime of the stream.
    ///
    /// # Errors
    ///
    /// Returns `ConfigInvalid` when the packet time does not yield a whole
    /// sample count at a 48/96 kHz rate, or the format is invalid.
    pub fn new(format: AudioFormat, packet_time: PacketTime, payload_type: u8) -> Result<Self> {
        if !format.is_valid() {
            return Err(Aes67Error::ConfigInvalid {
                name: "format".to_string(),
                message: format!("{format} is not a valid stream format"),
            });
        }
        if format.sample_rate != 44_100 && !packet_time.is_integral(format.sample_rate) {
            return Err(Aes67Error::ConfigInvalid {
                name: "packet_time".to_string(),
                message: format!(
                    "{} us does not yield a whole sample count at {} Hz",
                    packet_time.as_micros(),
                    format.sample_rate
                ),
            });
        }

        let (base, num, den) = packet_time.samples_per_packet(format.sample_rate);
        if base == 0 {
            return Err(Aes67Error::ConfigInvalid {
                name: "packet_time".to_string(),
                message: "zero samples per packet".to_string(),
            });
        }

        let bytes_per_frame = format.bytes_per_frame();
        let max_packet_bytes = (base as usize + usize::from(num > 0)) * bytes_per_frame;

        Ok(Self {
            ssrc: rand::random(),
            payload_type,
            sequence: rand::random(),
            timestamp: 0,
            timestamp_primed: false,
            base_samples: base,
            frac_num: num,
            frac_den: den,
            frac_acc: 0,
            bytes_per_frame,
            residual: BytesMut::with_capacity(
                (Self::MAX_RESIDUAL_PACKETS + 1) * max_packet_bytes,
            ),
            packet: BytesMut::with_capacity(RtpHeader::SIZE + max_packet_bytes),
            max_residual: Self::MAX_RESIDUAL_PACKETS * max_packet_bytes,
            underruns: 0,
        })
    }

    /// The stream's synchronization source identifier
    #[must_use]
    pub fn ssrc(&self) -> u32 {
        self.ssrc
    }

    /// Sequence number of the next packet
    #[must_use]
    pub fn sequence(&self) -> u16 {
        self.sequence
    }

    /// Timestamp of the next packet
    #[must_use]
    pub fn timestamp(&self) -> u32 {
        self.timestamp
    }

    /// Whole samples per packet (the fractional carry excluded)
    #[must_use]
    pub fn samples_per_packet(&self) -> u32 {
        self.base_samples
    }

    /// Capture data dropped because the residual bound was exceeded
    #[must_use]
    pub fn underruns(&self) -> u64 {
        self.underruns
    }

    /// Append capture bytes without draining
    ///
    /// The residual never holds more than two packets' worth of data; a
    /// producer that outruns the wire rate has its oldest excess dropped,
    /// counted as an underrun.
    pub fn buffer(&mut self, pcm: &[u8]) {
        self.residual.put_slice(pcm);
        self.enforce_residual_bound();
    }

    fn enforce_residual_bound(&mut self) {
        if self.residual.len() > self.max_residual {
            let excess = self.residual.len() - self.max_residual;
            // Keep frame alignment when discarding.
            let excess = excess.div_ceil(self.bytes_per_frame) * self.bytes_per_frame;
            self.residual.advance(excess.min(self.residual.len()));
            self.underruns += 1;
            tracing::debug!("packetizer residual overflow, dropped {excess} bytes");
        }
    }

    /// Emit every complete packet currently buffered
    ///
    /// `clock_ts` is the Clock's RTP timestamp at this packet boundary; it
    /// seeds the timestamp on the first packet of a session and resyncs the
    /// local count when the clock has stepped by more than one packet's
    /// worth of samples. Packets within one call advance locally.
    ///
    /// Returns the number of packets emitted.
    pub fn drain<F>(&mut self, clock_ts: Option<u32>, mut emit: F) -> usize
    where
        F: FnMut(&[u8]),
    {
        let mut clock_ts = clock_ts;
        let mut emitted = 0;

        loop {
            let carry = u32::from(self.frac_num > 0 && self.frac_acc + self.frac_num >= self.frac_den);
            let samples = self.base_samples + carry;
            let payload_len = samples as usize * self.bytes_per_frame;
            if self.residual.len() < payload_len {
                break;
            }

            if let Some(ts) = clock_ts.take() {
                if self.timestamp_primed {
                    let step = ts.wrapping_sub(self.timestamp) as i32;
                    if step.unsigned_abs() > self.base_samples + 1 {
                        tracing::debug!(
                            "clock stepped {step} samples, resyncing timestamp to {ts}"
                        );
                        self.timestamp = ts;
                    }
                } else {
                    self.timestamp = ts;
                    self.timestamp_primed = true;
                }
            }

            let header = RtpHeader::new_audio(
                self.payload_type,
                self.sequence,
                self.timestamp,
                self.ssrc,
            );
            self.packet.clear();
            self.packet.put_slice(&header.encode());
            self.packet.put_slice(&self.residual[..payload_len]);
            emit(&self.packet);

            self.residual.advance(payload_len);
            if self.frac_num > 0 {
                self.frac_acc = (self.frac_acc + self.frac_num) % self.frac_den;
            }
            self.sequence = self.sequence.wrapping_add(1);
            self.timestamp = self.timestamp.wrapping_add(samples);
            emitted += 1;
        }

        emitted
    }

    /// Buffer capture bytes and emit every packet they complete
    ///
    /// Returns the number of packets emitted. Unlike [`Packetizer::buffer`],
    /// draining happens before the residual bound is applied, so arbitrarily
    /// large capture buffers packetize in full.
    pub fn push<F>(&mut self, pcm: &[u8], clock_ts: Option<u32>, emit: F) -> usize
    where
        F: FnMut(&[u8]),
    {
        self.residual.put_slice(pcm);
        let emitted = self.drain(clock_ts, emit);
        self.enforce_residual_bound();
        emitted
    }
}
