//! SDP (Session Description Protocol) for AES67 streams
//!
//! The wire bridge between IS-05 connection management and the RTP
//! pipeline: receivers parse the transport file a sender published,
//! senders emit one from their configuration.

mod builder;
mod parser;


pub use builder::generate;
pub use parser::parse;

use crate::types::AudioFormat;

/// Information extracted from an AES67 SDP description
///
/// Parsing is tolerant: unknown lines are skipped and missing fields leave
/// their defaults in place, with `is_valid` summarizing whether enough was
/// found to connect. Callers reject invalid descriptions at their level.
#[derive(Debug, Clone)]
pub struct SdpInfo {
    /// Session name (`s=`)
    pub session_name: String,
    /// Session identifier from the origin line
    pub session_id: String,
    /// Origin address from the origin line
    pub origin_address: String,
    /// Stream source address (`c=`), multicast for AES67
    pub source_ip: String,
    /// RTP port from the media line
    pub port: u16,
    /// RTP payload type from the media line
    pub payload_type: u8,
    /// Audio format from the rtpmap line
    pub format: AudioFormat,
    /// Encoding name from the rtpmap line (`L16`, `L24`, `L32`)
    pub encoding: String,
    /// Packet time in microseconds (`a=ptime`, default 1 ms)
    pub packet_time_us: u32,
    /// PTP grandmaster clock identity from `a=ts-refclk`, when present
    pub ptp_clock_id: Option<String>,
    /// Whether the description carries enough to connect
    pub is_valid: bool,
}

impl Default for SdpInfo {
    fn default() -> Self {
        Self {
            session_name: String::new(),
            session_id: String::new(),
            origin_address: String::new(),
            source_ip: String::new(),
            port: 0,
            payload_type: 0,
            format: AudioFormat::empty(),
            encoding: String::new(),
            packet_time_us: 1000,
            ptp_clock_id: None,
            is_valid: false,
        }
    }
}

impl SdpInfo {
    /// AES67 interoperability profile check on top of basic validity
    #[must_use]
    pub fn is_aes67(&self) -> bool {
        self.is_valid
            && self.format.is_aes67()
            && self.format.encoding_name() == Some(self.encoding.as_str())
    }
}
