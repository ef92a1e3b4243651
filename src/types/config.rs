//! Configuration for senders, receivers and audio processing

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use crate::error::{Aes67Error, Result};
use crate::types::format::{AudioFormat, PacketTime};

fn default_true() -> bool {
    true
}

/// Configuration for a single AES67 sender
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SenderConfig {
    /// Unique sender identifier (exposed to the control layer)
    pub id: String,
    /// Human-readable label (also used as the SDP session name)
    pub label: String,
    /// Free-form description
    pub description: String,
    /// Channel count
    pub channels: u8,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Bits per sample
    pub bit_depth: u8,
    /// IPv4 multicast destination address
    pub multicast_ip: String,
    /// RTP destination port
    pub port: u16,
    /// Dynamic RTP payload type (96-127)
    pub payload_type: u8,
    /// Capture device name for the audio source
    pub source_device: String,
    /// Whether this sender is active in the node configuration
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Packet time in microseconds (125, 250, 333, 1000 or 4000)
    pub packet_time_us: u32,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            label: String::new(),
            description: String::new(),
            channels: 2,
            sample_rate: 48_000,
            bit_depth: 24,
            multicast_ip: "239.69.1.1".to_string(),
            port: 5004,
            payload_type: 97,
            source_device: String::new(),
            enabled: true,
            packet_time_us: 1000,
        }
    }
}

impl SenderConfig {
    /// The audio format described by this configuration
    #[must_use]
    pub fn format(&self) -> AudioFormat {
        AudioFormat::new(self.sample_rate, self.channels, self.bit_depth)
    }

    /// Validate all fields against the AES67 profile
    ///
    /// # Errors
    ///
    /// Returns `ConfigInvalid` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if !self.format().is_aes67() {
            return Err(Aes67Error::ConfigInvalid {
                name: "format".to_string(),
                message: format!("{} is outside the AES67 profile", self.format()),
            });
        }
        if !(96..=127).contains(&self.payload_type) {
            return Err(Aes67Error::ConfigInvalid {
                name: "payload_type".to_string(),
                message: format!(
                    "{} is not a dynamic payload type (96-127)",
                    self.payload_type
                ),
            });
        }
        if self.port == 0 {
            return Err(Aes67Error::ConfigInvalid {
                name: "port".to_string(),
                message: "port must be non-zero".to_string(),
            });
        }
        // Destinations are typically 239/8 multicast, but unicast streams
        // are legal; only unparseable addresses are rejected.
        let _ip: Ipv4Addr =
            self.multicast_ip
                .parse()
                .map_err(|_| Aes67Error::ConfigInvalid {
                    name: "multicast_ip".to_string(),
                    message: format!("'{}' is not an IPv4 address", self.multicast_ip),
                })?;
        let ptime = PacketTime::from_micros(self.packet_time_us).ok_or_else(|| {
            Aes67Error::ConfigInvalid {
                name: "packet_time_us".to_string(),
                message: format!("{} us is not an AES67 packet time", self.packet_time_us),
            }
        })?;
        // 48/96 kHz must divide evenly; only 44.1 kHz may carry a fraction.
        if self.sample_rate != 44_100 && !ptime.is_integral(self.sample_rate) {
            return Err(Aes67Error::ConfigInvalid {
                name: "packet_time_us".to_string(),
                message: format!(
                    "{} us does not yield a whole sample count at {} Hz",
                    self.packet_time_us, self.sample_rate
                ),
            });
        }
        Ok(())
    }
}

/// Configuration for a single AES67 receiver
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    /// Unique receiver identifier (exposed to the control layer)
    pub id: String,
    /// Human-readable label
    pub label: String,
    /// Free-form description
    pub description: String,
    /// Channel count this receiver plays back
    pub channels: u8,
    /// Sample rates this receiver accepts
    pub sample_rates: Vec<u32>,
    /// Bit depths this receiver accepts
    pub bit_depths: Vec<u8>,
    /// Playback device name for the audio sink
    pub sink_device: String,
    /// Whether this receiver is active in the node configuration
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            label: String::new(),
            description: String::new(),
            channels: 2,
            sample_rates: vec![44_100, 48_000, 96_000],
            bit_depths: vec![16, 24],
            sink_device: String::new(),
            enabled: true,
        }
    }
}

impl ReceiverConfig {
    /// Whether this receiver can play back `format`
    #[must_use]
    pub fn supports(&self, format: AudioFormat) -> bool {
        format.is_valid()
            && self.sample_rates.contains(&format.sample_rate)
            && self.bit_depths.contains(&format.bit_depth)
            && format.channels <= self.channels
    }
}

/// Receive-side audio processing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioProcessingConfig {
    /// Playout device buffer depth in milliseconds (jitter buffer minimum)
    pub buffer_ms: f64,
    /// Target jitter buffer delay in milliseconds
    pub jitter_buffer_ms: f64,
    /// Hard cap on buffered packets
    pub max_packets: usize,
}

impl Default for AudioProcessingConfig {
    fn default() -> Self {
        Self {
            buffer_ms: 5.0,
            jitter_buffer_ms: 10.0,
            max_packets: 1000,
        }
    }
}

/// Node identity metadata
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Node identifier
    pub id: String,
    /// Human-readable node label
    pub label: String,
    /// Free-form description
    pub description: String,
}

/// Complete node configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Node identity
    pub node: NodeConfig,
    /// Configured senders
    pub senders: Vec<SenderConfig>,
    /// Configured receivers
    pub receivers: Vec<ReceiverConfig>,
    /// Receive-side audio processing
    pub audio: AudioProcessingConfig,
}

impl Config {
    /// Parse a configuration from a JSON string
    ///
    /// # Errors
    ///
    /// Returns `ParseFailed` if the JSON does not describe a configuration.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Aes67Error::ParseFailed {
            message: format!("config: {e}"),
        })
    }

    /// Serialize the configuration to pretty-printed JSON
    #[must_use]
    pub fn to_json_string(&self) -> String {
        // Serialization of these plain structs cannot fail.
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    /// Validate every enabled sender entry
    ///
    /// # Errors
    ///
    /// Returns the first sender validation error encountered.
    pub fn validate(&self) -> Result<()> {
        for sender in self.senders.iter().filter(|s| s.enabled) {
            sender.validate()?;
        }
        Ok(())
    }
}
