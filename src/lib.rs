//! # aes67
//!
//! A bidirectional AES67 audio-over-IP node core: real-time sender and
//! receiver for uncompressed linear-PCM RTP streams, time-aligned to an
//! IEEE-1588 (PTP) clock and interoperable with NMOS IS-04/IS-05 control.
//!
//! ## Features
//!
//! - RTP packetization and depacketization with AES67 wire format
//! - PTP-derived RTP timestamping with free-running fallback
//! - Adaptive jitter buffering with loss/reorder statistics
//! - AES67 SDP parsing and generation
//! - IPv4 multicast UDP transport
//!
//! ## Example
//!
//! ```rust,no_run
//! use aes67::{Sender, SenderConfig};
//!
//! # fn example() -> aes67::Result<()> {
//! let sender = Sender::new(SenderConfig {
//!     id: "tx0".to_string(),
//!     label: "Main".to_string(),
//!     ..Default::default()
//! })?;
//!
//! // Attach a capture source, then:
//! sender.start()?;
//! println!("{}", sender.generate_sdp());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Public modules
/// Audio device boundary
pub mod audio;
/// PTP clock adapter
pub mod clock;
/// IS-05 connection boundary
pub mod connection;
/// Error types
pub mod error;
/// UDP transport
pub mod net;
/// Wire protocols (RTP, SDP)
pub mod protocol;
/// Receiver session management
pub mod receiver;
/// Sender session management
pub mod sender;
/// Lifecycle state machines
pub mod state;
/// Core configuration types
pub mod types;

// Internal modules
mod stats;

// Re-exports
pub use clock::{ptp_to_rtp_timestamp, LocalClock, PtpClock, PtpClockInfo, PtpState};
pub use connection::{ConnectionRequest, ConnectionResponse, ConnectionStaging, TransportParams};
pub use error::{Aes67Error, Result};
pub use protocol::sdp::SdpInfo;
pub use receiver::{Receiver, ReceiverStatistics};
pub use sender::{Sender, SenderStatistics};
pub use state::{ConnectionState, ReceiverState, SenderState};
pub use types::{
    AudioFormat, AudioProcessingConfig, Config, PacketTime, ReceiverConfig, SenderConfig,
};
