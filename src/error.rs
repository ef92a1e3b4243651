use std::io;
use thiserror::Error;

/// Errors that can occur during AES67 node operations
#[derive(Debug, Error)]
pub enum Aes67Error {
    // ===== Configuration Errors =====
    /// A configuration value is outside its allowed range
    #[error("invalid configuration: {name} - {message}")]
    ConfigInvalid {
        /// The name of the offending field
        name: String,
        /// Description of the problem
        message: String,
    },

    /// Audio format does not match between collaborating components
    #[error("format mismatch: {message}")]
    FormatMismatch {
        /// Description of the mismatch
        message: String,
    },

    // ===== Transport Errors =====
    /// Socket bind or multicast join failed
    #[error("bind failed on {addr}: {source}")]
    BindFailed {
        /// Address that could not be bound or joined
        addr: String,
        /// The underlying socket error
        #[source]
        source: io::Error,
    },

    /// Network I/O error
    #[error("network error: {0}")]
    Network(#[from] io::Error),

    // ===== Protocol Errors =====
    /// SDP or RTP input could not be parsed
    #[error("parse failed: {message}")]
    ParseFailed {
        /// Description of the failure
        message: String,
    },

    // ===== State Errors =====
    /// An operation was attempted without a prior `connect()`
    #[error("not connected")]
    NotConnected,

    /// Operation not valid in current lifecycle state
    #[error("invalid state: {message} (current: {current_state})")]
    InvalidState {
        /// Description of why the state is invalid
        message: String,
        /// The current state
        current_state: String,
    },

    /// A running session has seen no packet I/O for too long
    #[error("no packet I/O for {seconds} s while running")]
    Unhealthy {
        /// Seconds since the last packet was sent or received
        seconds: u64,
    },

    // ===== Device Errors =====
    /// Audio source or sink failure
    #[error("audio device error: {message}")]
    AudioDevice {
        /// Description of the failure
        message: String,
    },
}

impl Aes67Error {
    /// Check if this error is recoverable by retrying the operation
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Unhealthy { .. })
    }

    /// Check if this error indicates a rejected configuration
    #[must_use]
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Self::ConfigInvalid { .. } | Self::FormatMismatch { .. }
        )
    }
}

/// Result type alias for AES67 operations
pub type Result<T> = std::result::Result<T, Aes67Error>;
