//! Core types for the AES67 node

mod config;
mod format;

pub use config::{
    AudioProcessingConfig, Config, NodeConfig, ReceiverConfig, SenderConfig,
};
pub use format::{AudioFormat, PacketTime};
